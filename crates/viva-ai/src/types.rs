//! Core types for model interactions

use serde::{Deserialize, Serialize};

/// Known model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAI,
    Google,
    Custom,
}

impl Provider {
    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
            Provider::Google => "Google",
            Provider::Custom => "Custom",
        }
    }
}

/// Model definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier (e.g., "claude-sonnet-4-5")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Provider
    pub provider: Provider,
    /// Context window size in tokens
    pub context_window: u32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Whether the provider honors prompt-cache annotations for this model
    #[serde(default)]
    pub caching: bool,
}

impl Model {
    /// Capability gate for the cache annotator
    pub fn supports_caching(&self) -> bool {
        self.caching
    }
}

/// Prompt-cache breakpoint marker. Placing one on a block tells a
/// caching-aware provider that everything up to and including that block
/// may be reused from a prior request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheControl {
    Ephemeral,
}

/// Content types in messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text content
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// Structured content (code submissions, rubric fragments, etc.)
    Data {
        value: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// Tool call request
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Create structured content
    pub fn data(value: serde_json::Value) -> Self {
        Self::Data {
            value,
            cache_control: None,
        }
    }

    /// Create a tool call
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
            cache_control: None,
        }
    }

    /// Get text if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Check if this is a tool call
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }

    /// Get the cache marker on this block, if any
    pub fn cache_control(&self) -> Option<CacheControl> {
        match self {
            Self::Text { cache_control, .. }
            | Self::Data { cache_control, .. }
            | Self::ToolCall { cache_control, .. } => *cache_control,
        }
    }

    /// Set or clear the cache marker on this block
    pub fn set_cache_control(&mut self, control: Option<CacheControl>) {
        match self {
            Self::Text { cache_control, .. }
            | Self::Data { cache_control, .. }
            | Self::ToolCall { cache_control, .. } => *cache_control = control,
        }
    }
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Message roles in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System instruction. Valid transcripts never carry these in-sequence;
    /// the system prompt travels out-of-band on the request. The variant
    /// exists so transcripts loaded from persistence can be repaired.
    System {
        #[serde(default = "new_message_id")]
        id: String,
        content: Vec<Content>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Human (candidate) message
    User {
        #[serde(default = "new_message_id")]
        id: String,
        content: Vec<Content>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Model response, possibly carrying tool invocations
    Assistant {
        #[serde(default = "new_message_id")]
        id: String,
        content: Vec<Content>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Tool result answering a prior tool invocation
    ToolResult {
        #[serde(default = "new_message_id")]
        id: String,
        tool_call_id: String,
        tool_name: String,
        content: Vec<Content>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        timestamp: i64,
    },
}

impl Message {
    /// Create a system message with text content
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            id: new_message_id(),
            content: vec![Content::text(text)],
            timestamp: now_millis(),
        }
    }

    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            id: new_message_id(),
            content: vec![Content::text(text)],
            timestamp: now_millis(),
        }
    }

    /// Create a user message with multiple content blocks
    pub fn user_with_content(content: Vec<Content>) -> Self {
        Self::User {
            id: new_message_id(),
            content,
            timestamp: now_millis(),
        }
    }

    /// Create an assistant message with the given content blocks
    pub fn assistant(content: Vec<Content>) -> Self {
        Self::Assistant {
            id: new_message_id(),
            content,
            timestamp: now_millis(),
        }
    }

    /// Create a tool result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Vec<Content>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            id: new_message_id(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content,
            is_error,
            timestamp: now_millis(),
        }
    }

    /// Get the unique message id
    pub fn id(&self) -> &str {
        match self {
            Self::System { id, .. }
            | Self::User { id, .. }
            | Self::Assistant { id, .. }
            | Self::ToolResult { id, .. } => id,
        }
    }

    /// Get the role as a string
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
        }
    }

    /// Get the content blocks
    pub fn content(&self) -> &[Content] {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    /// Get the content blocks mutably
    pub fn content_mut(&mut self) -> &mut Vec<Content> {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    /// Extract all tool calls from an assistant message
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        match self {
            Self::Assistant { content, .. } => content
                .iter()
                .filter_map(|c| match c {
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                        ..
                    } => Some((id.as_str(), name.as_str(), arguments)),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Check whether this message declares a tool invocation with the given id
    pub fn declares_call(&self, call_id: &str) -> bool {
        self.tool_calls().iter().any(|(id, _, _)| *id == call_id)
    }

    /// Get combined text content
    pub fn text(&self) -> String {
        self.content()
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Tool definition for function calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (used in API calls)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
    /// Tool schemas are cached as one atomic unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Tool {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            cache_control: None,
        }
    }
}

/// An outgoing model request: out-of-band system prompt, tool definitions,
/// and the conversation transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System prompt as a block sequence
    pub system: Vec<Content>,
    /// Available tools
    pub tools: Vec<Tool>,
    /// Conversation messages
    pub messages: Vec<Message>,
}

impl ModelRequest {
    /// Create a request with a plain-text system prompt
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            system: vec![Content::text(system_prompt)],
            tools: vec![],
            messages: vec![],
        }
    }

    /// Add a message to the request
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Add a tool to the request
    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.push(tool);
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
    pub cache_read: u32,
    pub cache_write: u32,
}

/// A completed model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The assistant message produced by the model
    pub message: Message,
    /// Token usage for the exchange
    #[serde(default)]
    pub usage: Usage,
}

impl ModelResponse {
    /// Create a response from an assistant message with no usage data
    pub fn from_message(message: Message) -> Self {
        Self {
            message,
            usage: Usage::default(),
        }
    }
}
