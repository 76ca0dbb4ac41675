//! Context compaction for long interview sessions
//!
//! When a transcript grows past its token budget, this module summarizes
//! the older portion and replaces it with a single tagged summary message,
//! leaving recent messages verbatim. Summary generation goes through the
//! same [`Transport`] as the conversation itself and fails open: any
//! provider error, empty response, or cancellation returns the original
//! transcript untouched rather than blocking the turn.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use viva_ai::{Content, Message, Model, ModelRequest};

use crate::error::Error;
use crate::estimate::transcript_tokens;
use crate::transport::Transport;
use crate::validate;

/// Configuration for context compaction
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Whether compaction is enabled
    pub enabled: bool,
    /// Token budget for the transcript; compaction triggers above this
    pub max_context_tokens: u32,
    /// The recent suffix always keeps at least this many messages
    pub keep_recent_messages: usize,
    /// Target share of transcript tokens left verbatim in the suffix.
    /// A target, not a contract: the pairing constraint and the
    /// `keep_recent_messages` floor both take priority.
    pub recent_token_ratio: f32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_tokens: 100_000,
            keep_recent_messages: 8,
            recent_token_ratio: 0.3,
        }
    }
}

/// A summary that replaced a contiguous older span of one transcript.
/// Owned by the conversation that produced it, never shared.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SummaryRecord {
    /// Generated summary text
    pub text: String,
    /// How many messages the summary replaced
    pub replaced_count: usize,
    /// Identifiers of the replaced messages
    pub replaced_ids: Vec<String>,
    /// When the summary was generated
    pub created_at: DateTime<Utc>,
}

/// What the compactor did on this pass
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompactionStatus {
    /// Transcript was under budget (or nothing old enough to summarize)
    Skipped,
    /// Older span replaced with a summary
    Compacted { tokens_before: u32, tokens_after: u32 },
    /// Summary generation failed; original transcript preserved
    FailedOpen { reason: String },
}

/// Result of a compaction pass
#[derive(Debug)]
pub struct CompactionOutcome {
    /// The (possibly compacted) transcript
    pub messages: Vec<Message>,
    /// The summary record when one was produced
    pub summary: Option<SummaryRecord>,
    /// What happened
    pub status: CompactionStatus,
}

impl CompactionOutcome {
    fn skipped(messages: Vec<Message>) -> Self {
        Self {
            messages,
            summary: None,
            status: CompactionStatus::Skipped,
        }
    }

    fn failed_open(messages: Vec<Message>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "compaction failed open");
        Self {
            messages,
            summary: None,
            status: CompactionStatus::FailedOpen { reason },
        }
    }
}

// --- Summary message tagging ---

const SUMMARY_OPEN_TAG: &str = "<conversation-summary>";
const SUMMARY_CLOSE_TAG: &str = "</conversation-summary>";

/// Check whether a message is a summary produced by an earlier compaction.
/// Such messages are never re-summarized.
pub fn is_summary_message(message: &Message) -> bool {
    matches!(message, Message::User { .. })
        && message
            .content()
            .first()
            .and_then(|c| c.as_text())
            .is_some_and(|t| t.trim_start().starts_with(SUMMARY_OPEN_TAG))
}

fn summary_message(text: &str) -> Message {
    Message::user(format!("{SUMMARY_OPEN_TAG}\n{text}\n{SUMMARY_CLOSE_TAG}"))
}

// --- Split point ---

/// Tokens reserved out of the budget for the replacement summary message.
const SUMMARY_RESERVE_TOKENS: u32 = 512;

/// Find the first message to keep verbatim. Walks backwards from the end
/// accumulating tokens until the suffix holds roughly `recent_token_ratio`
/// of the transcript, keeps at least `keep_recent_messages` messages, then
/// pulls the boundary back so no tool invocation is separated from its
/// result.
fn find_split(messages: &[Message], config: &CompactionConfig) -> Option<usize> {
    if messages.len() < 2 {
        return None;
    }

    let total = transcript_tokens(messages);
    // Cap the suffix at what the budget leaves after reserving room for
    // the replacement summary; without the cap a transcript far over
    // budget keeps a share of the total that is itself over budget.
    let headroom = config
        .max_context_tokens
        .saturating_sub(SUMMARY_RESERVE_TOKENS);
    let recent_target = ((total as f32 * config.recent_token_ratio) as u32).min(headroom);

    // Walk backwards accumulating tokens; keep from i+1 onwards so the
    // suffix stays just under the target share.
    let mut accumulated: u32 = 0;
    let mut first_kept = messages.len();
    for i in (0..messages.len()).rev() {
        accumulated += crate::estimate::message_tokens(&messages[i]);
        if accumulated >= recent_target {
            first_kept = i + 1;
            break;
        }
    }

    // The suffix must contain at least the last N messages.
    let floor = messages.len().saturating_sub(config.keep_recent_messages.max(1));
    first_kept = first_kept.min(floor);

    // Never split a tool invocation from its result. Results may trail
    // their call non-adjacently, so pull the boundary back to the message
    // declaring any call answered in the suffix, repeating until the
    // suffix is self-contained.
    loop {
        let needed: HashSet<&str> = messages[first_kept..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        let declarer = (0..first_kept).rev().find(|&j| {
            messages[j]
                .tool_calls()
                .iter()
                .any(|(id, _, _)| needed.contains(id))
        });
        match declarer {
            Some(j) => first_kept = j,
            None => break,
        }
    }

    if first_kept == 0 {
        return None;
    }
    Some(first_kept)
}

// --- Message serialization ---

/// UTF-8-boundary-safe prefix truncation.
fn truncate_chars(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn content_to_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            Content::Text { text, .. } => Some(text.clone()),
            Content::Data { value, .. } => serde_json::to_string(value).ok(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn format_tool_args(args: &serde_json::Value) -> String {
    match args {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let s = v.to_string();
                format!("{}={}", k, truncate_chars(&s, 100))
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => args.to_string(),
    }
}

/// Serialize messages to plain text for the summarization prompt. Uses a
/// labeled human-readable format so the model summarizes instead of trying
/// to continue the conversation. Prior summary messages are skipped; their
/// content arrives through the update prompt.
fn serialize_for_summary(messages: &[Message]) -> String {
    let mut out = String::new();

    for msg in messages {
        if is_summary_message(msg) {
            continue;
        }
        match msg {
            Message::System { .. } => {}
            Message::User { content, .. } => {
                let text = content_to_text(content);
                if !text.is_empty() {
                    out.push_str("[Candidate]: ");
                    out.push_str(&text);
                    out.push('\n');
                }
            }
            Message::Assistant { content, .. } => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();
                for c in content {
                    match c {
                        Content::Text { text, .. } => text_parts.push(text.as_str()),
                        Content::ToolCall {
                            name, arguments, ..
                        } => tool_calls.push(format!("{}({})", name, format_tool_args(arguments))),
                        Content::Data { .. } => {}
                    }
                }
                if !text_parts.is_empty() {
                    out.push_str("[Interviewer]: ");
                    out.push_str(&text_parts.join(""));
                    out.push('\n');
                }
                if !tool_calls.is_empty() {
                    out.push_str("[Interviewer tool calls]: ");
                    out.push_str(&tool_calls.join("; "));
                    out.push('\n');
                }
            }
            Message::ToolResult {
                tool_name,
                content,
                is_error,
                ..
            } => {
                let text = content_to_text(content);
                if *is_error {
                    out.push_str(&format!("[Tool error ({})]: ", tool_name));
                } else {
                    out.push_str(&format!("[Tool result ({})]: ", tool_name));
                }
                if text.len() > 2000 {
                    out.push_str(truncate_chars(&text, 2000));
                    out.push_str("...(truncated)");
                } else {
                    out.push_str(&text);
                }
                out.push('\n');
            }
        }
    }

    out
}

// --- Summarization prompts ---

const SUMMARIZATION_SYSTEM_PROMPT: &str = "\
You are a specialized summarization model. Your task is to create a \
comprehensive yet concise summary of an interview session. This summary \
will replace the original messages in the session context, so it must \
capture everything needed to continue the interview effectively.";

const SUMMARIZATION_PROMPT: &str = "\
Please provide a detailed summary of this interview session so far. The summary should cover:

1. **Objective**: What is this interview assessing?
2. **Questions Asked**: Which questions or tasks were posed, and in what order?
3. **Candidate Responses**: What did the candidate claim, attempt, or submit? Preserve factual details (names, numbers, code specifics) at a coarse level.
4. **Decisions & Evaluations**: What judgments were made about the candidate's work and why?
5. **Open Problems**: What remains unresolved or was deferred?

Be thorough but concise. Focus on information needed to continue the session seamlessly.

<session>
{conversation}
</session>";

const UPDATE_SUMMARIZATION_PROMPT: &str = "\
Below is an existing summary of an earlier portion of this interview session, \
followed by new messages that occurred after that summary. Create an updated, \
comprehensive summary that integrates both.

<previous-summary>
{previous_summary}
</previous-summary>

The updated summary should cover:

1. **Objective**: What is this interview assessing? (update if it has evolved)
2. **Questions Asked**: Including both previous and new questions.
3. **Candidate Responses**: Claims, attempts, and submissions so far.
4. **Decisions & Evaluations**: Judgments made and why.
5. **Open Problems**: What remains unresolved?

<new-messages>
{conversation}
</new-messages>";

// --- Main compaction entry point ---

/// Run one compaction pass over a transcript. Called at most once per
/// outgoing request; the result is never fed back into another pass.
///
/// Infallible by contract: every failure mode degrades to returning the
/// input transcript (see [`CompactionStatus::FailedOpen`]).
pub async fn compact(
    messages: Vec<Message>,
    config: &CompactionConfig,
    model: &Model,
    transport: &Arc<dyn Transport>,
    previous_summary: Option<&str>,
    cancel: CancellationToken,
) -> CompactionOutcome {
    if !config.enabled {
        return CompactionOutcome::skipped(messages);
    }

    let tokens_before = transcript_tokens(&messages);
    if tokens_before <= config.max_context_tokens {
        return CompactionOutcome::skipped(messages);
    }

    let Some(first_kept) = find_split(&messages, config) else {
        // Everything is recent (possibly a single oversized message);
        // nothing can be summarized away.
        return CompactionOutcome::skipped(messages);
    };

    let old = &messages[..first_kept];
    let conversation_text = serialize_for_summary(old);
    if conversation_text.is_empty() {
        // The old span holds only prior summaries or empty messages.
        return CompactionOutcome::skipped(messages);
    }

    let prompt = match previous_summary {
        Some(prev) => UPDATE_SUMMARIZATION_PROMPT
            .replace("{previous_summary}", prev)
            .replace("{conversation}", &conversation_text),
        None => SUMMARIZATION_PROMPT.replace("{conversation}", &conversation_text),
    };

    let summary_text = match generate_summary(&prompt, model, transport, cancel).await {
        Ok(text) => text,
        Err(err) => return CompactionOutcome::failed_open(messages, err.to_string()),
    };

    let record = SummaryRecord {
        text: summary_text.clone(),
        replaced_count: old.len(),
        replaced_ids: old.iter().map(|m| m.id().to_string()).collect(),
        created_at: Utc::now(),
    };

    let mut compacted = Vec::with_capacity(messages.len() - first_kept + 1);
    compacted.push(summary_message(&summary_text));
    compacted.extend_from_slice(&messages[first_kept..]);

    // Replacing the old span can orphan a tool result whose call lived
    // inside it; re-validate to drop those.
    let (compacted, report) = validate::validate(compacted);
    if report.removed_orphans > 0 {
        tracing::debug!(
            removed = report.removed_orphans,
            "compaction orphaned tool results"
        );
    }

    let tokens_after = transcript_tokens(&compacted);
    tracing::info!(
        tokens_before,
        tokens_after,
        replaced = record.replaced_count,
        "compacted transcript"
    );

    CompactionOutcome {
        messages: compacted,
        summary: Some(record),
        status: CompactionStatus::Compacted {
            tokens_before,
            tokens_after,
        },
    }
}

/// Generate the summary through the transport. Errors here feed the
/// fail-open path, never the caller.
async fn generate_summary(
    prompt: &str,
    model: &Model,
    transport: &Arc<dyn Transport>,
    cancel: CancellationToken,
) -> Result<String, Error> {
    let mut request = ModelRequest::with_system(SUMMARIZATION_SYSTEM_PROMPT);
    request.push(Message::user(prompt));
    tracing::debug!(model = %model.id, "generating compaction summary");

    let response = transport.invoke(request, cancel).await?;

    let text = response.message.text();
    if text.trim().is_empty() {
        return Err(Error::Summarization(
            "summary generation returned empty response".to_string(),
        ));
    }
    Ok(text)
}
