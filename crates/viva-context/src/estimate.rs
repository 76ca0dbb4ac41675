//! Token estimation heuristics
//!
//! Every later pipeline stage sizes content with these functions. The
//! estimate is the chars/4 heuristic, not a real tokenizer: callers may
//! rely on ordering and budget comparisons, never on exact counts. No I/O.

use viva_ai::{Content, Message, ModelRequest};

/// Fixed per-message framing overhead (role tags and separators).
const MESSAGE_OVERHEAD_TOKENS: u32 = 3;

fn content_char_count(content: &[Content]) -> usize {
    content
        .iter()
        .map(|c| match c {
            Content::Text { text, .. } => text.len(),
            Content::Data { value, .. } => {
                serde_json::to_string(value).unwrap_or_default().len()
            }
            Content::ToolCall {
                name, arguments, ..
            } => name.len() + serde_json::to_string(arguments).unwrap_or_default().len(),
        })
        .sum()
}

/// Estimate token count for a block sequence (chars/4 heuristic)
pub fn content_tokens(content: &[Content]) -> u32 {
    (content_char_count(content) / 4) as u32
}

/// Estimate token count for a single message
pub fn message_tokens(message: &Message) -> u32 {
    content_tokens(message.content()) + MESSAGE_OVERHEAD_TOKENS
}

/// Estimate total tokens for a transcript
pub fn transcript_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(message_tokens).sum()
}

/// Estimate total tokens for an outgoing request, including the system
/// prompt and tool definitions.
pub fn request_tokens(request: &ModelRequest) -> u32 {
    let tools: usize = request
        .tools
        .iter()
        .map(|t| {
            t.name.len()
                + t.description.len()
                + serde_json::to_string(&t.parameters).unwrap_or_default().len()
        })
        .sum();
    content_tokens(&request.system) + (tools / 4) as u32 + transcript_tokens(&request.messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_tokens() {
        let msg = Message::user("x".repeat(400)); // 400 chars -> 100 tokens
        assert_eq!(message_tokens(&msg), 100 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_tool_call_counts_name_and_arguments() {
        let content = vec![Content::tool_call(
            "c1",
            "grade",
            serde_json::json!({"answer": "xxxx"}),
        )];
        assert!(content_tokens(&content) > 0);
    }

    #[test]
    fn test_transcript_tokens_sums() {
        let messages = vec![
            Message::user("a".repeat(400)),
            Message::assistant(vec![Content::text("b".repeat(800))]),
        ];
        assert_eq!(
            transcript_tokens(&messages),
            300 + 2 * MESSAGE_OVERHEAD_TOKENS
        );
    }

    #[test]
    fn test_monotonic_under_concatenation() {
        let short = vec![Content::text("hello")];
        let long = vec![Content::text("hello"), Content::text(" world")];
        assert!(content_tokens(&long) >= content_tokens(&short));
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(content_tokens(&[]), 0);
        assert_eq!(transcript_tokens(&[]), 0);
    }

    #[test]
    fn test_request_tokens_includes_system_and_tools() {
        let mut request = ModelRequest::with_system("s".repeat(400));
        request.add_tool(viva_ai::Tool::new(
            "run_tests",
            "d".repeat(400),
            serde_json::json!({"type": "object"}),
        ));
        request.push(Message::user("u".repeat(400)));
        let total = request_tokens(&request);
        assert!(total > transcript_tokens(&request.messages));
        assert!(total >= 300);
    }
}
