//! Structural transcript repair
//!
//! Transcripts loaded from persistence can carry two kinds of damage: stray
//! in-sequence system messages (the system prompt travels out-of-band on
//! the request) and orphaned tool results whose originating tool invocation
//! was removed by an earlier compaction. The provider hard-rejects both, so
//! this stage silently repairs rather than refuses. It never errors.

use std::collections::HashSet;

use viva_ai::Message;

/// What the validator removed from a transcript
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// In-sequence system messages dropped
    pub removed_system: usize,
    /// Orphaned tool results dropped
    pub removed_orphans: usize,
}

impl ValidationReport {
    /// True when the transcript needed no repair
    pub fn is_clean(&self) -> bool {
        self.removed_system == 0 && self.removed_orphans == 0
    }
}

/// Repair a transcript so that it carries no in-sequence system messages
/// and every tool result answers a tool invocation declared by a prior
/// assistant message. Idempotent.
pub fn validate(messages: Vec<Message>) -> (Vec<Message>, ValidationReport) {
    let mut report = ValidationReport::default();
    let mut repaired = Vec::with_capacity(messages.len());
    let mut declared_calls: HashSet<String> = HashSet::new();

    for message in messages {
        let keep = match &message {
            Message::System { id, .. } => {
                tracing::debug!(message_id = %id, "dropping in-sequence system message");
                report.removed_system += 1;
                false
            }
            Message::Assistant { .. } => {
                for (call_id, _, _) in message.tool_calls() {
                    declared_calls.insert(call_id.to_string());
                }
                true
            }
            Message::ToolResult {
                id, tool_call_id, ..
            } => {
                if declared_calls.contains(tool_call_id) {
                    true
                } else {
                    tracing::debug!(
                        message_id = %id,
                        tool_call_id = %tool_call_id,
                        "dropping orphaned tool result"
                    );
                    report.removed_orphans += 1;
                    false
                }
            }
            Message::User { .. } => true,
        };
        if keep {
            repaired.push(message);
        }
    }

    if !report.is_clean() {
        tracing::info!(
            removed_system = report.removed_system,
            removed_orphans = report.removed_orphans,
            "repaired transcript"
        );
    }

    (repaired, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use viva_ai::Content;

    fn assistant_with_call(call_id: &str) -> Message {
        Message::assistant(vec![
            Content::text("checking"),
            Content::tool_call(call_id, "run_tests", serde_json::json!({})),
        ])
    }

    fn result_for(call_id: &str) -> Message {
        Message::tool_result(call_id, "run_tests", vec![Content::text("passed")], false)
    }

    #[test]
    fn test_clean_transcript_untouched() {
        let messages = vec![
            Message::user("question"),
            assistant_with_call("c1"),
            result_for("c1"),
            Message::assistant(vec![Content::text("answer")]),
        ];
        let (repaired, report) = validate(messages.clone());
        assert_eq!(repaired.len(), 4);
        assert!(report.is_clean());
    }

    #[test]
    fn test_removes_in_sequence_system() {
        let messages = vec![
            Message::system("you are an interviewer"),
            Message::user("hi"),
            Message::system("another stray instruction"),
        ];
        let (repaired, report) = validate(messages);
        assert_eq!(repaired.len(), 1);
        assert_eq!(report.removed_system, 2);
        assert!(matches!(repaired[0], Message::User { .. }));
    }

    #[test]
    fn test_removes_exactly_the_dangling_result() {
        // "removed-call" was declared by an assistant message that a prior
        // compaction summarized away.
        let messages = vec![
            Message::user("question"),
            result_for("removed-call"),
            assistant_with_call("c2"),
            result_for("c2"),
        ];
        let (repaired, report) = validate(messages);
        assert_eq!(report.removed_orphans, 1);
        assert_eq!(repaired.len(), 3);
        assert!(
            repaired
                .iter()
                .all(|m| !matches!(m, Message::ToolResult { tool_call_id, .. } if tool_call_id == "removed-call"))
        );
    }

    #[test]
    fn test_result_may_answer_earlier_non_adjacent_call() {
        let messages = vec![
            assistant_with_call("c1"),
            Message::user("interjection"),
            result_for("c1"),
        ];
        let (repaired, report) = validate(messages);
        assert!(report.is_clean());
        assert_eq!(repaired.len(), 3);
    }

    #[test]
    fn test_result_before_declaration_is_orphaned() {
        let messages = vec![result_for("c1"), assistant_with_call("c1")];
        let (repaired, report) = validate(messages);
        assert_eq!(report.removed_orphans, 1);
        assert_eq!(repaired.len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let messages = vec![
            Message::system("stray"),
            Message::user("q"),
            result_for("ghost"),
            assistant_with_call("c1"),
            result_for("c1"),
        ];
        let (once, first_report) = validate(messages);
        assert!(!first_report.is_clean());
        let (twice, second_report) = validate(once.clone());
        assert!(second_report.is_clean());
        assert_eq!(once.len(), twice.len());
        let ids_once: Vec<_> = once.iter().map(|m| m.id().to_string()).collect();
        let ids_twice: Vec<_> = twice.iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids_once, ids_twice);
    }

    #[test]
    fn test_empty_transcript() {
        let (repaired, report) = validate(vec![]);
        assert!(repaired.is_empty());
        assert!(report.is_clean());
    }
}
