//! Per-conversation step budgets and loop detection
//!
//! Each conversation tracks how many autonomous steps (tool calls) the
//! agent has taken. Crossing a warning threshold emits a one-time advisory
//! for the next request context; exhausting the budget, or repeating the
//! same tool call signature enough times, suspends autonomous continuation
//! until an explicit external signal grants it again.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Configuration for the budget tracker
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Maximum autonomous steps before requiring continuation approval
    pub max_steps: u32,
    /// Budget-consumed fractions that trigger a one-time warning
    pub warn_thresholds: Vec<f32>,
    /// Sliding window of recent tool-call signatures
    pub loop_window: usize,
    /// Identical signatures within the window that count as a loop
    pub loop_threshold: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            warn_thresholds: vec![0.8, 0.9],
            loop_window: 10,
            loop_threshold: 5,
        }
    }
}

/// Budget tracker phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPhase {
    /// Normal operation
    Active,
    /// A warning threshold has been crossed
    Warned,
    /// Budget exhausted or loop detected; autonomous continuation stops
    /// until an external continuation signal arrives
    AwaitingPermission,
}

/// Advisories surfaced to the orchestrator. These are injected into the
/// next request context, never persisted into the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// A warning threshold was crossed
    StepWarning { used: u32, max: u32, threshold: f32 },
    /// The step budget is exhausted
    BudgetExhausted { max: u32 },
    /// The same tool call keeps repeating
    LoopDetected { tool: String, repeats: usize },
    /// The transcript still exceeds its token budget after compaction;
    /// the request is sent anyway and may be rejected by the provider
    ContextOverflow { tokens: u32, budget: u32 },
}

impl Advisory {
    /// Render the advisory for injection into the agent's prompt context
    pub fn prompt_text(&self) -> String {
        match self {
            Advisory::StepWarning {
                used,
                max,
                threshold,
            } => format!(
                "Note: {used} of {max} allotted steps used ({:.0}%). Prioritize finishing the current task.",
                threshold * 100.0
            ),
            Advisory::BudgetExhausted { max } => format!(
                "Step budget of {max} is exhausted. Stop autonomous work and ask for permission to continue."
            ),
            Advisory::LoopDetected { tool, repeats } => format!(
                "The tool call '{tool}' has repeated {repeats} times with identical arguments. Stop and reassess before continuing."
            ),
            Advisory::ContextOverflow { tokens, budget } => format!(
                "Context is over budget ({tokens} tokens against {budget}) even after compaction; the provider may reject this request."
            ),
        }
    }
}

/// Canonical JSON rendering with recursively sorted object keys, so
/// semantically identical arguments fingerprint identically regardless of
/// key order.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

fn signature(name: &str, arguments: &serde_json::Value) -> String {
    format!("{name}:{}", canonical_json(arguments))
}

/// Per-conversation budget state. Created at conversation start, mutated
/// once per turn, never deleted mid-conversation.
#[derive(Debug)]
pub struct BudgetState {
    config: BudgetConfig,
    steps_used: u32,
    phase: BudgetPhase,
    issued_thresholds: Vec<f32>,
    exhaustion_signalled: bool,
    loop_signalled: bool,
    recent_signatures: VecDeque<String>,
}

impl BudgetState {
    /// Create fresh state for a new conversation
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            steps_used: 0,
            phase: BudgetPhase::Active,
            issued_thresholds: vec![],
            exhaustion_signalled: false,
            loop_signalled: false,
            recent_signatures: VecDeque::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> BudgetPhase {
        self.phase
    }

    /// Steps consumed so far
    pub fn steps_used(&self) -> u32 {
        self.steps_used
    }

    /// Steps remaining before exhaustion
    pub fn remaining(&self) -> u32 {
        self.config.max_steps.saturating_sub(self.steps_used)
    }

    /// Whether autonomous continuation requires explicit approval
    pub fn awaiting_permission(&self) -> bool {
        self.phase == BudgetPhase::AwaitingPermission
    }

    /// External continuation signal: the only path out of
    /// `AwaitingPermission`. Clears the loop window so a fresh run of
    /// repeats is needed to trip detection again.
    pub fn grant_continuation(&mut self) {
        self.phase = BudgetPhase::Active;
        self.loop_signalled = false;
        self.recent_signatures.clear();
        tracing::debug!(steps_used = self.steps_used, "continuation granted");
    }

    /// Record a completed turn's tool calls. Each call consumes one step.
    /// Returns the advisories this turn produced (each at most once per
    /// conversation).
    pub fn record_turn(&mut self, calls: &[(String, serde_json::Value)]) -> Vec<Advisory> {
        let mut advisories = vec![];

        for (name, arguments) in calls {
            self.steps_used += 1;

            let sig = signature(name, arguments);
            self.recent_signatures.push_back(sig.clone());
            while self.recent_signatures.len() > self.config.loop_window {
                self.recent_signatures.pop_front();
            }

            let repeats = self
                .recent_signatures
                .iter()
                .filter(|s| **s == sig)
                .count();
            if repeats >= self.config.loop_threshold && !self.loop_signalled {
                self.loop_signalled = true;
                self.phase = BudgetPhase::AwaitingPermission;
                tracing::warn!(tool = %name, repeats, "tool-call loop detected");
                advisories.push(Advisory::LoopDetected {
                    tool: name.clone(),
                    repeats,
                });
            }
        }

        // A zero budget has no warning band; it goes straight to exhausted.
        if self.config.max_steps > 0 {
            let consumed = self.steps_used as f32 / self.config.max_steps as f32;
            let mut thresholds = self.config.warn_thresholds.clone();
            thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            for threshold in thresholds {
                let already = self.issued_thresholds.iter().any(|&t| t == threshold);
                if consumed >= threshold && !already {
                    self.issued_thresholds.push(threshold);
                    if self.phase == BudgetPhase::Active {
                        self.phase = BudgetPhase::Warned;
                    }
                    advisories.push(Advisory::StepWarning {
                        used: self.steps_used,
                        max: self.config.max_steps,
                        threshold,
                    });
                }
            }
        }

        if self.steps_used >= self.config.max_steps && !self.exhaustion_signalled {
            self.exhaustion_signalled = true;
            self.phase = BudgetPhase::AwaitingPermission;
            tracing::warn!(max_steps = self.config.max_steps, "step budget exhausted");
            advisories.push(Advisory::BudgetExhausted {
                max: self.config.max_steps,
            });
        }

        advisories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: serde_json::Value) -> (String, serde_json::Value) {
        (name.to_string(), args)
    }

    #[test]
    fn test_loop_detection_with_budget_remaining() {
        let mut state = BudgetState::new(BudgetConfig {
            max_steps: 100,
            ..Default::default()
        });

        let repeated = vec![call("run_tests", serde_json::json!({"suite": "unit"})); 5];
        let advisories = state.record_turn(&repeated);

        assert!(state.awaiting_permission());
        assert!(state.remaining() > 0);
        assert!(advisories
            .iter()
            .any(|a| matches!(a, Advisory::LoopDetected { repeats: 5, .. })));
    }

    #[test]
    fn test_distinct_arguments_do_not_loop() {
        let mut state = BudgetState::new(BudgetConfig::default());
        let calls: Vec<_> = (0..8)
            .map(|i| call("run_tests", serde_json::json!({"round": i})))
            .collect();
        let advisories = state.record_turn(&calls);
        assert_eq!(state.phase(), BudgetPhase::Active);
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = serde_json::json!({"suite": "unit", "verbose": true});
        let b: serde_json::Value =
            serde_json::from_str(r#"{"verbose": true, "suite": "unit"}"#).unwrap();
        assert_eq!(signature("t", &a), signature("t", &b));
    }

    #[test]
    fn test_warning_thresholds_fire_once() {
        let mut state = BudgetState::new(BudgetConfig {
            max_steps: 10,
            warn_thresholds: vec![0.8, 0.9],
            ..Default::default()
        });

        let step = |i: u32| call("search", serde_json::json!({"q": i}));

        // Steps 1..=7: no advisories.
        for i in 0..7 {
            assert!(state.record_turn(&[step(i)]).is_empty());
        }

        // Step 8 crosses 80%.
        let advisories = state.record_turn(&[step(7)]);
        assert_eq!(advisories.len(), 1);
        assert!(matches!(
            advisories[0],
            Advisory::StepWarning { used: 8, max: 10, .. }
        ));
        assert_eq!(state.phase(), BudgetPhase::Warned);

        // Step 9 crosses 90%; the 80% warning does not repeat.
        let advisories = state.record_turn(&[step(8)]);
        assert_eq!(advisories.len(), 1);
    }

    #[test]
    fn test_exhaustion_suspends() {
        let mut state = BudgetState::new(BudgetConfig {
            max_steps: 3,
            warn_thresholds: vec![],
            ..Default::default()
        });
        let calls: Vec<_> = (0..3)
            .map(|i| call("search", serde_json::json!({"q": i})))
            .collect();
        let advisories = state.record_turn(&calls);
        assert!(state.awaiting_permission());
        assert!(advisories
            .iter()
            .any(|a| matches!(a, Advisory::BudgetExhausted { max: 3 })));

        // Exhaustion is signalled once.
        let again = state.record_turn(&[call("search", serde_json::json!({"q": 9}))]);
        assert!(again.iter().all(|a| !matches!(a, Advisory::BudgetExhausted { .. })));
    }

    #[test]
    fn test_zero_budget_exhausts_immediately_without_warnings() {
        let mut state = BudgetState::new(BudgetConfig {
            max_steps: 0,
            ..Default::default()
        });
        let advisories = state.record_turn(&[call("search", serde_json::json!({}))]);
        assert!(state.awaiting_permission());
        assert!(advisories
            .iter()
            .any(|a| matches!(a, Advisory::BudgetExhausted { max: 0 })));
        assert!(advisories
            .iter()
            .all(|a| !matches!(a, Advisory::StepWarning { .. })));
    }

    #[test]
    fn test_grant_continuation_resets_phase_and_window() {
        let mut state = BudgetState::new(BudgetConfig {
            max_steps: 100,
            ..Default::default()
        });
        let repeated = vec![call("run_tests", serde_json::json!({})); 5];
        state.record_turn(&repeated);
        assert!(state.awaiting_permission());

        state.grant_continuation();
        assert_eq!(state.phase(), BudgetPhase::Active);

        // A single further repeat is not enough to re-trip detection.
        let advisories = state.record_turn(&[call("run_tests", serde_json::json!({}))]);
        assert!(advisories.is_empty());
        assert_eq!(state.phase(), BudgetPhase::Active);
    }

    #[test]
    fn test_loop_window_slides() {
        let mut state = BudgetState::new(BudgetConfig {
            max_steps: 1000,
            loop_window: 4,
            loop_threshold: 3,
            warn_thresholds: vec![],
            ..Default::default()
        });

        // Two repeats, then enough distinct calls to push them out of the
        // window, then two more repeats: never three in-window.
        let rep = call("run_tests", serde_json::json!({}));
        state.record_turn(&[rep.clone(), rep.clone()]);
        state.record_turn(&[
            call("a", serde_json::json!({})),
            call("b", serde_json::json!({})),
            call("c", serde_json::json!({})),
            call("d", serde_json::json!({})),
        ]);
        let advisories = state.record_turn(&[rep.clone(), rep.clone()]);
        assert!(advisories.is_empty());
        assert_eq!(state.phase(), BudgetPhase::Active);
    }

    #[test]
    fn test_advisory_prompt_text() {
        let advisory = Advisory::LoopDetected {
            tool: "run_tests".into(),
            repeats: 5,
        };
        let text = advisory.prompt_text();
        assert!(text.contains("run_tests"));
        assert!(text.contains("5"));
    }
}
