//! Request preparation pipeline
//!
//! One statically ordered composition runs on every outgoing model request:
//! validate, compact (at most once), annotate. The budget tracker observes
//! turn outcomes separately through [`ContextPipeline::observe_turn`] and
//! its advisories surface on the next prepared request.
//!
//! Conversations are serialized individually: each thread's state sits
//! behind its own async mutex, held across the compactor's summarization
//! call, so two pipeline runs for one thread never overlap while distinct
//! threads proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use viva_ai::{Content, Message, Model, ModelRequest, Tool};

use crate::budget::{Advisory, BudgetConfig, BudgetState};
use crate::cache;
use crate::compaction::{self, CompactionConfig, CompactionStatus};
use crate::estimate::transcript_tokens;
use crate::transport::Transport;
use crate::validate::{self, ValidationReport};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target model (drives the caching capability gate)
    pub model: Model,
    /// Context compaction configuration
    pub compaction: CompactionConfig,
    /// Step budget configuration applied to each new conversation
    pub budget: BudgetConfig,
}

/// A ready-to-send request plus everything the orchestrator should know
/// about how it was prepared.
#[derive(Debug)]
pub struct PreparedRequest {
    /// The validated, compacted, annotated request
    pub request: ModelRequest,
    /// Budget advisories to surface in the agent's prompt context
    pub advisories: Vec<Advisory>,
    /// What the validator repaired
    pub validation: ValidationReport,
    /// What the compactor did
    pub compaction: CompactionStatus,
}

/// Per-conversation pipeline state
struct ThreadState {
    budget: BudgetState,
    previous_summary: Option<String>,
    pending_advisories: Vec<Advisory>,
}

/// The transcript-management pipeline. One instance serves many
/// conversations; state is keyed by thread id.
pub struct ContextPipeline {
    config: PipelineConfig,
    transport: Arc<dyn Transport>,
    threads: Mutex<HashMap<String, Arc<tokio::sync::Mutex<ThreadState>>>>,
}

impl ContextPipeline {
    /// Create a new pipeline
    pub fn new(config: PipelineConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            threads: Mutex::new(HashMap::new()),
        }
    }

    fn thread(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<ThreadState>> {
        self.threads
            .lock()
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(ThreadState {
                    budget: BudgetState::new(self.config.budget.clone()),
                    previous_summary: None,
                    pending_advisories: vec![],
                }))
            })
            .clone()
    }

    /// Prepare an outgoing request for one conversation turn. Infallible:
    /// every failure mode degrades to sending the best transcript we have.
    pub async fn prepare_request(
        &self,
        thread_id: &str,
        messages: Vec<Message>,
        system: Vec<Content>,
        tools: Vec<Tool>,
        cancel: CancellationToken,
    ) -> PreparedRequest {
        let state = self.thread(thread_id);
        let mut state = state.lock().await;

        let (validated, validation) = validate::validate(messages);

        let outcome = compaction::compact(
            validated,
            &self.config.compaction,
            &self.config.model,
            &self.transport,
            state.previous_summary.as_deref(),
            cancel,
        )
        .await;
        if let Some(record) = &outcome.summary {
            state.previous_summary = Some(record.text.clone());
        }

        let mut request = ModelRequest {
            system,
            tools,
            messages: outcome.messages,
        };
        cache::annotate(&mut request, &self.config.model);

        let mut advisories = std::mem::take(&mut state.pending_advisories);
        let tokens = transcript_tokens(&request.messages);
        if tokens > self.config.compaction.max_context_tokens {
            advisories.push(Advisory::ContextOverflow {
                tokens,
                budget: self.config.compaction.max_context_tokens,
            });
        }

        tracing::debug!(
            thread_id,
            tokens,
            advisories = advisories.len(),
            "prepared request"
        );

        PreparedRequest {
            request,
            advisories,
            validation,
            compaction: outcome.status,
        }
    }

    /// Record the tool calls a completed turn made. Returned advisories are
    /// also queued for the thread's next prepared request.
    pub async fn observe_turn(
        &self,
        thread_id: &str,
        calls: &[(String, serde_json::Value)],
    ) -> Vec<Advisory> {
        let state = self.thread(thread_id);
        let mut state = state.lock().await;
        let advisories = state.budget.record_turn(calls);
        state.pending_advisories.extend(advisories.iter().cloned());
        advisories
    }

    /// Whether a conversation requires explicit approval before further
    /// autonomous tool calls.
    pub async fn awaiting_permission(&self, thread_id: &str) -> bool {
        let state = self.thread(thread_id);
        let state = state.lock().await;
        state.budget.awaiting_permission()
    }

    /// External continuation signal for a suspended conversation.
    pub async fn grant_continuation(&self, thread_id: &str) {
        let state = self.thread(thread_id);
        let mut state = state.lock().await;
        state.budget.grant_continuation();
    }
}
