//! viva-context: transcript management for long-running interview sessions
//!
//! Every outgoing model request passes through the same statically ordered
//! pipeline: validation (structural repair), compaction (summarize old
//! context when over budget), then cache annotation (mark stable prefixes
//! for caching-aware providers). A per-conversation budget tracker observes
//! turn outcomes independently and surfaces advisories when the agent is
//! running out of steps or stuck in a tool-call loop.

pub mod budget;
pub mod cache;
pub mod compaction;
pub mod error;
pub mod estimate;
pub mod pipeline;
pub mod store;
pub mod transport;
pub mod validate;

pub use budget::{Advisory, BudgetConfig, BudgetPhase, BudgetState};
pub use compaction::{CompactionConfig, CompactionOutcome, CompactionStatus, SummaryRecord};
pub use error::Error;
pub use pipeline::{ContextPipeline, PipelineConfig, PreparedRequest};
pub use store::{MemoryStore, TranscriptStore};
pub use transport::Transport;
pub use validate::ValidationReport;
