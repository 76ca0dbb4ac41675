//! Transport abstraction over the model invocation
//!
//! The actual provider exchange (HTTP, streaming, auth) lives outside this
//! crate; the pipeline only needs a request/response call it can cancel.
//! The compactor uses the same transport for summary generation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use viva_ai::{ModelRequest, ModelResponse};

/// The model invocation consumed by the pipeline. This is the only
/// blocking/suspending operation in the pipeline; everything else is pure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request to the model and wait for the complete response.
    /// Implementations should return `Error::Aborted` when `cancel` fires.
    async fn invoke(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> viva_ai::Result<ModelResponse>;
}
