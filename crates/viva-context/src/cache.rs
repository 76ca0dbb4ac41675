//! Cache-breakpoint annotation
//!
//! Marks the stable prefix of an outgoing request so a caching-aware
//! provider can reuse previously processed content: the last system block,
//! every tool definition, and the last block of the last message (which
//! covers everything at or before it). Must run after validation and
//! compaction, whose mutations would invalidate earlier markers.
//!
//! Annotation is clear-then-set, so re-running it replaces markers instead
//! of duplicating them, and a block sequence never carries more than one.

use viva_ai::{CacheControl, Content, Model, ModelRequest};

/// Clear every marker in a block sequence, then mark the final block.
fn mark_last(blocks: &mut [Content]) {
    for block in blocks.iter_mut() {
        block.set_cache_control(None);
    }
    if let Some(last) = blocks.last_mut() {
        last.set_cache_control(Some(CacheControl::Ephemeral));
    }
}

/// Annotate a request with cache breakpoints. Providers that do not honor
/// caching receive the request untouched.
pub fn annotate(request: &mut ModelRequest, model: &Model) {
    if !model.supports_caching() {
        return;
    }

    mark_last(&mut request.system);

    for tool in &mut request.tools {
        tool.cache_control = Some(CacheControl::Ephemeral);
    }

    for message in &mut request.messages {
        for block in message.content_mut().iter_mut() {
            block.set_cache_control(None);
        }
    }
    if let Some(last) = request.messages.last_mut() {
        mark_last(last.content_mut());
    }
}
