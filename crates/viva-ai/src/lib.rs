//! viva-ai: Model request/response types for the viva interview platform
//!
//! This crate defines the message, content, tool, and request shapes shared
//! by everything that talks to a model provider. The providers themselves
//! live behind the `Transport` trait in `viva-context`.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
