//! The reservation capability the monitors poll.
//!
//! The engine only knows this trait. [`HttpReserver`] talks to the real
//! course-selection endpoint; tests plug in scripted implementations.

pub mod http;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::model::{RawResult, TaskKey};

pub use http::HttpReserver;

/// Everything an attempt needs besides the key.
#[derive(Debug)]
pub struct AttemptContext {
    /// Course title, sent along with the request.
    pub display_name: String,
    /// Session cookie string for the endpoint.
    pub credentials: SecretString,
}

/// One reservation attempt against the external endpoint.
///
/// Implementations never fail: anything that prevents a structured reply is
/// reported as [`RawResult::TransportFailure`]. Timeouts are the
/// implementation's own concern.
#[async_trait]
pub trait Reserve: Send + Sync {
    async fn attempt(&self, key: &TaskKey, ctx: &AttemptContext) -> RawResult;
}
