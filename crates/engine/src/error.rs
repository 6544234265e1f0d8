//! Engine error types

use thiserror::Error;

/// Errors surfaced by the router's control surface
///
/// The hot path does not return errors: backpressure is blocking, unmatched
/// packs are an observability event, and contract violations abort.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The router's control loop is no longer running
    #[error("router is no longer running")]
    RouterStopped,
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
