//! Error types for autoroute.

use thiserror::Error;

/// Result type alias using autoroute's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for autoroute operations.
///
/// Candidate rejection during planning (validator failures, caps
/// mismatches, failed test negotiations) is not an error: rejected
/// candidates are dropped and the search continues. Only conditions the
/// host must act on surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// No factory catalog provider has been configured on the policy.
    #[error("no factory catalog provider has been configured")]
    PolicyMissing,

    /// Committing the selected proposals to a live graph failed.
    ///
    /// This is fatal for the planning pass: the partial graph is torn
    /// down and the bin is left without a live graph.
    #[error("graph instantiation failed: {0}")]
    Instantiation(String),

    /// An endpoint id did not resolve to a live endpoint.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// An element rejected a buffer while streaming.
    #[error("element processing failed: {0}")]
    Processing(String),
}
