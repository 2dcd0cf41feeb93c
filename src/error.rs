//! Error types for scorch.

use thiserror::Error;

/// Result type alias using scorch's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for planning operations.
///
/// `NotSupported` is the expected negative outcome of a search — no plugin
/// combination realizes the request — and callers are meant to branch on it
/// (offer another medium, another format). It is never an application error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// No plugin chain can realize the requested transformation.
    #[error("no plugin chain supports the requested operation")]
    NotSupported,

    /// A caller-supplied callback aborted a feasibility search.
    #[error("the search was cancelled by the caller")]
    Cancelled,

    /// The session carries no usable input or output description.
    #[error("the session has an empty input or output type")]
    EmptySession,

    /// Checksumming pipelines accept exactly one input track.
    #[error("checksumming requires exactly one input track, got {0}")]
    BadTrackCount(usize),
}
