use thiserror::Error;

/// Errors surfaced by the core to its callers.
///
/// Timeout and unreachability are merged into one variant: every caller
/// above the transport adapter treats a slow peer the same as a dead one.
#[derive(Error, Debug, Clone)]
pub enum ChordError {
    #[error("key not found")]
    NotFound,

    #[error("peer {0} unreachable")]
    Unreachable(String),

    #[error("lookup exhausted all candidates without reaching an owner")]
    Routing,

    #[error("node is still joining and cannot serve requests yet")]
    NotReady,

    #[error("conflicting concurrent writes to the same key")]
    Conflict,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<tonic::transport::Error> for ChordError {
    fn from(err: tonic::transport::Error) -> Self {
        ChordError::Transport(err.to_string())
    }
}

impl From<ChordError> for tonic::Status {
    fn from(err: ChordError) -> Self {
        match err {
            ChordError::NotFound => tonic::Status::not_found(err.to_string()),
            ChordError::Unreachable(_) => tonic::Status::unavailable(err.to_string()),
            ChordError::Routing => tonic::Status::unavailable(err.to_string()),
            ChordError::NotReady => tonic::Status::failed_precondition(err.to_string()),
            ChordError::Conflict => tonic::Status::aborted(err.to_string()),
            ChordError::Config(_) => tonic::Status::invalid_argument(err.to_string()),
            ChordError::Transport(_) => tonic::Status::unavailable(err.to_string()),
        }
    }
}

impl From<tonic::Status> for ChordError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::NotFound => ChordError::NotFound,
            tonic::Code::FailedPrecondition => ChordError::NotReady,
            tonic::Code::Aborted => ChordError::Conflict,
            tonic::Code::InvalidArgument => ChordError::Config(status.message().to_string()),
            _ => ChordError::Unreachable(status.message().to_string()),
        }
    }
}
