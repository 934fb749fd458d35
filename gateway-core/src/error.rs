use thiserror::Error;

/// Error kinds as laid out in the error-handling design: each variant maps
/// to a MySQL error class the session layer translates into an ERR packet.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("semantic error: {0}")]
    Semantic(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("query execution was interrupted")]
    Cancelled,
    #[error("query timed out")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] bincode::Error),
    #[error("pool is closed")]
    PoolClosed,
    #[error("pool is empty")]
    PoolEmpty,
    /// A write that touches more than one backend (hybrid dual-write)
    /// partially succeeded: `applied` rows landed on the backend that
    /// went first before a later backend failed.
    #[error("{applied} row(s) applied before failure: {source}")]
    PartialWrite { applied: usize, source: Box<CoreError> },
}

pub type Result<T> = std::result::Result<T, CoreError>;
