use thiserror::Error;

/// Error kinds for the wire/session layer (§7), each carrying enough
/// information to render a MySQL ERR packet via [`ProtoError::to_mysql_error`].
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("syntax error: {0}")]
    Syntax(String),
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
    #[error(transparent)]
    Core(#[from] gateway_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ProtoError>;

impl ProtoError {
    /// Maps this error onto the `(error_code, sql_state, message)` triple
    /// the session dispatch loop writes into an ERR packet (§7).
    pub fn to_mysql_error(&self) -> (u16, &'static str, String) {
        match self {
            ProtoError::Protocol(msg) => (1047, "08S01", msg.clone()),
            ProtoError::Auth(msg) => (1045, "28000", msg.clone()),
            ProtoError::Syntax(msg) => (1064, "42000", msg.clone()),
            ProtoError::Semantic(msg) => (1146, "42S02", msg.clone()),
            ProtoError::Runtime(msg) => (1105, "HY000", msg.clone()),
            ProtoError::Storage(msg) => (1030, "HY000", msg.clone()),
            ProtoError::Internal(msg) => (1105, "HY000", format!("Internal error: {msg}")),
            ProtoError::Cancelled => (1317, "70100", "Query execution was interrupted".into()),
            ProtoError::Timeout => (3024, "HY000", "Query timed out".into()),
            ProtoError::Io(e) => (2013, "HY000", format!("Lost connection to server: {e}")),
            ProtoError::Core(core_err) => core_error_to_mysql(core_err),
        }
    }
}

fn core_error_to_mysql(err: &gateway_core::CoreError) -> (u16, &'static str, String) {
    use gateway_core::CoreError;
    match err {
        CoreError::Semantic(msg) => (1146, "42S02", msg.clone()),
        CoreError::Runtime(msg) => (1105, "HY000", msg.clone()),
        CoreError::Storage(msg) => (1030, "HY000", msg.clone()),
        CoreError::Internal(msg) => (1105, "HY000", format!("Internal error: {msg}")),
        CoreError::Cancelled => (1317, "70100", "Query execution was interrupted".into()),
        CoreError::Timeout => (3024, "HY000", "Query timed out".into()),
        CoreError::Io(e) => (2013, "HY000", format!("Lost connection to server: {e}")),
        CoreError::Serde(e) => (1105, "HY000", format!("Internal error: {e}")),
        CoreError::PoolClosed => (1053, "08S01", "Server shutdown in progress".into()),
        CoreError::PoolEmpty => (1040, "08004", "Too many connections".into()),
        // A hybrid dual-write partially landed (§4.4): report it as a
        // storage error carrying the applied count in the message rather
        // than inventing a new MySQL error code for a gateway-internal
        // write-routing detail.
        CoreError::PartialWrite { applied, source } => (
            1030,
            "HY000",
            format!("{applied} row(s) applied before failure: {source}"),
        ),
    }
}
