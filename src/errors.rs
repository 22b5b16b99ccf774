use thiserror::Error;

/// Error kinds surfaced by the partitioned-table core.
///
/// `IoError` is reserved for metadata file decode failures (truncation, unknown
/// version, malformed lengths) and propagates to the caller without retry.
/// `RuntimeError` covers transient failures such as a non-201 replication
/// response, recoverable by the next scheduler tick. `IllegalState` marks
/// programmer errors (e.g. replicating to the local replica) and fails fast.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    IoError(String),
    #[error("runtime error: {0}")]
    RuntimeError(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> CoreError {
        CoreError::IoError(err.to_string())
    }
}

#[macro_export]
macro_rules! bail {
    ($kind:expr, $e:expr) => {
        return Err($kind($e.to_string()))
    };
    ($kind:expr, $fmt:expr, $($arg:tt)+) => {
        return Err($kind(format!($fmt, $($arg)+)))
    };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $kind:expr, $e:expr) => {
        if !($cond) {
            $crate::bail!($kind, $e);
        }
    };
    ($cond:expr, $kind:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::bail!($kind, $fmt, $($arg)+);
        }
    };
}
