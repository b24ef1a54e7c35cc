use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown collector: {0}")]
    UnknownCollector(String),

    #[error("Collector {0} is required and cannot be disabled")]
    RequiredCollector(String),

    #[error("Interval {0}s out of range ({min}-{max}s)", min = crate::collector::MIN_INTERVAL_SECS, max = crate::collector::MAX_INTERVAL_SECS)]
    InvalidInterval(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate id: {0}")]
    Duplicate(String),

    #[error("Store limit exceeded: at most {0} entries")]
    LimitExceeded(usize),

    #[error("Invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Not supported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
