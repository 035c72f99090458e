use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The host aborted the operation before it completed.
    #[error("Bridge operation cancelled")]
    Cancelled,

    /// A ranged request started at or past the end of the resource (416).
    #[error("HTTP 416: requested range not satisfiable")]
    RangeNotSatisfiable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
