use thiserror::Error;

pub type Result<T, E = BusError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("communication error: {0}")]
    Communication(String),
    #[error("timeout")]
    Timeout,
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
}
