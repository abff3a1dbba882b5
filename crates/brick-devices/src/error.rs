use brick_bus::BusError;
use thiserror::Error;

pub type Result<T, E = DeviceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("device has been disposed")]
    Disposed,
    #[error("refresh period must be greater than zero")]
    InvalidPeriod,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl DeviceError {
    /// True when the underlying bus failed to communicate.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            DeviceError::Bus(BusError::Communication(_) | BusError::Timeout)
        )
    }
}
