use crate::{MotorPort, Register, Result, SensorPort, SensorType};

/// A minimal blocking register bus shared by every device on one controller.
///
/// Methods take `&self`: one handle is shared between devices and their
/// refresh threads, so backends provide their own interior locking. Calls are
/// expected to return within the transport timeout. Retrying is the backend's
/// business; callers never retry.
pub trait RegisterBus: Send + Sync {
    /// Read the raw value of a register.
    fn read(&self, register: Register) -> Result<i32>;

    /// Write a raw value to a register.
    fn write(&self, register: Register, value: i32) -> Result<()>;

    /// Configure the sensor type decoded by the firmware on a sensor port.
    fn set_mode(&self, port: SensorPort, mode: SensorType) -> Result<()>;

    /// Set the enable flag of a motor port.
    fn set_flag(&self, port: MotorPort, enabled: bool) -> Result<()>;

    /// Human readable backend name, for logs.
    fn driver(&self) -> &str {
        "unknown"
    }
}
