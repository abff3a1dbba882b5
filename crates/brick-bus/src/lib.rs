//! brick-bus: register-bus abstractions for the brick controller board
//!
//! This crate provides the port identities, register addressing and the
//! [`RegisterBus`] contract through which every motor and sensor talks to the
//! controller. The physical transport lives behind that trait. The default
//! build enables a `mock` backend so that devices and binaries can run on any
//! host without a board attached.

mod types;
pub use types::{MotorPort, Port, Register, SensorPort, SensorType};

mod error;
pub use error::{BusError, Result};

mod traits;
pub use traits::RegisterBus;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockBus;
