//! Motor attached to one of the controller's motor ports.
//!
//! Speed is a command: it is written on every call and announced on every
//! call. The tachometer is observed: it is polled each tick and announced only
//! when it moves.

use crate::device::{impl_device, Decode, DeviceCore};
use crate::error::{DeviceError, Result};
use crate::types::{DeviceKind, FieldValue, DEFAULT_REFRESH_PERIOD};
use brick_bus::{MotorPort, Port, Register, RegisterBus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Largest speed magnitude the controller accepts.
pub const MAX_SPEED: i32 = 255;

pub const SPEED_FIELD: &str = "Speed";
pub const TACHO_FIELD: &str = "TachoCount";

/// Sign convention applied to the current speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Backward,
    Forward,
    OppositeDirection,
}

impl Polarity {
    /// Platform code: Backward = -1, Forward = 1, OppositeDirection = 0.
    pub fn code(&self) -> i32 {
        match self {
            Polarity::Backward => -1,
            Polarity::Forward => 1,
            Polarity::OppositeDirection => 0,
        }
    }

    /// Speed after applying this polarity to `speed`.
    pub fn apply(&self, speed: i32) -> i32 {
        match self {
            Polarity::Backward if speed > 0 => speed.saturating_neg(),
            Polarity::Forward if speed < 0 => speed.saturating_neg(),
            Polarity::OppositeDirection => speed.saturating_neg(),
            _ => speed,
        }
    }
}

impl TryFrom<i32> for Polarity {
    type Error = DeviceError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            -1 => Ok(Polarity::Backward),
            1 => Ok(Polarity::Forward),
            0 => Ok(Polarity::OppositeDirection),
            other => Err(DeviceError::Config(format!("unknown polarity code {other}"))),
        }
    }
}

/// Clamp a requested speed into the range the controller accepts.
pub fn clamp_speed(speed: i32) -> i32 {
    speed.clamp(-MAX_SPEED, MAX_SPEED)
}

struct TachoDecoder {
    port: MotorPort,
}

impl Decode for TachoDecoder {
    fn decode(&self, bus: &dyn RegisterBus) -> brick_bus::Result<Vec<(&'static str, FieldValue)>> {
        let tacho = bus.read(Register::Encoder(self.port))?;
        Ok(vec![(TACHO_FIELD, FieldValue::Int(tacho))])
    }
}

pub struct Motor {
    core: Arc<DeviceCore>,
    port: MotorPort,
    enabled: AtomicBool,
}

impl_device!(Motor);

impl Motor {
    /// Bind a motor with the default one second refresh period.
    pub fn new(bus: Arc<dyn RegisterBus>, port: MotorPort) -> Result<Self> {
        Self::with_period(bus, port, DEFAULT_REFRESH_PERIOD)
    }

    pub fn with_period(bus: Arc<dyn RegisterBus>, port: MotorPort, period: Duration) -> Result<Self> {
        let core = DeviceCore::new(
            DeviceKind::Motor,
            Port::Motor(port),
            bus,
            period,
            Box::new(TachoDecoder { port }),
        )?;
        core.arm()?;
        Ok(Self {
            core,
            port,
            enabled: AtomicBool::new(false),
        })
    }

    pub fn motor_port(&self) -> MotorPort {
        self.port
    }

    /// Command a speed in -255..=255. Out of range values are clamped.
    pub fn set_speed(&self, speed: i32) -> Result<()> {
        let speed = clamp_speed(speed);
        self.core
            .command(|bus| bus.write(Register::MotorSpeed(self.port), speed))?;
        self.core.notifier().force(SPEED_FIELD, FieldValue::Int(speed));
        Ok(())
    }

    /// Speed currently held by the controller.
    pub fn speed(&self) -> Result<i32> {
        self.core
            .command(|bus| bus.read(Register::MotorSpeed(self.port)))
    }

    /// Enable the motor. The commanded speed is kept.
    pub fn start(&self) -> Result<()> {
        self.set_enabled(true)
    }

    /// Disable the motor. The commanded speed is kept.
    pub fn stop(&self) -> Result<()> {
        self.set_enabled(false)
    }

    pub fn start_with_speed(&self, speed: i32) -> Result<()> {
        self.set_speed(speed)?;
        self.start()
    }

    /// Last enable state commanded through [`Motor::start`] / [`Motor::stop`].
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.core.command(|bus| bus.set_flag(self.port, enabled))?;
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_polarity(&self, polarity: Polarity) -> Result<()> {
        let current = self.speed()?;
        let next = polarity.apply(current);
        if next != current {
            self.core
                .command(|bus| bus.write(Register::MotorSpeed(self.port), next))?;
            self.core.notifier().publish(SPEED_FIELD, FieldValue::Int(next));
        }
        Ok(())
    }

    /// Write the encoder offset the firmware subtracts from later tacho
    /// reads. Redefines the baseline, so no event is emitted.
    pub fn set_tacho_count(&self, offset: i32) -> Result<()> {
        self.core
            .command(|bus| bus.write(Register::EncoderOffset(self.port), offset))
    }

    /// Encoder count in half-degrees, after the offset.
    pub fn tacho_count(&self) -> Result<i32> {
        self.core
            .command(|bus| bus.read(Register::Encoder(self.port)))
    }
}
