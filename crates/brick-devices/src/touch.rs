//! EV3 touch sensor.

use crate::device::{impl_device, Decode, DeviceCore};
use crate::error::Result;
use crate::sensor::SensorModes;
use crate::types::{DeviceKind, FieldValue, DEFAULT_REFRESH_PERIOD};
use brick_bus::{Port, Register, RegisterBus, SensorPort, SensorType};
use std::sync::Arc;
use std::time::Duration;

/// Raw readings above this value count as pressed.
pub const TOUCH_THRESHOLD: i32 = 1020;

pub const VALUE_FIELD: &str = "Value";
pub const VALUE_TEXT_FIELD: &str = "ValueAsString";

pub const PRESSED: &str = "Pressed";
pub const NOT_PRESSED: &str = "Not pressed";

pub(crate) fn is_pressed_raw(raw: i32) -> bool {
    raw > TOUCH_THRESHOLD
}

pub(crate) fn label(raw: i32) -> &'static str {
    if is_pressed_raw(raw) {
        PRESSED
    } else {
        NOT_PRESSED
    }
}

struct TouchDecoder {
    port: SensorPort,
}

impl Decode for TouchDecoder {
    fn decode(&self, bus: &dyn RegisterBus) -> brick_bus::Result<Vec<(&'static str, FieldValue)>> {
        let raw = bus.read(Register::SensorValue(self.port))?;
        Ok(vec![
            (VALUE_FIELD, FieldValue::Int(raw)),
            (VALUE_TEXT_FIELD, FieldValue::from(label(raw))),
        ])
    }
}

pub struct TouchSensor {
    core: Arc<DeviceCore>,
    port: SensorPort,
}

impl_device!(TouchSensor);

impl TouchSensor {
    pub fn new(bus: Arc<dyn RegisterBus>, port: SensorPort) -> Result<Self> {
        Self::with_period(bus, port, DEFAULT_REFRESH_PERIOD)
    }

    /// Configure the port for a touch sensor and start polling it.
    pub fn with_period(bus: Arc<dyn RegisterBus>, port: SensorPort, period: Duration) -> Result<Self> {
        let core = DeviceCore::new(
            DeviceKind::Touch,
            Port::Sensor(port),
            Arc::clone(&bus),
            period,
            Box::new(TouchDecoder { port }),
        )?;
        core.configure(|bus| bus.set_mode(port, SensorType::Ev3Touch))?;
        core.arm()?;
        Ok(Self { core, port })
    }

    pub fn sensor_port(&self) -> SensorPort {
        self.port
    }

    pub fn read_raw(&self) -> Result<i32> {
        self.core
            .command(|bus| bus.read(Register::SensorValue(self.port)))
    }

    pub fn is_pressed(&self) -> Result<bool> {
        Ok(is_pressed_raw(self.read_raw()?))
    }

    pub fn read_as_string(&self) -> Result<&'static str> {
        Ok(label(self.read_raw()?))
    }
}

impl SensorModes for TouchSensor {
    fn name(&self) -> &'static str {
        "EV3 Touch"
    }

    fn number_of_modes(&self) -> usize {
        1
    }

    fn selected_mode(&self) -> &'static str {
        "Analog"
    }

    fn select_next_mode(&self) {}

    fn select_previous_mode(&self) {}
}
