//! Closed set of device variants and the board that owns them.

use crate::config::{BoardConfig, DeviceSpec};
use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::motor::Motor;
use crate::notifier::{Listener, Subscription};
use crate::sensor::SensorModes;
use crate::touch::TouchSensor;
use crate::types::{DeviceKind, DeviceState, FieldValue, RefreshStats};
use brick_bus::{Port, RegisterBus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Every device the board can host
pub enum AnyDevice {
    Motor(Motor),
    Touch(TouchSensor),
}

impl AnyDevice {
    /// Build the device described by `spec` on `bus`.
    pub fn from_spec(bus: Arc<dyn RegisterBus>, spec: &DeviceSpec) -> Result<Self> {
        spec.validate()?;
        let period = spec.refresh_period();
        match (spec.kind, spec.port) {
            (DeviceKind::Motor, Port::Motor(port)) => {
                Ok(AnyDevice::Motor(Motor::with_period(bus, port, period)?))
            }
            (DeviceKind::Touch, Port::Sensor(port)) => {
                Ok(AnyDevice::Touch(TouchSensor::with_period(bus, port, period)?))
            }
            (kind, port) => Err(DeviceError::Config(format!(
                "a {kind} cannot be attached to port {port}"
            ))),
        }
    }

    fn inner(&self) -> &dyn Device {
        match self {
            AnyDevice::Motor(m) => m,
            AnyDevice::Touch(t) => t,
        }
    }

    pub fn as_motor(&self) -> Option<&Motor> {
        match self {
            AnyDevice::Motor(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_touch(&self) -> Option<&TouchSensor> {
        match self {
            AnyDevice::Touch(t) => Some(t),
            _ => None,
        }
    }

    /// Mode navigation, for sensors.
    pub fn sensor_modes(&self) -> Option<&dyn SensorModes> {
        match self {
            AnyDevice::Touch(t) => Some(t),
            AnyDevice::Motor(_) => None,
        }
    }
}

impl Device for AnyDevice {
    fn kind(&self) -> DeviceKind {
        self.inner().kind()
    }

    fn port(&self) -> Port {
        self.inner().port()
    }

    fn refresh_period(&self) -> Duration {
        self.inner().refresh_period()
    }

    fn set_refresh_period(&self, period: Duration) -> Result<()> {
        self.inner().set_refresh_period(period)
    }

    fn arm(&self) -> Result<()> {
        self.inner().arm()
    }

    fn dispose(&self) {
        self.inner().dispose()
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.inner().subscribe(listener)
    }

    fn refresh(&self) -> Result<()> {
        self.inner().refresh()
    }

    fn state(&self) -> DeviceState {
        self.inner().state()
    }

    fn snapshot(&self) -> BTreeMap<&'static str, FieldValue> {
        self.inner().snapshot()
    }

    fn stats(&self) -> RefreshStats {
        self.inner().stats()
    }
}

/// Devices built from a [`BoardConfig`], keyed by id, sharing one bus.
pub struct Board {
    bus: Arc<dyn RegisterBus>,
    devices: BTreeMap<String, AnyDevice>,
}

impl Board {
    pub fn new(bus: Arc<dyn RegisterBus>) -> Self {
        Self {
            bus,
            devices: BTreeMap::new(),
        }
    }

    /// Build every configured device. Devices already built are disposed if
    /// a later one fails.
    pub fn from_config(bus: Arc<dyn RegisterBus>, config: &BoardConfig) -> Result<Self> {
        config.validate()?;
        let mut board = Self::new(bus);
        for spec in &config.devices {
            if let Err(e) = board.attach(spec) {
                board.dispose_all();
                return Err(e);
            }
        }
        info!(devices = board.devices.len(), "board ready");
        Ok(board)
    }

    /// Build and register one device. Fails if the id or port is taken.
    pub fn attach(&mut self, spec: &DeviceSpec) -> Result<&AnyDevice> {
        if self.devices.contains_key(&spec.id) {
            return Err(DeviceError::Config(format!("duplicate device id: {}", spec.id)));
        }
        if self.devices.values().any(|d| d.port() == spec.port) {
            return Err(DeviceError::Config(format!("port {} already in use", spec.port)));
        }
        let device = AnyDevice::from_spec(Arc::clone(&self.bus), spec)?;
        Ok(self.devices.entry(spec.id.clone()).or_insert(device))
    }

    pub fn get(&self, id: &str) -> Option<&AnyDevice> {
        self.devices.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnyDevice)> {
        self.devices.iter().map(|(id, d)| (id.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Dispose and forget one device.
    pub fn detach(&mut self, id: &str) -> bool {
        match self.devices.remove(id) {
            Some(device) => {
                device.dispose();
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&mut self) {
        for device in self.devices.values() {
            device.dispose();
        }
        self.devices.clear();
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
