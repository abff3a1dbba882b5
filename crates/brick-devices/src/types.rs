use brick_bus::Port;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Refresh period used when a device is built without one.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_millis(1000);

/// Decoded value of one tracked field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i32),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// A tracked field changed value. `old` is `None` the first time a field is
/// observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub port: Port,
    pub field: &'static str,
    pub old: Option<FieldValue>,
    pub new: FieldValue,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Lifecycle of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Bus bound and refresh armed, nothing observed or commanded yet
    Created,
    Active,
    /// Terminal
    Disposed,
}

impl DeviceState {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => DeviceState::Created,
            1 => DeviceState::Active,
            _ => DeviceState::Disposed,
        }
    }
}

/// Kinds of device the board knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Motor,
    Touch,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Motor => f.write_str("motor"),
            DeviceKind::Touch => f.write_str("touch"),
        }
    }
}

/// Counters kept by a device's refresh scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    /// Fires that completed a decode
    pub ticks: u64,
    /// Fires dropped because decode failed
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use brick_bus::SensorPort;

    #[test]
    fn test_field_value_accessors() {
        assert_eq!(FieldValue::Int(7).as_int(), Some(7));
        assert_eq!(FieldValue::from("Pressed").as_text(), Some("Pressed"));
        assert_eq!(FieldValue::from(true).as_int(), None);
        assert_eq!(FieldValue::Int(-3).to_string(), "-3");
    }

    #[test]
    fn test_change_event_json() {
        let event = ChangeEvent {
            port: Port::Sensor(SensorPort::S1),
            field: "ValueAsString",
            old: None,
            new: FieldValue::from("Pressed"),
            at: OffsetDateTime::from_unix_timestamp(1_714_564_800).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["port"], "S1");
        assert_eq!(json["field"], "ValueAsString");
        assert!(json["old"].is_null());
        assert_eq!(json["new"], "Pressed");
        assert_eq!(json["at"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [DeviceState::Created, DeviceState::Active, DeviceState::Disposed] {
            assert_eq!(DeviceState::from_u8(state.as_u8()), state);
        }
    }
}
