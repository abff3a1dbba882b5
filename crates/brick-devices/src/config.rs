use crate::error::{DeviceError, Result};
use crate::types::{DeviceKind, DEFAULT_REFRESH_PERIOD};
use anyhow::Context;
use brick_bus::Port;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_refresh_period_ms() -> u64 {
    DEFAULT_REFRESH_PERIOD.as_millis() as u64
}

/// One device attached to the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: String,
    pub kind: DeviceKind,
    pub port: Port,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
}

impl DeviceSpec {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_period_ms == 0 {
            return Err(DeviceError::Config(format!(
                "{}: refresh_period_ms must be greater than zero",
                self.id
            )));
        }
        let port_ok = match self.kind {
            DeviceKind::Motor => self.port.is_motor(),
            DeviceKind::Touch => self.port.is_sensor(),
        };
        if !port_ok {
            return Err(DeviceError::Config(format!(
                "{}: a {} cannot be attached to port {}",
                self.id, self.kind, self.port
            )));
        }
        Ok(())
    }
}

/// Devices attached to one controller board
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

impl BoardConfig {
    /// Check every device and reject duplicate ids or ports.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for spec in &self.devices {
            spec.validate()?;
            if !ids.insert(spec.id.as_str()) {
                return Err(DeviceError::Config(format!("duplicate device id: {}", spec.id)));
            }
            if !ports.insert(spec.port) {
                return Err(DeviceError::Config(format!(
                    "port {} is used by more than one device",
                    spec.port
                )));
            }
        }
        Ok(())
    }
}

pub fn parse_board_config(raw: &str) -> anyhow::Result<BoardConfig> {
    let config: BoardConfig = serde_yaml::from_str(raw).context("parsing board yaml")?;
    config.validate()?;
    Ok(config)
}

pub fn load_board_file(path: impl AsRef<Path>) -> anyhow::Result<BoardConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading board config: {}", path.display()))?;
    parse_board_config(&raw).with_context(|| format!("loading board config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brick_bus::{MotorPort, SensorPort};

    const BOARD: &str = r#"
devices:
  - id: left_drive
    kind: motor
    port: A
    refresh_period_ms: 250
  - id: bumper
    kind: touch
    port: S1
"#;

    #[test]
    fn test_parse_board() {
        let config = parse_board_config(BOARD).unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].port, Port::Motor(MotorPort::A));
        assert_eq!(config.devices[0].refresh_period(), Duration::from_millis(250));
        assert_eq!(config.devices[1].kind, DeviceKind::Touch);
        assert_eq!(config.devices[1].port, Port::Sensor(SensorPort::S1));
        assert_eq!(config.devices[1].refresh_period(), DEFAULT_REFRESH_PERIOD);
    }

    #[test]
    fn test_reject_zero_period() {
        let raw = "devices:\n  - {id: m, kind: motor, port: B, refresh_period_ms: 0}\n";
        assert!(parse_board_config(raw).is_err());
    }

    #[test]
    fn test_reject_kind_port_mismatch() {
        let spec = DeviceSpec {
            id: "bad".into(),
            kind: DeviceKind::Touch,
            port: Port::Motor(MotorPort::C),
            refresh_period_ms: 100,
        };
        assert!(matches!(spec.validate(), Err(DeviceError::Config(_))));
    }

    #[test]
    fn test_reject_duplicates() {
        let raw = "devices:\n  - {id: a, kind: motor, port: A}\n  - {id: a, kind: motor, port: B}\n";
        let err = parse_board_config(raw).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate device id"));

        let raw = "devices:\n  - {id: a, kind: touch, port: S2}\n  - {id: b, kind: touch, port: S2}\n";
        let err = parse_board_config(raw).unwrap_err();
        assert!(format!("{err:#}").contains("more than one device"));
    }

    #[test]
    fn test_unknown_port_is_a_parse_error() {
        let raw = "devices:\n  - {id: a, kind: motor, port: Z}\n";
        assert!(parse_board_config(raw).is_err());
    }

    #[test]
    fn test_demo_board_is_valid() {
        let config = parse_board_config(include_str!("../../../configs/boards/demo.yaml")).unwrap();
        assert_eq!(config.devices.len(), 3);
        assert!(config.devices.iter().any(|d| d.kind == DeviceKind::Touch));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_board_file("/nonexistent/board.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("reading board config"));
    }
}
