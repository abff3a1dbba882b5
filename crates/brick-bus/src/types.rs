use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Motor slot on the controller (A–D)
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MotorPort {
    A,
    B,
    C,
    D,
}

impl MotorPort {
    pub const ALL: [MotorPort; 4] = [MotorPort::A, MotorPort::B, MotorPort::C, MotorPort::D];

    /// Zero-based slot index on the bus.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotorPort::A => "A",
            MotorPort::B => "B",
            MotorPort::C => "C",
            MotorPort::D => "D",
        }
    }
}

impl fmt::Display for MotorPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotorPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(MotorPort::A),
            "B" => Ok(MotorPort::B),
            "C" => Ok(MotorPort::C),
            "D" => Ok(MotorPort::D),
            other => Err(format!("unknown motor port: {other}")),
        }
    }
}

/// Sensor slot on the controller (S1–S4)
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorPort {
    S1,
    S2,
    S3,
    S4,
}

impl SensorPort {
    pub const ALL: [SensorPort; 4] = [
        SensorPort::S1,
        SensorPort::S2,
        SensorPort::S3,
        SensorPort::S4,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorPort::S1 => "S1",
            SensorPort::S2 => "S2",
            SensorPort::S3 => "S3",
            SensorPort::S4 => "S4",
        }
    }
}

impl fmt::Display for SensorPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_uppercase();
        // Accept both "S1" and the bare slot number "1"
        match t.strip_prefix('S').unwrap_or(&t) {
            "1" => Ok(SensorPort::S1),
            "2" => Ok(SensorPort::S2),
            "3" => Ok(SensorPort::S3),
            "4" => Ok(SensorPort::S4),
            _ => Err(format!("unknown sensor port: {s}")),
        }
    }
}

/// Any physical slot on the controller
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Motor(MotorPort),
    Sensor(SensorPort),
}

impl Port {
    pub fn is_motor(&self) -> bool {
        matches!(self, Port::Motor(_))
    }

    pub fn is_sensor(&self) -> bool {
        matches!(self, Port::Sensor(_))
    }
}

impl From<MotorPort> for Port {
    fn from(port: MotorPort) -> Self {
        Port::Motor(port)
    }
}

impl From<SensorPort> for Port {
    fn from(port: SensorPort) -> Self {
        Port::Sensor(port)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Motor(p) => p.fmt(f),
            Port::Sensor(p) => p.fmt(f),
        }
    }
}

impl FromStr for Port {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(p) = s.parse::<MotorPort>() {
            return Ok(Port::Motor(p));
        }
        s.parse::<SensorPort>()
            .map(Port::Sensor)
            .map_err(|_| format!("unknown port: {s}"))
    }
}

/// Register addressed on the bus. Each variant carries the slot it belongs to,
/// so a register can never be addressed on the wrong kind of port.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Register {
    /// Commanded motor speed, -255..=255
    MotorSpeed(MotorPort),
    /// Encoder count in half-degrees, already rebased by the offset
    Encoder(MotorPort),
    /// Offset subtracted from the raw encoder by the firmware
    EncoderOffset(MotorPort),
    /// Raw sensor reading
    SensorValue(SensorPort),
}

impl Register {
    pub fn port(&self) -> Port {
        match *self {
            Register::MotorSpeed(p) | Register::Encoder(p) | Register::EncoderOffset(p) => {
                Port::Motor(p)
            }
            Register::SensorValue(p) => Port::Sensor(p),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::MotorSpeed(p) => write!(f, "{p}.speed"),
            Register::Encoder(p) => write!(f, "{p}.encoder"),
            Register::EncoderOffset(p) => write!(f, "{p}.encoder_offset"),
            Register::SensorValue(p) => write!(f, "{p}.value"),
        }
    }
}

/// Sensor type configured on a sensor port
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    #[default]
    Raw,
    Ev3Touch,
}

impl SensorType {
    /// Firmware code for this sensor type.
    pub fn code(&self) -> u8 {
        match self {
            SensorType::Raw => 0,
            SensorType::Ev3Touch => 69,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_indices_are_stable() {
        assert_eq!(MotorPort::A.index(), 0);
        assert_eq!(MotorPort::D.index(), 3);
        assert_eq!(SensorPort::S1.index(), 0);
        assert_eq!(SensorPort::S4.index(), 3);
    }

    #[test]
    fn test_port_parsing() {
        assert_eq!("a".parse::<MotorPort>(), Ok(MotorPort::A));
        assert_eq!("S3".parse::<SensorPort>(), Ok(SensorPort::S3));
        assert_eq!("2".parse::<SensorPort>(), Ok(SensorPort::S2));
        assert_eq!("C".parse::<Port>(), Ok(Port::Motor(MotorPort::C)));
        assert_eq!("s4".parse::<Port>(), Ok(Port::Sensor(SensorPort::S4)));
        assert!("E".parse::<Port>().is_err());
        assert!("S5".parse::<SensorPort>().is_err());
    }

    #[test]
    fn test_register_port_mapping() {
        assert_eq!(Register::Encoder(MotorPort::B).port(), Port::Motor(MotorPort::B));
        assert_eq!(
            Register::SensorValue(SensorPort::S2).port(),
            Port::Sensor(SensorPort::S2)
        );
        assert_eq!(Register::EncoderOffset(MotorPort::A).to_string(), "A.encoder_offset");
    }

    #[test]
    fn test_port_serde_names() {
        let json = serde_json::to_string(&Port::Sensor(SensorPort::S1)).unwrap();
        assert_eq!(json, "\"S1\"");
        let port: Port = serde_json::from_str("\"B\"").unwrap();
        assert_eq!(port, Port::Motor(MotorPort::B));
    }
}
