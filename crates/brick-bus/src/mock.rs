use crate::{BusError, MotorPort, Register, RegisterBus, Result, SensorPort, SensorType};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone, Copy)]
struct MotorRegs {
    speed: i32,
    encoder: i32,
    offset: i32,
    enabled: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct SensorRegs {
    value: i32,
    mode: SensorType,
}

#[derive(Debug, Default)]
struct MockState {
    motors: [MotorRegs; 4],
    sensors: [SensorRegs; 4],
    scripted: HashMap<Register, VecDeque<i32>>,
    offline: bool,
}

/// A simple in-process register bank. Each bus instance is independent.
///
/// The encoder register reports the raw encoder minus the written offset,
/// the way the controller firmware rebases it. Reads can be scripted per
/// register and the whole bus can be taken offline to exercise error paths.
#[derive(Debug, Default)]
pub struct MockBus {
    state: Mutex<MockState>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    /// Queue values returned by successive reads of `register`, ahead of the
    /// stored register value.
    pub fn queue_values(&self, register: Register, values: impl IntoIterator<Item = i32>) {
        self.state()
            .scripted
            .entry(register)
            .or_default()
            .extend(values);
    }

    /// Make every operation fail with a communication error while `offline`.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn set_sensor_value(&self, port: SensorPort, value: i32) {
        self.state().sensors[port.index()].value = value;
    }

    /// Set the raw (un-offset) encoder position of a motor.
    pub fn set_encoder(&self, port: MotorPort, ticks: i32) {
        self.state().motors[port.index()].encoder = ticks;
    }

    pub fn speed(&self, port: MotorPort) -> i32 {
        self.state().motors[port.index()].speed
    }

    pub fn is_enabled(&self, port: MotorPort) -> bool {
        self.state().motors[port.index()].enabled
    }

    pub fn encoder_offset(&self, port: MotorPort) -> i32 {
        self.state().motors[port.index()].offset
    }

    pub fn sensor_type(&self, port: SensorPort) -> SensorType {
        self.state().sensors[port.index()].mode
    }

    /// Simulate one motion step: every enabled motor moves by its speed.
    pub fn advance_motors(&self) {
        let mut state = self.state();
        for m in state.motors.iter_mut().filter(|m| m.enabled) {
            m.encoder = m.encoder.wrapping_add(m.speed);
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn online(state: &MockState) -> Result<()> {
        if state.offline {
            Err(BusError::Communication("mock bus offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RegisterBus for MockBus {
    fn read(&self, register: Register) -> Result<i32> {
        let mut state = self.state();
        Self::online(&state)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(v) = state.scripted.get_mut(&register).and_then(VecDeque::pop_front) {
            return Ok(v);
        }
        let value = match register {
            Register::MotorSpeed(p) => state.motors[p.index()].speed,
            Register::Encoder(p) => {
                let m = state.motors[p.index()];
                m.encoder.wrapping_sub(m.offset)
            }
            Register::EncoderOffset(p) => state.motors[p.index()].offset,
            Register::SensorValue(p) => state.sensors[p.index()].value,
        };
        Ok(value)
    }

    fn write(&self, register: Register, value: i32) -> Result<()> {
        let mut state = self.state();
        Self::online(&state)?;
        match register {
            Register::MotorSpeed(p) => state.motors[p.index()].speed = value,
            Register::EncoderOffset(p) => state.motors[p.index()].offset = value,
            Register::Encoder(_) | Register::SensorValue(_) => {
                return Err(BusError::Unsupported("register is read-only"));
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%register, value, "mock write");
        Ok(())
    }

    fn set_mode(&self, port: SensorPort, mode: SensorType) -> Result<()> {
        let mut state = self.state();
        Self::online(&state)?;
        state.sensors[port.index()].mode = mode;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_flag(&self, port: MotorPort, enabled: bool) -> Result<()> {
        let mut state = self.state();
        Self::online(&state)?;
        state.motors[port.index()].enabled = enabled;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn driver(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_register_roundtrip() {
        let bus = MockBus::new();
        bus.write(Register::MotorSpeed(MotorPort::B), -120).unwrap();
        assert_eq!(bus.read(Register::MotorSpeed(MotorPort::B)).unwrap(), -120);
        assert_eq!(bus.read(Register::MotorSpeed(MotorPort::A)).unwrap(), 0);
    }

    #[test]
    fn test_encoder_is_rebased_by_offset() {
        let bus = MockBus::new();
        bus.set_encoder(MotorPort::A, 720);
        bus.write(Register::EncoderOffset(MotorPort::A), 700).unwrap();
        assert_eq!(bus.read(Register::Encoder(MotorPort::A)).unwrap(), 20);
        assert_eq!(bus.encoder_offset(MotorPort::A), 700);
    }

    #[test]
    fn test_scripted_reads_take_precedence() {
        let bus = MockBus::new();
        bus.set_sensor_value(SensorPort::S1, 5);
        bus.queue_values(Register::SensorValue(SensorPort::S1), [1019, 1021]);
        let reg = Register::SensorValue(SensorPort::S1);
        assert_eq!(bus.read(reg).unwrap(), 1019);
        assert_eq!(bus.read(reg).unwrap(), 1021);
        assert_eq!(bus.read(reg).unwrap(), 5);
        assert_eq!(bus.reads(), 3);
    }

    #[test]
    fn test_offline_bus_fails_every_operation() {
        let bus = MockBus::new();
        bus.set_offline(true);
        assert!(matches!(
            bus.read(Register::SensorValue(SensorPort::S2)),
            Err(BusError::Communication(_))
        ));
        assert!(bus.set_flag(MotorPort::C, true).is_err());
        assert!(bus.set_mode(SensorPort::S2, SensorType::Ev3Touch).is_err());
        bus.set_offline(false);
        assert!(bus.set_flag(MotorPort::C, true).is_ok());
        assert!(bus.is_enabled(MotorPort::C));
    }

    #[test]
    fn test_read_only_registers_reject_writes() {
        let bus = MockBus::new();
        assert_eq!(
            bus.write(Register::Encoder(MotorPort::A), 1),
            Err(BusError::Unsupported("register is read-only"))
        );
        assert_eq!(bus.writes(), 0);
    }

    #[test]
    fn test_advance_moves_enabled_motors_only() {
        let bus = MockBus::new();
        bus.write(Register::MotorSpeed(MotorPort::A), 10).unwrap();
        bus.write(Register::MotorSpeed(MotorPort::B), 10).unwrap();
        bus.set_flag(MotorPort::A, true).unwrap();
        bus.advance_motors();
        bus.advance_motors();
        assert_eq!(bus.read(Register::Encoder(MotorPort::A)).unwrap(), 20);
        assert_eq!(bus.read(Register::Encoder(MotorPort::B)).unwrap(), 0);
    }
}
