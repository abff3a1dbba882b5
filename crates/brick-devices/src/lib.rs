//! brick-devices: polled motors and sensors with change notification
//!
//! Every device binds to one port of a [`brick_bus::RegisterBus`], refreshes
//! its cached fields on a background timer and tells subscribers about every
//! field whose value changed. Boards are described in YAML and built into a
//! [`Board`] of [`AnyDevice`]s.

mod types;
pub use types::{
    ChangeEvent, DeviceKind, DeviceState, FieldValue, RefreshStats, DEFAULT_REFRESH_PERIOD,
};

mod error;
pub use error::{DeviceError, Result};

mod notifier;
pub use notifier::{ChangeNotifier, Listener, Subscription};

mod scheduler;
pub use scheduler::{RefreshScheduler, Tick};

mod device;
pub use device::Device;

mod motor;
pub use motor::{clamp_speed, Motor, Polarity, MAX_SPEED, SPEED_FIELD, TACHO_FIELD};

mod sensor;
pub use sensor::SensorModes;

mod touch;
pub use touch::{TouchSensor, NOT_PRESSED, PRESSED, TOUCH_THRESHOLD, VALUE_FIELD, VALUE_TEXT_FIELD};

mod config;
pub use config::{load_board_file, parse_board_config, BoardConfig, DeviceSpec};

mod board;
pub use board::{AnyDevice, Board};
