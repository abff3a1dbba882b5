use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use brick_bus::{MockBus, MotorPort, Register, RegisterBus, SensorPort};
use brick_devices as dev;
use brick_devices::Device;

#[derive(Parser, Debug)]
#[command(
    name = "brick",
    version,
    about = "Brick controller CLI (mock bus)",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PolarityArg {
    Backward,
    Forward,
    Opposite,
}

impl From<PolarityArg> for dev::Polarity {
    fn from(p: PolarityArg) -> Self {
        match p {
            PolarityArg::Backward => dev::Polarity::Backward,
            PolarityArg::Forward => dev::Polarity::Forward,
            PolarityArg::Opposite => dev::Polarity::OppositeDirection,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List motor and sensor ports with their registers
    Ports,
    /// Validate a board configuration file
    ConfigValidate {
        /// YAML file path
        #[arg(long)]
        file: String,
        /// Print JSON after validation
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Drive one motor on the mock bus and print its events
    Motor {
        /// Motor port (A-D)
        #[arg(long, default_value = "A")]
        port: MotorPort,
        /// Requested speed, clamped to -255..=255
        #[arg(long, allow_hyphen_values = true)]
        speed: Option<i32>,
        /// Polarity applied after the speed is set
        #[arg(long, value_enum)]
        polarity: Option<PolarityArg>,
        /// Encoder offset written before the motor starts
        #[arg(long, allow_hyphen_values = true)]
        tacho_offset: Option<i32>,
        /// Run the motor for this many milliseconds
        #[arg(long, default_value_t = 0u64)]
        run_ms: u64,
    },
    /// Decode a raw touch-sensor reading
    Touch {
        /// Sensor port (S1-S4)
        #[arg(long, default_value = "S1")]
        port: SensorPort,
        /// Raw register value
        #[arg(long)]
        raw: i32,
    },
    /// Build every configured device and print change events
    Watch {
        /// YAML file path
        #[arg(long)]
        file: String,
        /// Seconds to watch
        #[arg(long, default_value_t = 5u64)]
        duration_s: u64,
        /// Print events as JSON lines
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::ConfigValidate { file, json } => config_validate(&file, json),
        Commands::Motor {
            port,
            speed,
            polarity,
            tacho_offset,
            run_ms,
        } => motor_drive(port, speed, polarity, tacho_offset, run_ms),
        Commands::Touch { port, raw } => touch_decode(port, raw),
        Commands::Watch {
            file,
            duration_s,
            json,
        } => watch(&file, Duration::from_secs(duration_s), json),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn list_ports() -> Result<()> {
    for port in MotorPort::ALL {
        println!(
            "{port}\tmotor\t{}\t{}\t{}",
            Register::MotorSpeed(port),
            Register::Encoder(port),
            Register::EncoderOffset(port)
        );
    }
    for port in SensorPort::ALL {
        println!("{port}\tsensor\t{}", Register::SensorValue(port));
    }
    Ok(())
}

fn config_validate(file: &str, json: bool) -> Result<()> {
    let board = dev::load_board_file(file)?;
    println!("ok: {} devices", board.devices.len());
    for spec in &board.devices {
        println!(
            "{}\tkind={}\tport={}\tperiod_ms={}",
            spec.id, spec.kind, spec.port, spec.refresh_period_ms
        );
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&board)?);
    }
    Ok(())
}

fn print_event(event: &dev::ChangeEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("failed to encode event: {e}"),
        }
    } else {
        let old = event
            .old
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}\t{} -> {}", event.port, event.field, old, event.new);
    }
}

fn motor_drive(
    port: MotorPort,
    speed: Option<i32>,
    polarity: Option<PolarityArg>,
    tacho_offset: Option<i32>,
    run_ms: u64,
) -> Result<()> {
    let bus = Arc::new(MockBus::new());
    let tick = Duration::from_millis(50);
    let motor = dev::Motor::with_period(bus.clone(), port, tick)
        .with_context(|| format!("opening motor on port {port}"))?;
    let _events = motor.on_change(|e| print_event(e, false));

    if let Some(offset) = tacho_offset {
        motor.set_tacho_count(offset)?;
    }
    if let Some(speed) = speed {
        motor.set_speed(speed)?;
    }
    if let Some(polarity) = polarity {
        motor.set_polarity(polarity.into())?;
    }

    if run_ms > 0 {
        motor.start()?;
        info!(%port, run_ms, "running motor");
        let deadline = Instant::now() + Duration::from_millis(run_ms);
        while Instant::now() < deadline {
            bus.advance_motors();
            thread::sleep(tick);
        }
        motor.stop()?;
        motor.refresh()?;
    }

    println!(
        "motor {port}: speed={} tacho={} enabled={}",
        motor.speed()?,
        motor.tacho_count()?,
        motor.is_enabled()
    );
    motor.dispose();
    Ok(())
}

fn touch_decode(port: SensorPort, raw: i32) -> Result<()> {
    let bus = Arc::new(MockBus::new());
    let sensor = dev::TouchSensor::new(bus.clone(), port)
        .with_context(|| format!("opening touch sensor on port {port}"))?;
    bus.set_sensor_value(port, raw);
    println!(
        "{port}: raw={} pressed={} ({})",
        sensor.read_raw()?,
        sensor.is_pressed()?,
        sensor.read_as_string()?
    );
    sensor.dispose();
    Ok(())
}

fn watch(file: &str, duration: Duration, json: bool) -> Result<()> {
    let config = dev::load_board_file(file)?;
    let bus = Arc::new(MockBus::new());
    let shared: Arc<dyn RegisterBus> = bus.clone();
    let mut board = dev::Board::from_config(shared, &config).context("building board")?;

    let mut subscriptions = Vec::with_capacity(board.len());
    let mut touch_ports = Vec::new();
    for (id, device) in board.iter() {
        if let Some(motor) = device.as_motor() {
            motor.start_with_speed(dev::MAX_SPEED / 4)?;
        }
        if let Some(touch) = device.as_touch() {
            touch_ports.push(touch.sensor_port());
        }
        info!(id, kind = %device.kind(), port = %device.port(), "watching");
        subscriptions.push(device.on_change(move |e| print_event(e, json)));
    }

    // Motors advance every 100 ms, touch sensors toggle every second
    let started = Instant::now();
    let mut step = 0u64;
    while started.elapsed() < duration {
        bus.advance_motors();
        if step % 10 == 0 {
            let raw = if (step / 10) % 2 == 0 { 1023 } else { 0 };
            for port in &touch_ports {
                bus.set_sensor_value(*port, raw);
            }
        }
        step += 1;
        thread::sleep(Duration::from_millis(100));
    }

    for sub in subscriptions {
        sub.unsubscribe();
    }
    for (id, device) in board.iter() {
        let stats = device.stats();
        info!(id, ticks = stats.ticks, failures = stats.failures, "device stats");
    }
    board.dispose_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_motor_command() {
        let cli = Cli::try_parse_from([
            "brick",
            "motor",
            "--port",
            "c",
            "--speed",
            "-300",
            "--polarity",
            "opposite",
            "--run-ms",
            "100",
        ])
        .unwrap();
        match cli.command {
            Commands::Motor {
                port,
                speed,
                polarity,
                tacho_offset,
                run_ms,
            } => {
                assert_eq!(port, MotorPort::C);
                assert_eq!(speed, Some(-300));
                assert_eq!(polarity, Some(PolarityArg::Opposite));
                assert_eq!(tacho_offset, None);
                assert_eq!(run_ms, 100);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(Cli::try_parse_from(["brick", "touch", "--port", "S9", "--raw", "1"]).is_err());
        assert!(Cli::try_parse_from(["brick", "motor", "--port", "S1"]).is_err());
    }

    #[test]
    fn test_polarity_arg_mapping() {
        assert_eq!(
            dev::Polarity::from(PolarityArg::Opposite),
            dev::Polarity::OppositeDirection
        );
        assert_eq!(dev::Polarity::from(PolarityArg::Forward).code(), 1);
    }
}
