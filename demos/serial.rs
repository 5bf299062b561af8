use std::{env, sync::Arc, time::Duration};

use inquire::Select;
use scale_link::{
    config::{ByteOrder, ReadFunctionCode, ScaleConfig},
    diagnostics::ChannelValidation,
    engine::ScaleEngine,
    poll::{PollEvent, PollingScheduler},
    transport::SerialTransport,
};
use serialport::SerialPort;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// Scales answer quickly; the port timeout just has to beat the engine's.
const SERIAL_TIMEOUT_MS: u64 = 300;
const MODBUS_UNIT_ID: u8 = 0x01;
const WEIGHT_REGISTER: u16 = 0x0000;
const POLL_FOR: Duration = Duration::from_secs(5);

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    info!(port = %port_name, "Opening scale");

    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let engine = Arc::new(ScaleEngine::new(SerialTransport::new(PortWrapper(port))));

    let mut config = ScaleConfig {
        unit_address: MODBUS_UNIT_ID,
        read_function_code: ReadFunctionCode::Input,
        register_address: WEIGHT_REGISTER,
        byte_order: ByteOrder::ABCD,
        ..Default::default()
    };

    // Make sure the scale answers before we start polling
    let report = engine
        .validate_channel(&config)
        .await
        .expect("Link busy during validation");
    if report.state == ChannelValidation::Fail {
        warn!("Scale did not answer; polling anyway");
    }
    config = report.config;

    let (config_tx, config_rx) = watch::channel(config);
    let (events_tx, mut events) = mpsc::channel(16);
    let mut scheduler = PollingScheduler::new(engine.clone(), config_rx, events_tx);
    scheduler.start();

    let deadline = tokio::time::sleep(POLL_FOR);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Some(event) = events.recv() => match event {
                PollEvent::Reading(reading) => {
                    println!("Weight: {:.3} kg ({})", reading.weight_kg, reading.raw_response_frame);
                }
                PollEvent::Failed { error, diagnostics } => {
                    println!("Read failed: {error}");
                    let current = config_tx.borrow().clone();
                    match engine.fallback_config(&current) {
                        Ok(Some(fallback)) => {
                            warn!(
                                failures = diagnostics.consecutive_failures,
                                "Switching to function 0x03"
                            );
                            config_tx.send_replace(fallback);
                        }
                        Ok(None) => {}
                        Err(err) => warn!(%err, "Cannot apply function code fallback"),
                    }
                }
                PollEvent::Skipped => {}
            },
        }
    }

    scheduler.stop();
    println!("Diagnostics: {:#?}", engine.diagnostics());
}
