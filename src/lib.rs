//! This crate provides the communication engine for weighing scales that speak a Modbus RTU style protocol.
//!
//! It covers everything between a settings form and the wire:
//! * turning hex text typed by an operator into checked command frames ([hex], [validate])
//! * building read and tare commands with an optional CRC16 ([frame], [crc])
//! * decoding the IEEE-754 weight from a reply in any of four byte orders ([decode])
//! * serialising operations so only one exchange is ever outstanding ([engine])
//! * polling on a timer ([poll])
//! * spotting repeated failures and suggesting a fix ([diagnostics])
//!
//! The link itself is pluggable through [transport::Transport]. A
//! [transport::SerialTransport] is included for scales wired over serial/UART or
//! RS485, or reached through a BLE UART bridge that shows up as a serial port.
//!
//! Weights are always reported in kilograms.
//!
//! ```no_run
//! # async fn demo<T: scale_link::transport::Transport>(transport: T) -> scale_link::error::Result<()> {
//! use scale_link::{config::ScaleConfig, engine::ScaleEngine};
//!
//! let engine = ScaleEngine::new(transport);
//! let config = ScaleConfig::default();
//! let reading = engine.read_weight(&config).await?;
//! println!("{:.2} kg", reading.weight_kg);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crc;
pub mod decode;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod frame;
pub mod hex;
pub mod poll;
pub mod transport;
pub mod validate;

#[cfg(test)]
mod mock;

pub use config::ScaleConfig;
pub use engine::ScaleEngine;
pub use error::{CommError, Error, Result};
pub use frame::Frame;
