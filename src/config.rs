//! Scale communication settings.
//!
//! The settings screen owns and persists a [`ScaleConfig`]; the engine only
//! ever sees an immutable snapshot of it. Anything the engine wants changed
//! (fallback function code, channel swap) comes back as a new value from one
//! of the `with_*` methods, which also bumps [`ScaleConfig::revision`].

use core::time::Duration;

use fugit::MillisDurationU32;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Shortest allowed gap between polled reads.
pub const MIN_POLL_INTERVAL_MS: u32 = 300;
/// Longest allowed gap between polled reads.
pub const MAX_POLL_INTERVAL_MS: u32 = 5000;

const DEFAULT_TIMEOUT_SECS: f32 = 3.0;

/// Function codes allowed for reading the weight registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ReadFunctionCode {
    /// 0x03 - Read holding registers.
    #[default]
    Holding = 0x03,
    /// 0x04 - Read input registers.
    Input = 0x04,
}

impl From<ReadFunctionCode> for u8 {
    fn from(value: ReadFunctionCode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for ReadFunctionCode {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(ReadFunctionCode::Holding),
            0x04 => Ok(ReadFunctionCode::Input),
            code => Err(crate::error::Error::InvalidFunctionCode {
                code,
                operation: crate::error::Operation::Read,
            }),
        }
    }
}

/// Order in which the four bytes of an IEEE-754 float arrive on the wire.
///
/// `A` is the most significant byte of the big-endian value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[allow(clippy::upper_case_acronyms)]
pub enum ByteOrder {
    /// Big-endian, as sent.
    #[default]
    ABCD,
    /// Bytes swapped within each 16-bit word.
    BADC,
    /// 16-bit words swapped.
    CDAB,
    /// Little-endian.
    DCBA,
}

/// How the BLE characteristics were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelMode {
    #[default]
    Auto,
    Manual,
}

/// BLE service and characteristic identifiers for the scale link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub service_id: String,
    pub write_id: String,
    pub notify_id: String,
    /// Some modules label their characteristics the wrong way round.
    pub swap_channels: bool,
    pub mode: ChannelMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            service_id: "0000ffe0-0000-1000-8000-00805f9b34fb".into(),
            write_id: "0000ffe1-0000-1000-8000-00805f9b34fb".into(),
            notify_id: "0000ffe2-0000-1000-8000-00805f9b34fb".into(),
            swap_channels: false,
            mode: ChannelMode::Auto,
        }
    }
}

/// Where a transport should write requests and listen for replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoute {
    pub service_id: String,
    pub write_id: String,
    pub notify_id: String,
}

impl ChannelConfig {
    /// Effective route with `swap_channels` applied.
    pub fn route(&self) -> ChannelRoute {
        let (write_id, notify_id) = if self.swap_channels {
            (self.notify_id.clone(), self.write_id.clone())
        } else {
            (self.write_id.clone(), self.notify_id.clone())
        };
        ChannelRoute {
            service_id: self.service_id.clone(),
            write_id,
            notify_id,
        }
    }
}

/// Complete scale communication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScaleConfig {
    /// Incremented every time the engine derives a modified copy.
    pub revision: u32,
    /// Modbus unit (slave) address. Default `0x01`.
    pub unit_address: u8,
    pub read_function_code: ReadFunctionCode,
    pub register_address: u16,
    /// Number of 16-bit registers to read. A float weight needs 2.
    pub register_count: u16,
    /// Clean read payload that replaces the structured fields above when set.
    pub raw_read_template: Option<Vec<u8>>,
    /// Clean tare payload, without checksum.
    pub tare_frame_template: Vec<u8>,
    /// Append a CRC16 to outgoing frames and require one on replies.
    pub auto_checksum: bool,
    pub byte_order: ByteOrder,
    /// Raw value as entered. Use [`ScaleConfig::poll_interval`] to read it.
    pub poll_interval_ms: u32,
    pub timeout_seconds: f32,
    /// Extra exchanges allowed within one read after a timeout.
    pub max_retries: u32,
    pub channel: ChannelConfig,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            revision: 0,
            unit_address: 0x01,
            read_function_code: ReadFunctionCode::Holding,
            register_address: 0x0000,
            register_count: 2,
            raw_read_template: None,
            tare_frame_template: crate::frame::TarePreset::WriteSingleCoil
                .payload(0x01)
                .to_vec(),
            auto_checksum: true,
            byte_order: ByteOrder::ABCD,
            poll_interval_ms: 500,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
            channel: ChannelConfig::default(),
        }
    }
}

impl ScaleConfig {
    /// Poll interval clamped into the supported range.
    pub fn poll_interval(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }

    /// Reply timeout for a single exchange.
    ///
    /// Values that are not a positive, representable number of seconds fall
    /// back to the default of 3 s.
    pub fn timeout(&self) -> Duration {
        let default = Duration::from_secs_f32(DEFAULT_TIMEOUT_SECS);
        if self.timeout_seconds > 0.0 {
            Duration::try_from_secs_f32(self.timeout_seconds).unwrap_or(default)
        } else {
            default
        }
    }

    pub fn route(&self) -> ChannelRoute {
        self.channel.route()
    }

    fn next(&self) -> Self {
        let mut next = self.clone();
        next.revision = self.revision.wrapping_add(1);
        next
    }

    pub fn with_read_function_code(&self, code: ReadFunctionCode) -> Self {
        let mut next = self.next();
        next.read_function_code = code;
        next
    }

    pub fn with_swap_channels(&self, swap: bool) -> Self {
        let mut next = self.next();
        next.channel.swap_channels = swap;
        next
    }

    pub fn with_auto_checksum(&self, auto_checksum: bool) -> Self {
        let mut next = self.next();
        next.auto_checksum = auto_checksum;
        next
    }

    pub fn with_raw_read_template(&self, template: Option<Vec<u8>>) -> Self {
        let mut next = self.next();
        next.raw_read_template = template;
        next
    }

    pub fn with_tare_frame_template(&self, template: Vec<u8>) -> Self {
        let mut next = self.next();
        next.tare_frame_template = template;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;
    use test_case::test_case;

    #[test_case(0, 300; "below_minimum")]
    #[test_case(300, 300; "minimum")]
    #[test_case(1000, 1000; "inside")]
    #[test_case(5000, 5000; "maximum")]
    #[test_case(60_000, 5000; "above_maximum")]
    fn poll_interval_is_clamped(raw: u32, expected_ms: u32) {
        let config = ScaleConfig {
            poll_interval_ms: raw,
            ..Default::default()
        };
        assert_eq!(config.poll_interval().to_millis(), expected_ms);
    }

    #[test]
    fn bad_timeouts_fall_back_to_default() {
        for secs in [0.0, -1.0, f32::NAN, f32::INFINITY, 1e20, f32::MAX] {
            let config = ScaleConfig {
                timeout_seconds: secs,
                ..Default::default()
            };
            assert_eq!(config.timeout(), Duration::from_secs(3));
        }
        let config = ScaleConfig {
            timeout_seconds: 0.5,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn mutators_produce_new_revisions() {
        let original = ScaleConfig::default();
        let fallback = original.with_read_function_code(ReadFunctionCode::Holding);
        let swapped = fallback.with_swap_channels(true);

        assert_eq!(original.revision, 0);
        assert_eq!(fallback.revision, 1);
        assert_eq!(swapped.revision, 2);
        assert!(!original.channel.swap_channels);
        assert!(swapped.channel.swap_channels);
    }

    #[test]
    fn swap_exchanges_write_and_notify() {
        let config = ScaleConfig::default();
        let straight = config.route();
        let swapped = config.with_swap_channels(true).route();

        assert_eq!(straight.write_id, swapped.notify_id);
        assert_eq!(straight.notify_id, swapped.write_id);
        assert_eq!(straight.service_id, swapped.service_id);
    }

    #[test]
    fn byte_order_names_round_trip() {
        assert_eq!(ByteOrder::from_str("DCBA").unwrap(), ByteOrder::DCBA);
        assert_eq!(ByteOrder::CDAB.to_string(), "CDAB");
        assert!(ByteOrder::from_str("ACBD").is_err());
    }

    #[test]
    fn persisted_shape() {
        let config = ScaleConfig::default();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["readFunctionCode"], 3);
        assert_eq!(json["byteOrder"], "ABCD");
        assert_eq!(json["pollIntervalMs"], 500);
        assert_eq!(json["channel"]["swapChannels"], false);
        assert_eq!(json["tareFrameTemplate"], serde_json::json!([1, 5, 0, 0, 255, 0]));
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let config: ScaleConfig =
            serde_json::from_str(r#"{"readFunctionCode": 4, "byteOrder": "DCBA"}"#).unwrap();
        assert_eq!(config.read_function_code, ReadFunctionCode::Input);
        assert_eq!(config.byte_order, ByteOrder::DCBA);
        assert_eq!(config.unit_address, 0x01);
    }

    #[test]
    fn unknown_read_function_code_is_rejected() {
        let result: Result<ScaleConfig, _> = serde_json::from_str(r#"{"readFunctionCode": 6}"#);
        assert!(result.is_err());
    }
}
