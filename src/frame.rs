//! Command frames sent to the scale.
//!
//! A frame is the raw byte sequence handed to the transport: Modbus RTU
//! style `[unit, function, data..., crc_lo, crc_hi]`, with the checksum only
//! present when the configuration asks for it.

use core::ops::Deref;

use strum_macros::EnumIter;

use crate::{
    config::ScaleConfig,
    crc,
    error::{Error, Result},
};

/// Largest frame we will build or accept. Matches the Modbus RTU ADU limit.
pub const FRAME_CAPACITY: usize = 256;

/// Function codes the scale engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
}

impl From<FunctionCode> for u8 {
    fn from(value: FunctionCode) -> Self {
        value as u8
    }
}

impl FunctionCode {
    /// True if the exception bit is set in a reply's function byte.
    pub const fn is_exception(value: u8) -> bool {
        (value & 0x80) != 0
    }
}

/// An immutable-once-built byte sequence bounded by [`FRAME_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame(heapless::Vec<u8, FRAME_CAPACITY>);

impl Frame {
    pub fn new() -> Self {
        Self(heapless::Vec::new())
    }

    /// Copy `bytes` into a new frame.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        heapless::Vec::from_slice(bytes)
            .map(Self)
            .map_err(|_| Error::FrameTooLong { len: bytes.len() })
    }

    pub fn push(&mut self, byte: u8) -> Result<()> {
        let len = self.0.len();
        self.0
            .push(byte)
            .map_err(|_| Error::FrameTooLong { len: len + 1 })
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let len = self.0.len();
        self.0.extend_from_slice(bytes).map_err(|_| Error::FrameTooLong {
            len: len + bytes.len(),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Append the Modbus CRC16 of the current contents.
    pub fn append_checksum(&mut self) -> Result<()> {
        let checksum = crc::checksum_bytes(&self.0);
        self.extend_from_slice(&checksum)
    }

    /// Return a copy with byte `index` replaced.
    pub fn with_byte(&self, index: usize, value: u8) -> Result<Self> {
        let mut out = self.clone();
        match out.0.get_mut(index) {
            Some(byte) => {
                *byte = value;
                Ok(out)
            }
            None => Err(Error::FrameTooShort {
                expected: index + 1,
                actual: self.len(),
            }),
        }
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Display for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&crate::hex::format(&self.0))
    }
}

/// Built-in tare commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum TarePreset {
    /// Write `0xFF00` (ON) to coil `0x0000`.
    WriteSingleCoil,
    /// Write `0x0001` to holding register `0x0000`.
    WriteSingleRegister,
}

impl TarePreset {
    pub const ADDRESS: u16 = 0x0000;

    /// Payload for this preset addressed to `unit`, without checksum.
    pub fn payload(self, unit: u8) -> [u8; 6] {
        let (function, value) = match self {
            TarePreset::WriteSingleCoil => (FunctionCode::WriteSingleCoil, 0xFF00_u16),
            TarePreset::WriteSingleRegister => (FunctionCode::WriteSingleRegister, 0x0001_u16),
        };
        let [addr_hi, addr_lo] = Self::ADDRESS.to_be_bytes();
        let [value_hi, value_lo] = value.to_be_bytes();
        [unit, function.into(), addr_hi, addr_lo, value_hi, value_lo]
    }
}

/// Assemble a payload plus, when `auto_checksum` is set, its CRC.
fn finish(payload: &[u8], auto_checksum: bool) -> Result<Frame> {
    let mut frame = Frame::from_slice(payload)?;
    if auto_checksum {
        frame.append_checksum()?;
    }
    Ok(frame)
}

/// Build the read-weight command for `config`.
///
/// Uses the raw read template when one is configured, otherwise lays out
/// `[unit, function, addr_hi, addr_lo, count_hi, count_lo]`.
pub fn build_read_frame(config: &ScaleConfig) -> Result<Frame> {
    if let Some(template) = config.raw_read_template.as_deref() {
        return finish(template, config.auto_checksum);
    }

    let [addr_hi, addr_lo] = config.register_address.to_be_bytes();
    let [count_hi, count_lo] = config.register_count.to_be_bytes();
    let payload = [
        config.unit_address,
        config.read_function_code.into(),
        addr_hi,
        addr_lo,
        count_hi,
        count_lo,
    ];
    finish(&payload, config.auto_checksum)
}

/// Build the tare command from `template`, a clean payload without checksum.
pub fn build_tare_frame(template: &[u8], config: &ScaleConfig) -> Result<Frame> {
    finish(template, config.auto_checksum)
}

/// The exact bytes that would be transmitted for `payload` under `config`.
pub fn preview(payload: &[u8], config: &ScaleConfig) -> Result<Frame> {
    finish(payload, config.auto_checksum)
}
