//! Checks applied to user-entered command frames.
//!
//! The settings form calls the `commit_*` functions whenever a hex field
//! changes and again when the field is committed. They sanitize first, so a
//! pasted frame that already carries its checksum is validated on its
//! payload and never gets a second checksum appended.

use crate::{
    error::{Error, Operation, Result},
    frame::{Frame, FunctionCode},
    hex,
};

/// Shortest command we accept: unit, function and four data bytes.
pub const MIN_COMMAND_LEN: usize = 6;

const READ_CODES: [FunctionCode; 2] = [
    FunctionCode::ReadHoldingRegisters,
    FunctionCode::ReadInputRegisters,
];
const TARE_CODES: [FunctionCode; 2] = [
    FunctionCode::WriteSingleCoil,
    FunctionCode::WriteSingleRegister,
];

fn validate(bytes: &[u8], allowed: &[FunctionCode], operation: Operation) -> Result<()> {
    if bytes.len() < MIN_COMMAND_LEN {
        return Err(Error::FrameTooShort {
            expected: MIN_COMMAND_LEN,
            actual: bytes.len(),
        });
    }
    let code = bytes[1];
    if allowed.iter().any(|&allowed| u8::from(allowed) == code) {
        Ok(())
    } else {
        Err(Error::InvalidFunctionCode { code, operation })
    }
}

/// Validate a checksum-free read command.
pub fn validate_read_frame(bytes: &[u8]) -> Result<()> {
    validate(bytes, &READ_CODES, Operation::Read)
}

/// Validate a checksum-free tare command.
pub fn validate_tare_frame(bytes: &[u8]) -> Result<()> {
    validate(bytes, &TARE_CODES, Operation::Tare)
}

/// A sanitized and validated payload ready to store in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFrame {
    pub payload: Frame,
    /// True if the entered text carried a checksum that was removed.
    pub checksum_stripped: bool,
}

fn commit(text: &str, validator: fn(&[u8]) -> Result<()>) -> Result<CommittedFrame> {
    let (payload, checksum_stripped) = hex::sanitize(text)?;
    validator(&payload)?;
    Ok(CommittedFrame {
        payload,
        checksum_stripped,
    })
}

/// Sanitize then validate a read template entered as hex text.
pub fn commit_read_template(text: &str) -> Result<CommittedFrame> {
    commit(text, validate_read_frame)
}

/// Sanitize then validate a tare template entered as hex text.
pub fn commit_tare_template(text: &str) -> Result<CommittedFrame> {
    commit(text, validate_tare_frame)
}
