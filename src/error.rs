//! Our error types for scale communications.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Which kind of command a frame was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read-weight command (function 0x03 or 0x04).
    Read,
    /// Tare command (function 0x05 or 0x06).
    Tare,
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Tare => f.write_str("tare"),
        }
    }
}

/// Custom error type for the scale engine.
///
/// Parsing and validation errors are returned synchronously so a form can
/// show them inline. [`Error::Communication`] means a frame went out and no
/// usable reply came back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Hex text has an odd number of digits ({digits})")]
    HexFormat { digits: usize },
    #[error("Frame too short: need at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },
    #[error("Frame of {len} bytes exceeds the maximum frame size")]
    FrameTooLong { len: usize },
    #[error("Function code 0x{code:02X} is not allowed for a {operation} frame")]
    InvalidFunctionCode { code: u8, operation: Operation },
    #[error("Communication failure: {0}")]
    Communication(#[from] CommError),
    #[error("Another scale operation is already in flight")]
    Busy,
}

/// Reasons a transport exchange did not produce a usable reply.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommError {
    #[error("Communication timeout")]
    Timeout,
    #[error("Transport error: {0:?}")]
    Io(embedded_io::ErrorKind),
    #[error("Response checksum mismatch")]
    ChecksumMismatch,
    #[error("Device replied with exception 0x{code:02X} to function 0x{function:02X}")]
    Exception { function: u8, code: u8 },
    #[error("Unexpected response received")]
    UnexpectedResponse,
}

impl CommError {
    /// Map any `embedded_io` error onto its kind. Timeouts keep their own variant.
    pub fn from_io<E: embedded_io::Error>(err: E) -> Self {
        match err.kind() {
            embedded_io::ErrorKind::TimedOut => CommError::Timeout,
            kind => CommError::Io(kind),
        }
    }
}
