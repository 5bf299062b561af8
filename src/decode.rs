//! Weight replies from the scale.
//!
//! A read reply is laid out `[unit, function, byte_count, payload..., crc_lo, crc_hi]`.
//! The first four payload bytes hold an IEEE-754 single in the configured
//! [`ByteOrder`].

use crate::{
    config::ByteOrder,
    error::{CommError, Error, Result},
    frame::{Frame, FunctionCode},
};

const HEADER_LEN: usize = 3;
const CHECKSUM_LEN: usize = 2;
const FLOAT_LEN: usize = 4;

impl ByteOrder {
    /// Reorder `group` between wire order and big-endian.
    ///
    /// Every permutation is its own inverse, so the same call converts in
    /// either direction.
    pub fn permute(self, group: [u8; 4]) -> [u8; 4] {
        let [a, b, c, d] = group;
        match self {
            ByteOrder::ABCD => [a, b, c, d],
            ByteOrder::BADC => [b, a, d, c],
            ByteOrder::CDAB => [c, d, a, b],
            ByteOrder::DCBA => [d, c, b, a],
        }
    }
}

/// Result of one successful read cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub raw_response_frame: Frame,
    /// Always kilograms.
    pub weight_kg: f32,
}

/// Decode the weight from a read reply.
pub fn decode(frame: &[u8], byte_order: ByteOrder) -> Result<f32> {
    if frame.len() < HEADER_LEN {
        return Err(Error::FrameTooShort {
            expected: HEADER_LEN + FLOAT_LEN + CHECKSUM_LEN,
            actual: frame.len(),
        });
    }

    let byte_count = frame[2] as usize;
    let expected = HEADER_LEN + byte_count.max(FLOAT_LEN) + CHECKSUM_LEN;
    if byte_count < FLOAT_LEN || frame.len() < expected {
        return Err(Error::FrameTooShort {
            expected,
            actual: frame.len(),
        });
    }

    let mut group = [0u8; FLOAT_LEN];
    group.copy_from_slice(&frame[HEADER_LEN..HEADER_LEN + FLOAT_LEN]);
    Ok(f32::from_be_bytes(byte_order.permute(group)))
}

/// Check a reply against the request that produced it.
///
/// Catches exception replies, replies from another unit or for another
/// function, and (when `require_checksum`) corrupted frames.
pub fn verify_reply(request: &[u8], reply: &[u8], require_checksum: bool) -> Result<()> {
    if reply.len() < 2 || request.len() < 2 {
        return Err(Error::FrameTooShort {
            expected: HEADER_LEN,
            actual: reply.len(),
        });
    }
    let (unit, function) = (reply[0], reply[1]);

    if FunctionCode::is_exception(function) && function & 0x7F == request[1] {
        let code = reply.get(2).copied().unwrap_or_default();
        return Err(CommError::Exception {
            function: request[1],
            code,
        }
        .into());
    }
    if unit != request[0] || function != request[1] {
        return Err(CommError::UnexpectedResponse.into());
    }
    if require_checksum && !crate::crc::has_valid_checksum(reply) {
        return Err(CommError::ChecksumMismatch.into());
    }
    Ok(())
}

/// Build the reply a scale would send for `weight_kg`.
///
/// Used by simulators and tests; the checksum is always appended.
pub fn encode_reply(unit: u8, function: u8, weight_kg: f32, byte_order: ByteOrder) -> Result<Frame> {
    let mut frame = Frame::from_slice(&[unit, function, FLOAT_LEN as u8])?;
    frame.extend_from_slice(&byte_order.permute(weight_kg.to_be_bytes()))?;
    frame.append_checksum()?;
    Ok(frame)
}
