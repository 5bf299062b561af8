//! Conversion between human-entered hex text and frame bytes.
//!
//! Text is accepted in the loose form operators type into settings fields:
//! `"01 04 00 06"`, `"01-04-00-06"` and `"01040006"` all parse to the same
//! bytes. Anything that is not a hex digit is ignored.

use crate::{
    crc,
    error::{Error, Result},
    frame::Frame,
};

const MAX_DIGITS: usize = 2 * crate::frame::FRAME_CAPACITY;

/// Parse hex text into bytes.
///
/// Non-hex characters are dropped before pairing digits, so separators and
/// case do not matter. Fails if an odd number of digits remains.
pub fn parse(text: &str) -> Result<Frame> {
    let digits: heapless::Vec<u8, MAX_DIGITS> = {
        let mut digits = heapless::Vec::new();
        let mut count = 0usize;
        for nibble in text.chars().filter_map(|c| c.to_digit(16)) {
            count += 1;
            // Keep counting past capacity so the error reports the real size.
            let _ = digits.push(nibble as u8);
        }
        if count % 2 != 0 {
            return Err(Error::HexFormat { digits: count });
        }
        if count > digits.capacity() {
            return Err(Error::FrameTooLong { len: count / 2 });
        }
        digits
    };

    let mut frame = Frame::new();
    for pair in digits.chunks_exact(2) {
        frame.push((pair[0] << 4) | pair[1])?;
    }
    Ok(frame)
}

/// Render bytes as uppercase two-digit tokens separated by single spaces.
pub fn format(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&format!("{byte:02X}"));
    }
    text
}

/// Parse hex text and strip a trailing checksum if it matches the payload.
///
/// Returns the clean payload and whether a checksum was removed. Frames
/// shorter than four bytes are never stripped.
pub fn sanitize(text: &str) -> Result<(Frame, bool)> {
    let bytes = parse(text)?;
    let (payload, stripped) = crc::strip_checksum(&bytes);
    Ok((Frame::from_slice(payload)?, stripped))
}
