//! Modbus CRC16 (reflected polynomial 0xA001, seed 0xFFFF).

const CRC16_SEED: u16 = 0xFFFF;
const CRC16_POLY: u16 = 0xA001;

/// Calculate the Modbus CRC16 of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_SEED;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Return the checksum of `data` in wire order: `[low, high]`.
pub fn checksum_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}

/// True if the last two bytes of `frame` are the checksum of everything before them.
pub fn has_valid_checksum(frame: &[u8]) -> bool {
    match frame.len().checked_sub(2) {
        Some(split) => checksum_bytes(&frame[..split]) == frame[split..],
        None => false,
    }
}

/// Split a valid trailing checksum off `frame`.
///
/// Returns the payload and whether a checksum was removed. Frames shorter
/// than four bytes are returned whole.
pub fn strip_checksum(frame: &[u8]) -> (&[u8], bool) {
    if frame.len() >= 4 && has_valid_checksum(frame) {
        (&frame[..frame.len() - 2], true)
    } else {
        (frame, false)
    }
}
