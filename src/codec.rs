use embedded_can::{ExtendedId, StandardId};
use heapless::Vec;

use crate::MAX_ENCODED_DATA_LENGTH;

pub fn to_hex_digit(value: u32) -> u8 {
    const HEX_LUT: &[u8] = "0123456789ABCDEF".as_bytes();

    HEX_LUT[(value & 0xF) as usize]
}

pub fn standard_id_to_hex(id: StandardId) -> [u8; 3] {
    let raw = id.as_raw() as u32;

    [
        to_hex_digit(raw >> 8),
        to_hex_digit(raw >> 4),
        to_hex_digit(raw),
    ]
}

pub fn extended_id_to_hex(id: ExtendedId) -> [u8; 8] {
    let raw = id.as_raw();

    core::array::from_fn(|nibble| to_hex_digit(raw >> (28 - 4 * nibble)))
}

/// Writes two hex digits per byte, most significant nibble first. Returns
/// `None` if `data` would not fit in a classic CAN payload.
pub fn bytes_to_hex(data: &[u8]) -> Option<Vec<u8, MAX_ENCODED_DATA_LENGTH>> {
    let mut buf = Vec::new();

    for byte in data {
        buf.push(to_hex_digit((byte >> 4) as u32)).ok()?;
        buf.push(to_hex_digit(*byte as u32)).ok()?;
    }

    Some(buf)
}

#[cfg(test)]
mod tests {
    use embedded_can::{ExtendedId, StandardId};

    use super::*;

    #[test]
    fn hex_digits_are_uppercase() {
        let digits: Vec<u8, 16> = (0..16).map(to_hex_digit).collect();
        assert_eq!(&digits[..], b"0123456789ABCDEF");

        // Only the low nibble matters
        assert_eq!(to_hex_digit(0x1F), b'F');
    }

    #[test]
    fn ids_are_most_significant_nibble_first() {
        assert_eq!(standard_id_to_hex(StandardId::new(0x123).unwrap()), *b"123");
        assert_eq!(standard_id_to_hex(StandardId::MAX), *b"7FF");
        assert_eq!(
            extended_id_to_hex(ExtendedId::new(0x1ABCDEF0).unwrap()),
            *b"1ABCDEF0"
        );
        assert_eq!(extended_id_to_hex(ExtendedId::new(0x5).unwrap()), *b"00000005");
    }

    #[test]
    fn payload_hex() {
        assert_eq!(&bytes_to_hex(&[0xDE, 0xAD]).unwrap()[..], b"DEAD");
        assert_eq!(&bytes_to_hex(&[]).unwrap()[..], b"");
        assert_eq!(bytes_to_hex(&[0; 9]), None);
    }
}
