//! CRC-16/ANSI checksum used by Topfield packets.
//!
//! Polynomial 0x8005 (processed reflected as 0xA001), initial value 0, no
//! final XOR. This is the variant catalogued as CRC-16/ARC.

use crc::{CRC_16_ARC, Crc};

const CRC16_ANSI: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Calculate the CRC-16/ANSI checksum of `data`.
pub fn crc16_ansi(data: &[u8]) -> u16 {
    CRC16_ANSI.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16_ansi(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc16_ansi(&[]), 0x0000);
    }

    #[test]
    fn test_success_and_cancel_commands() {
        // CRCs carried by the fixed SUCCESS and CANCEL packets.
        assert_eq!(crc16_ansi(&[0x00, 0x00, 0x00, 0x02]), 0xC181);
        assert_eq!(crc16_ansi(&[0x00, 0x00, 0x00, 0x03]), 0x0140);
    }
}
