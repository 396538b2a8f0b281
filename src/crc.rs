//! CRC-8 and CRC-16 table-driven checksums (spec component C2).
//!
//! Mirrors `libflake/crc.c`: CRC-8 (poly 0x07) seals the frame header,
//! CRC-16 (poly 0x8005) seals the frame body. Both are initialized to 0,
//! unreflected, computed MSB-first. The tables are built once, lazily,
//! and are immutable for the life of the process — safe to share across
//! encoder contexts without synchronization.

use std::sync::OnceLock;

const CRC8_POLY: u32 = 0x07;
const CRC16_POLY: u32 = 0x8005;

fn build_table(bits: u32, poly: u32) -> Vec<u16> {
    let poly = poly + (1 << bits);
    let mut table = vec![0u16; 256];
    for i in 0..256u32 {
        let mut crc = i;
        for _ in 0..bits {
            if crc & (1 << (bits - 1)) != 0 {
                crc = (crc << 1) ^ poly;
            } else {
                crc <<= 1;
            }
        }
        table[i as usize] = (crc & ((1 << bits) - 1)) as u16;
    }
    table
}

fn crc8_table() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| build_table(8, CRC8_POLY).try_into().unwrap())
}

fn crc16_table() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| build_table(16, CRC16_POLY).try_into().unwrap())
}

fn calc_crc(table: &[u16; 256], bits: u32, data: &[u8]) -> u16 {
    let mut crc: u32 = 0;
    for &byte in data {
        let v1 = (crc << 8) & ((1 << bits) - 1);
        let v2 = (crc >> (bits - 8)) ^ byte as u32;
        crc = v1 ^ table[v2 as usize] as u32;
    }
    crc as u16
}

/// CRC-8 (poly 0x07) over `data`, as sealed at the end of every frame
/// header.
pub fn crc8(data: &[u8]) -> u8 {
    calc_crc(crc8_table(), 8, data) as u8
}

/// CRC-16 (poly 0x8005) over `data`, as sealed at the end of every frame
/// body (everything since the frame's sync code, excluding the CRC-16
/// itself).
pub fn crc16(data: &[u8]) -> u16 {
    calc_crc(crc16_table(), 16, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_of_empty_is_zero() {
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn crc16_of_empty_is_zero() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn crc8_is_deterministic_and_sensitive() {
        let a = crc8(b"fLaC-frame-header");
        let b = crc8(b"fLaC-frame-Header");
        assert_ne!(a, b);
        assert_eq!(a, crc8(b"fLaC-frame-header"));
    }

    #[test]
    fn crc16_is_deterministic_and_sensitive() {
        let a = crc16(b"some flac frame body bytes");
        let b = crc16(b"some flac frame body byteS");
        assert_ne!(a, b);
        assert_eq!(a, crc16(b"some flac frame body bytes"));
    }
}
