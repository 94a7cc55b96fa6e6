//! Decodes the 96-bit hardware FIFO record emitted by the `axi_fifo_mm_s`
//! TSU (timestamping unit) and converts its 94-bit raw time field to TAI/UTC.
//!
//! A hardware record is three little-endian 32-bit words read back-to-back
//! from the FIFO data port; together they form a 96-bit integer `v` with the
//! following bit layout (bit 0 = LSB of word 0):
//!
//! ```text
//! bits 94..95  state        (2 bits)
//! bits 46..93  sec          (48 bits)
//! bits 16..45  nsec         (30 bits)
//! bits 0..15   sub_nsec     (16 bits)
//! ```

use crate::error::{ElError, Result};

const MASK_SEC: u128 = (1u128 << 48) - 1;
const MASK_NSEC: u128 = (1u128 << 30) - 1;
const MASK_SUB_NSEC: u128 = (1u128 << 16) - 1;
const MASK_STATE: u128 = (1u128 << 2) - 1;

const SHIFT_SEC: u32 = 46;
const SHIFT_NSEC: u32 = 16;
const SHIFT_STATE: u32 = 94;

/// One decoded hardware FIFO record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareRecord {
    pub state: u8,
    pub sec: u64,
    pub nsec: u32,
    pub sub_nsec: u16,
}

impl HardwareRecord {
    /// Decode three 32-bit words (as read from the FIFO, word 0 first) into
    /// a [`HardwareRecord`].
    pub fn from_words(words: [u32; 3]) -> Self {
        let v = words[0] as u128 | (words[1] as u128) << 32 | (words[2] as u128) << 64;
        Self {
            state: ((v >> SHIFT_STATE) & MASK_STATE) as u8,
            sec: ((v >> SHIFT_SEC) & MASK_SEC) as u64,
            nsec: ((v >> SHIFT_NSEC) & MASK_NSEC) as u32,
            sub_nsec: (v & MASK_SUB_NSEC) as u16,
        }
    }

    /// Decode from the 12-byte data portion of a FIFO record (the 3 words
    /// read from the data port once `el-read-uio`'s polling loop has already
    /// consumed the separate `(r_len, w_len, residue)` status word).
    pub fn from_bytes(bytes: &[u8; 12]) -> Result<Self> {
        let words = [
            u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        ];
        Ok(Self::from_words(words))
    }

    /// Time since the TAI epoch, in fractional seconds.
    pub fn tai(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 * 1e-9
    }

    /// Time since the Unix (UTC) epoch, in fractional seconds, given the
    /// configured TAI-UTC leap offset.
    pub fn utc(&self, leap_offset: i64) -> f64 {
        self.tai() - leap_offset as f64
    }
}

/// Parse `0x43c10000`-style hex strings (with or without the `0x` prefix)
/// into the AXI base address used for [`crate::config::Config::device_addr`].
pub fn parse_device_addr(text: &str) -> Result<u64> {
    let trimmed = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| ElError::BadHeader(format!("bad device address {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_state_sec_nsec_sub_nsec() {
        let sec = 123_456_789_012u64 & MASK_SEC as u64;
        let nsec = 500_000_000u32 & MASK_NSEC as u32;
        let sub_nsec = 0x1234u16;
        let state = 0b10u8;

        let v: u128 = (state as u128) << SHIFT_STATE
            | (sec as u128) << SHIFT_SEC
            | (nsec as u128) << SHIFT_NSEC
            | sub_nsec as u128;
        let words = [
            (v & 0xFFFF_FFFF) as u32,
            ((v >> 32) & 0xFFFF_FFFF) as u32,
            ((v >> 64) & 0xFFFF_FFFF) as u32,
        ];

        let record = HardwareRecord::from_words(words);
        assert_eq!(record.state, state);
        assert_eq!(record.sec, sec);
        assert_eq!(record.nsec, nsec);
        assert_eq!(record.sub_nsec, sub_nsec);
    }

    #[test]
    fn utc_applies_leap_offset() {
        let record = HardwareRecord { state: 0, sec: 1_700_000_037, nsec: 0, sub_nsec: 0 };
        assert_eq!(record.tai(), 1_700_000_037.0);
        assert_eq!(record.utc(37), 1_700_000_000.0);
    }

    #[test]
    fn parses_hex_device_address_with_or_without_prefix() {
        assert_eq!(parse_device_addr("0x43c10000").unwrap(), 0x43c10000);
        assert_eq!(parse_device_addr("43c10000").unwrap(), 0x43c10000);
        assert!(parse_device_addr("zz").is_err());
    }
}
