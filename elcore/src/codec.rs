//! Fixed 12-byte packet format and 256-byte file header, as emitted by
//! [`crate::raw_sampler`] and consumed by [`crate::reader::FileReader`].

use crate::error::{ElError, Result};

/// Length in bytes of a single on-disk packet.
pub const PACKET_LEN: usize = 12;

const HEADER_MAGIC: [u8; 2] = [0x07, 0x12];
const FOOTER_DATA: [u8; 2] = [0x7A, 0xDA];
const FOOTER_SYNC: [u8; 2] = [0x0C, 0x57];
const FOOTER_UART: [u8; 2] = [0x48, 0x20];

/// Classification of a decoded packet by its trailing footer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    Sync,
    Uart,
}

impl PacketKind {
    fn footer(self) -> [u8; 2] {
        match self {
            PacketKind::Data => FOOTER_DATA,
            PacketKind::Sync => FOOTER_SYNC,
            PacketKind::Uart => FOOTER_UART,
        }
    }
}

/// Decode a 12-byte packet into `(timestamp, payload, kind)`.
///
/// Layout: `[0x07, 0x12][timestamp: u32 LE][payload: i32 LE][footer: 2 bytes]`.
pub fn decode(bytes: &[u8; PACKET_LEN], index: u64) -> Result<(u32, i32, PacketKind)> {
    if bytes[0] != HEADER_MAGIC[0] || bytes[1] != HEADER_MAGIC[1] {
        return Err(ElError::HeaderError { index, got: [bytes[0], bytes[1]] });
    }

    let footer = [bytes[10], bytes[11]];
    let kind = if footer == FOOTER_DATA {
        PacketKind::Data
    } else if footer == FOOTER_SYNC {
        PacketKind::Sync
    } else if footer == FOOTER_UART {
        PacketKind::Uart
    } else {
        return Err(ElError::FooterError { index, got: footer });
    };

    let timestamp = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let payload = i32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

    Ok((timestamp, payload, kind))
}

/// Encode `(timestamp, payload, kind)` into the 12-byte wire format. Exact
/// inverse of [`decode`]; used by `RawSampler` test fixtures.
pub fn encode(timestamp: u32, payload: i32, kind: PacketKind) -> [u8; PACKET_LEN] {
    let mut out = [0u8; PACKET_LEN];
    out[0..2].copy_from_slice(&HEADER_MAGIC);
    out[2..6].copy_from_slice(&timestamp.to_le_bytes());
    out[6..10].copy_from_slice(&payload.to_le_bytes());
    out[10..12].copy_from_slice(&kind.footer());
    out
}

/// Parsed fields of a log file's 256-byte header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Declared header length in bytes (bytes 0..4, ASCII decimal + `\n`).
    pub hlen: usize,
    /// File format version (bytes 4..8, u32 LE).
    pub version: u32,
    /// Creation time as Unix seconds with microsecond precision.
    pub unix_time: f64,
    /// Free-form text from bytes `16..hlen`, right-padding trimmed.
    pub text: String,
}

/// Parse a file header. `bytes` must contain at least the declared header
/// length; bytes 0..4 are read first to discover it.
pub fn parse_header(bytes: &[u8]) -> Result<FileHeader> {
    if bytes.len() < 16 {
        return Err(ElError::BadHeader("header shorter than 16 bytes".into()));
    }

    let hlen_str = std::str::from_utf8(&bytes[0..4])
        .map_err(|e| ElError::BadHeader(format!("length field not UTF-8: {e}")))?;
    let hlen: usize = hlen_str
        .trim_end_matches('\n')
        .trim()
        .parse()
        .map_err(|e| ElError::BadHeader(format!("length field {hlen_str:?} not decimal: {e}")))?;

    if bytes.len() < hlen {
        return Err(ElError::BadHeader(format!(
            "declared header length {hlen} exceeds available {} bytes",
            bytes.len()
        )));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let seconds = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let micros = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    let unix_time = seconds as f64 + micros as f64 * 1e-6;

    let text = String::from_utf8_lossy(&bytes[16..hlen])
        .trim_end_matches(' ')
        .to_string();

    Ok(FileHeader { hlen, version, unix_time, text })
}

/// Encode a 256-byte header for a newly created log file, as written by
/// `RawSampler`.
pub fn encode_header(version: u32, unix_time: f64, text: &str) -> [u8; 256] {
    let mut out = [b' '; 256];
    out[0..4].copy_from_slice(b"256\n");
    out[4..8].copy_from_slice(&version.to_le_bytes());

    let seconds = unix_time.trunc() as u32;
    let micros = ((unix_time.fract()) * 1e6).round() as u32;
    out[8..12].copy_from_slice(&seconds.to_le_bytes());
    out[12..16].copy_from_slice(&micros.to_le_bytes());

    let text_bytes = text.as_bytes();
    let avail = 256 - 16;
    let n = text_bytes.len().min(avail);
    out[16..16 + n].copy_from_slice(&text_bytes[..n]);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_data() {
        let bytes = encode(1234, -99, PacketKind::Data);
        let (stamp, data, kind) = decode(&bytes, 0).unwrap();
        assert_eq!(stamp, 1234);
        assert_eq!(data, -99);
        assert_eq!(kind, PacketKind::Data);
        assert_eq!(encode(stamp, data, kind), bytes);
    }

    #[test]
    fn round_trip_sync_and_uart() {
        for (kind, payload) in [(PacketKind::Sync, 7), (PacketKind::Uart, 0x55)] {
            let bytes = encode(42, payload, kind);
            let (stamp, data, decoded_kind) = decode(&bytes, 0).unwrap();
            assert_eq!(stamp, 42);
            assert_eq!(data, payload);
            assert_eq!(decoded_kind, kind);
            assert_eq!(encode(stamp, data, decoded_kind), bytes);
        }
    }

    #[test]
    fn bad_header_byte() {
        let mut bytes = encode(1, 1, PacketKind::Data);
        bytes[0] = 0xFF;
        let err = decode(&bytes, 5).unwrap_err();
        assert!(matches!(err, ElError::HeaderError { index: 5, .. }));
    }

    #[test]
    fn bad_footer_bytes() {
        let mut bytes = encode(1, 1, PacketKind::Data);
        bytes[10] = 0x00;
        bytes[11] = 0x00;
        let err = decode(&bytes, 9).unwrap_err();
        assert!(matches!(err, ElError::FooterError { index: 9, .. }));
    }

    #[test]
    fn header_round_trip() {
        let raw = encode_header(2020011601, 1_700_000_000.5, "hello");
        let parsed = parse_header(&raw).unwrap();
        assert_eq!(parsed.hlen, 256);
        assert_eq!(parsed.version, 2020011601);
        assert!((parsed.unix_time - 1_700_000_000.5).abs() < 1e-3);
        assert_eq!(parsed.text, "hello");
    }

    #[test]
    fn header_tolerates_non_default_length() {
        let mut raw = vec![b' '; 64];
        raw[0..4].copy_from_slice(b" 64\n");
        raw[4..8].copy_from_slice(&1u32.to_le_bytes());
        raw[8..12].copy_from_slice(&0u32.to_le_bytes());
        raw[12..16].copy_from_slice(&0u32.to_le_bytes());
        let parsed = parse_header(&raw).unwrap();
        assert_eq!(parsed.hlen, 64);
    }
}
