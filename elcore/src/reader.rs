//! Random-access, byte-level reader over either a raw or a transparently
//! LZMA-decompressed log file.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use xz2::read::XzDecoder;

use crate::codec::{self, FileHeader, PACKET_LEN};
use crate::error::{ElError, Result};

/// A reader that transparently handles both plain `.dat` and `.dat.xz`
/// (LZMA-compressed) log files.
///
/// `.dat.xz` files are fully decompressed into memory on open: in this
/// system they are cold archival copies and test fixtures, never the hot
/// path `RawSampler` writes to, so the simplest fully-seekable approach is
/// preferred over a streaming-seekable LZMA implementation.
enum Backing {
    File(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Read for Backing {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Backing::File(r) => r.read(buf),
            Backing::Memory(r) => r.read(buf),
        }
    }
}

impl Seek for Backing {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            Backing::File(r) => r.seek(pos),
            Backing::Memory(r) => r.seek(pos),
        }
    }
}

/// Open either a `.dat` or `.dat.xz` file and return a seekable reader.
pub struct FileReader {
    backing: Backing,
    header: FileHeader,
    /// Total file size in bytes, excluding nothing: the raw size on disk for
    /// `.dat`, or the decompressed size for `.dat.xz`.
    total_len: u64,
}

impl FileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let is_xz = path
            .to_str()
            .map(|s| s.ends_with(".xz"))
            .unwrap_or(false);

        let (mut backing, total_len) = if is_xz {
            let file = File::open(path)?;
            let mut decoder = XzDecoder::new(file);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf)?;
            let len = buf.len() as u64;
            (Backing::Memory(Cursor::new(buf)), len)
        } else {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            (Backing::File(BufReader::new(file)), len)
        };

        // First 4 bytes declare the header length in ASCII decimal.
        let mut len_buf = [0u8; 4];
        backing.read_exact(&mut len_buf)?;
        let hlen_str = std::str::from_utf8(&len_buf)
            .map_err(|e| ElError::BadHeader(format!("length field not UTF-8: {e}")))?;
        let hlen: usize = hlen_str
            .trim_end_matches('\n')
            .trim()
            .parse()
            .map_err(|e| ElError::BadHeader(format!("length field {hlen_str:?} not decimal: {e}")))?;

        backing.seek(SeekFrom::Start(0))?;
        let mut header_buf = vec![0u8; hlen];
        backing.read_exact(&mut header_buf)?;
        let header = codec::parse_header(&header_buf)?;

        Ok(Self { backing, header, total_len })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Number of whole packets in the packet region, `(total_len - hlen) / PACKET_LEN`.
    pub fn length_in_packets(&self) -> u64 {
        (self.total_len.saturating_sub(self.header.hlen as u64)) / PACKET_LEN as u64
    }

    /// Seek to the start of packet `index` (0-based, relative to the packet region).
    pub fn seek_to_packet(&mut self, index: u64) -> Result<()> {
        let offset = self.header.hlen as u64 + index * PACKET_LEN as u64;
        self.backing.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Current position as a packet index.
    pub fn tell_packet(&mut self) -> Result<u64> {
        let pos = self.backing.seek(SeekFrom::Current(0))?;
        Ok((pos - self.header.hlen as u64) / PACKET_LEN as u64)
    }

    /// Read the next 12-byte packet. Fails with [`ElError::Eof`] when fewer
    /// than 12 bytes remain.
    pub fn read_packet(&mut self) -> Result<[u8; PACKET_LEN]> {
        let mut buf = [0u8; PACKET_LEN];
        match self.backing.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ElError::Eof),
            Err(e) => Err(ElError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, encode_header, PacketKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_sample_file(packets: &[(u32, i32, PacketKind)]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&encode_header(1, 1_700_000_000.0, "test")).unwrap();
        for (stamp, data, kind) in packets {
            file.write_all(&encode(*stamp, *data, *kind)).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_header_and_packets() {
        let file = write_sample_file(&[
            (1, 10, PacketKind::Data),
            (2, 20, PacketKind::Data),
        ]);
        let mut reader = FileReader::open(file.path()).unwrap();
        assert_eq!(reader.header().version, 1);
        assert_eq!(reader.length_in_packets(), 2);

        let p0 = reader.read_packet().unwrap();
        let (stamp, data, kind) = codec::decode(&p0, 0).unwrap();
        assert_eq!((stamp, data, kind), (1, 10, PacketKind::Data));

        reader.seek_to_packet(1).unwrap();
        assert_eq!(reader.tell_packet().unwrap(), 1);
        let p1 = reader.read_packet().unwrap();
        let (stamp, data, _) = codec::decode(&p1, 1).unwrap();
        assert_eq!((stamp, data), (2, 20));

        assert!(matches!(reader.read_packet(), Err(ElError::Eof)));
    }
}
