use thiserror::Error;

/// Errors produced by the elevation encoder stream reconstruction engine.
#[derive(Error, Debug)]
pub enum ElError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad packet header at packet {index}: expected 0x07 0x12, got {got:02X?}")]
    HeaderError { index: u64, got: [u8; 2] },

    #[error("bad packet footer at packet {index}: {got:02X?} matches no known kind")]
    FooterError { index: u64, got: [u8; 2] },

    /// Internal control-flow signal: fewer than one full packet remains in the
    /// stream. Matched explicitly by [`crate::el_stream::ElStream`] and never
    /// surfaced to a CLI `main`.
    #[error("end of file")]
    Eof,

    #[error(
        "buffer too short: sync at stamp {sync_stamp} precedes the oldest buffered sample \
         in {path}, and the file's own first DATA stamp {first_stamp} is newer still"
    )]
    BufferTooShort {
        path: String,
        sync_stamp: u32,
        first_stamp: u32,
    },

    #[error("advisory lock held at {0}")]
    Locked(String),

    #[error("no DATA packet found in latest or previous file")]
    NoLatest,

    #[error("hardware device not found: {0}")]
    DeviceMissing(String),

    #[error("no log files found under {0}")]
    CatalogEmpty(String),

    #[error("no file precedes {0}")]
    NoPreviousFile(String),

    #[error("no file follows {0}")]
    NoNextFile(String),

    #[error("malformed log file name: {0}")]
    BadFileName(String),

    #[error("malformed file header: {0}")]
    BadHeader(String),

    #[error("network transport error: {0}")]
    TransportError(String),

    #[error("UART sequence too long during sync scan at packet {index}")]
    UartScanTooLong { index: u64 },
}

pub type Result<T> = std::result::Result<T, ElError>;
