//! Structured diagnostics emitted by recovery paths in [`crate::sync_machine`] and
//! [`crate::el_stream`]. Replaces ad-hoc `eprintln!`/`warnings.warn` style output
//! (see design note "Warnings as data") with values tests can assert on, while
//! still being logged through the `log` facade for operators.

/// A non-fatal condition observed while reconstructing a stream. Each variant
/// carries the context needed to reconstruct the equivalent warning message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A UART byte arrived while the accumulated count already reached 6;
    /// the synchronization ID computed so far may be unreliable.
    UartTooLong { packet_index: u64, sync_id_so_far: i64 },

    /// The first UART byte after a SYNC was not `0x55`.
    UartHeaderBroken { packet_index: u64, got: u8 },

    /// A new SYNC arrived before the previous one finished its 6 UART bytes.
    UartFragmentation {
        packet_index: u64,
        sync_stamp: u32,
        uart_count: u8,
    },

    /// A SyncRecord's stamp did not fall cleanly within the buffer window,
    /// most likely due to the documented 32-bit timestamp wraparound. The
    /// affected sample is emitted with its previous annotation, unchanged.
    TimestampWraparound { buffer_index: usize, sample_stamp: u32, sync_stamp: u32 },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UartTooLong { packet_index, sync_id_so_far } => write!(
                f,
                "UART too long at packet {packet_index}: sync_id {sync_id_so_far} may be ill"
            ),
            Diagnostic::UartHeaderBroken { packet_index, got } => write!(
                f,
                "UART header broken at packet {packet_index}: expected 0x55, got 0x{got:02X}"
            ),
            Diagnostic::UartFragmentation { packet_index, sync_stamp, uart_count } => write!(
                f,
                "UART fragmentation at packet {packet_index}: sync_stamp={sync_stamp} uart_count={uart_count}"
            ),
            Diagnostic::TimestampWraparound { buffer_index, sample_stamp, sync_stamp } => write!(
                f,
                "mismatch: buffer index {buffer_index}, sample stamp {sample_stamp} vs sync stamp {sync_stamp}"
            ),
        }
    }
}

/// Accumulates diagnostics produced while iterating a stream, and logs each
/// one through the `log` facade at the moment it is recorded.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
