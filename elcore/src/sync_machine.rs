//! Reassembles SYNC + 6×UART packet runs into 40-bit synchronization IDs.
//!
//! A SYNC packet carries a coarse offset; the 6 UART packets that follow it
//! carry the synchronization ID one byte at a time, least-significant byte
//! first. The automaton below is a direct port of the push-based state
//! machine described for this format: idle until a SYNC arrives, then armed
//! for exactly 6 UART bytes. Anything that breaks that shape (a short UART
//! run interrupted by a new SYNC, a garbled header byte, a run that never
//! stops) is recorded as a [`Diagnostic`] rather than aborting the stream.

use crate::codec::PacketKind;
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::error::{ElError, Result};
use crate::reader::FileReader;

/// A completed synchronization point: the SYNC packet's own timestamp and
/// offset, paired with the 40-bit ID assembled from the 6 UART bytes that
/// followed it.
///
/// `sentinel()` represents "no synchronization known yet", used as the
/// initial annotation for samples read before the first SyncRecord
/// completes, or as the fallback when preinfo/postinfo derivation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRecord {
    pub sync_stamp: i64,
    pub sync_id: i64,
    pub sync_offset: i32,
}

impl SyncRecord {
    pub fn sentinel() -> Self {
        Self { sync_stamp: -1, sync_id: -1, sync_offset: 0 }
    }

    pub fn is_sentinel(&self) -> bool {
        self.sync_id < 0
    }
}

/// Push-based SYNC/UART reassembly automaton. Fed only [`PacketKind::Sync`]
/// and [`PacketKind::Uart`] packets; DATA packets never reach it (they carry
/// no synchronization information of their own and are annotated with
/// whatever the machine last published).
#[derive(Debug, Clone)]
pub struct SyncMachine {
    sync_stamp: i64,
    sync_id: i64,
    sync_offset: i32,
    /// 0..5 while assembling a run; 6 once flushed or idle; grows past 6
    /// when a run overruns without a new SYNC to reset it.
    sync_count: u32,
    /// Set once a run has been flushed (or abandoned), so a following SYNC
    /// can re-arm cleanly instead of trying to "recover" a run that already
    /// finished.
    skip: bool,
}

impl Default for SyncMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMachine {
    pub fn new() -> Self {
        Self { sync_stamp: -1, sync_id: -1, sync_offset: 0, sync_count: 6, skip: false }
    }

    /// Seed the machine's state directly, e.g. from a [`SyncRecord`] carried
    /// over from the previous file. `skip` always starts `false`: a seeded
    /// state is treated as "live" even if it was complete in the donor file.
    pub fn seeded(sync_stamp: i64, sync_id: i64, sync_offset: i32, sync_count: u32) -> Self {
        Self { sync_stamp, sync_id, sync_offset, sync_count, skip: false }
    }

    /// The machine's raw internal state: `(sync_stamp, sync_id, sync_offset,
    /// sync_count, skip)`. Used at end-of-file to carry an in-progress run
    /// into the next file's `defrag`, or to decide that no carry-in is
    /// needed because the last run already completed.
    pub fn pending(&self) -> (i64, i64, i32, u32, bool) {
        (self.sync_stamp, self.sync_id, self.sync_offset, self.sync_count, self.skip)
    }

    /// Feed one SYNC or UART packet. Returns `Some(record)` the moment a run
    /// of 6 UART bytes completes following a SYNC.
    ///
    /// # Panics
    /// Panics if fed a [`PacketKind::Data`] packet; callers route DATA
    /// packets around the sync machine entirely.
    pub fn push(
        &mut self,
        stamp: u32,
        payload: i32,
        kind: PacketKind,
        packet_index: u64,
        sink: &mut DiagnosticSink,
    ) -> Option<SyncRecord> {
        match kind {
            PacketKind::Data => {
                panic!("SyncMachine::push only accepts SYNC/UART packets")
            }
            PacketKind::Sync => {
                if self.sync_count != 6 {
                    sink.push(Diagnostic::UartFragmentation {
                        packet_index,
                        sync_stamp: if self.sync_stamp >= 0 { self.sync_stamp as u32 } else { 0 },
                        uart_count: self.sync_count.min(u8::MAX as u32) as u8,
                    });
                    if self.sync_count > 0 && !self.skip {
                        // Attempt recovery: ignore the new SYNC, keep waiting
                        // for the current run to complete.
                        return None;
                    }
                }
                self.sync_stamp = stamp as i64;
                self.sync_count = 0;
                self.sync_id = 0;
                self.sync_offset = payload;
                self.skip = false;
                None
            }
            PacketKind::Uart => {
                let byte = (payload & 0xFF) as u8;
                if self.sync_count == 0 {
                    if byte != 0x55 {
                        sink.push(Diagnostic::UartHeaderBroken { packet_index, got: byte });
                        self.skip = true;
                    }
                } else if self.sync_count < 6 {
                    self.sync_id += (byte as i64) << (8 * (self.sync_count - 1));
                } else {
                    sink.push(Diagnostic::UartTooLong { packet_index, sync_id_so_far: self.sync_id });
                }
                self.sync_count += 1;

                if self.sync_count == 6 && !self.skip {
                    self.skip = true;
                    return Some(SyncRecord {
                        sync_stamp: self.sync_stamp,
                        sync_id: self.sync_id,
                        sync_offset: self.sync_offset,
                    });
                }
                None
            }
        }
    }
}

/// Scan packets `[start, end)` for SYNC/UART runs without touching a
/// [`SyncMachine`], returning every completed-or-in-progress [`SyncRecord`]
/// observed plus the UART count of whatever run was still open when the
/// window ended. Used by [`first_sync`]/[`last_sync`]/`defrag` to recover a
/// synchronization point near a file boundary, where the live stream
/// automaton isn't available.
fn find_sync_window(
    reader: &mut FileReader,
    start: u64,
    end: u64,
) -> Result<(Vec<SyncRecord>, u32)> {
    // Presence check: a window whose start is already past EOF is itself a
    // failure, distinct from simply finding nothing inside an in-range window.
    reader.seek_to_packet(start)?;
    match reader.read_packet() {
        Ok(_) => {}
        Err(ElError::Eof) => return Err(ElError::Eof),
        Err(e) => return Err(e),
    }

    let mut records = Vec::new();
    let mut sync_in = false;
    let mut sync_stamp = -1i64;
    let mut sync_offset = 0i32;
    let mut sync_id = 0i64;
    let mut uart_count = 0u32;

    let mut i = start;
    while i < end {
        reader.seek_to_packet(i)?;
        let bytes = match reader.read_packet() {
            Ok(b) => b,
            Err(ElError::Eof) => break,
            Err(e) => return Err(e),
        };
        let (stamp, data, kind) = crate::codec::decode(&bytes, i)?;

        match kind {
            PacketKind::Sync => {
                // A SYNC arriving mid-run (uart_count != 6) silently discards
                // whatever that run had accumulated so far, matching the
                // plain scan this function performs (the live SyncMachine's
                // fragmentation recovery doesn't apply here).
                sync_in = true;
                sync_stamp = stamp as i64;
                sync_offset = data;
                sync_id = 0;
                uart_count = 0;
            }
            PacketKind::Uart => {
                if sync_in {
                    if uart_count == 6 {
                        return Err(ElError::UartScanTooLong { index: i });
                    }
                    if uart_count > 0 {
                        sync_id += ((data & 0xFF) as i64) << (8 * (uart_count - 1));
                    }
                    uart_count += 1;
                }
            }
            PacketKind::Data => {
                if sync_in && uart_count == 6 {
                    records.push(SyncRecord { sync_stamp, sync_id, sync_offset });
                    sync_in = false;
                    uart_count = 0;
                }
            }
        }

        i += 1;
    }

    if sync_in {
        records.push(SyncRecord { sync_stamp, sync_id, sync_offset });
    }

    Ok((records, uart_count))
}

/// Find the first synchronization point at or after `seek_from` packets into
/// the file, widening the search window geometrically if none is found.
/// Always returns a `0` residual UART count: by construction the first
/// SyncRecord found is either complete or immediately followed by enough of
/// the file to complete it.
pub fn first_sync(reader: &mut FileReader, seek_from: u64, seek_length: u64) -> Result<(SyncRecord, u32)> {
    let end = seek_from.saturating_add(seek_length);
    let (records, _uart_count) = find_sync_window(reader, seek_from, end)?;
    match records.first() {
        Some(record) => Ok((*record, 0)),
        None => first_sync(reader, end.saturating_sub(7), seek_length.saturating_mul(10)),
    }
}

/// Find the last synchronization point at or before `length - seek_from`
/// packets into the file. If the trailing run is incomplete (fewer than 6
/// UART bytes before EOF), `accept_residue` controls whether that partial
/// record is still returned (with its non-zero UART count, to be carried
/// into the next file's `defrag`), or the previous, complete record is used
/// instead.
pub fn last_sync(
    reader: &mut FileReader,
    seek_from: u64,
    seek_length: u64,
    accept_residue: bool,
) -> Result<(SyncRecord, u32)> {
    let length = reader.length_in_packets();
    if seek_from > length {
        return Err(ElError::Eof);
    }

    let start = length.saturating_sub(seek_length).saturating_sub(seek_from);
    let end = length - seek_from;
    let (records, uart_count) = find_sync_window(reader, start, end)?;

    if records.is_empty() {
        return last_sync(reader, seek_from + seek_length - 7, seek_length.saturating_mul(10), accept_residue);
    }

    if uart_count != 0 {
        if accept_residue {
            return Ok((*records.last().unwrap(), uart_count));
        }
        if records.len() > 1 {
            return Ok((records[records.len() - 2], uart_count));
        }
        return last_sync(reader, seek_from + seek_length - 7, seek_length.saturating_mul(10), accept_residue);
    }

    Ok((*records.last().unwrap(), uart_count))
}

/// Collect the UART payload bytes leading a file, up to (not including)
/// whichever comes first: the next SYNC packet or the next DATA packet.
/// Used to complete a synchronization run that was left incomplete at the
/// end of the previous file.
fn leading_uart_run(reader: &mut FileReader) -> Result<Vec<u8>> {
    let saved = reader.tell_packet().unwrap_or(0);
    let mut out = Vec::new();
    let mut i = 0u64;
    loop {
        reader.seek_to_packet(i)?;
        match reader.read_packet() {
            Ok(bytes) => {
                let (_stamp, data, kind) = crate::codec::decode(&bytes, i)?;
                match kind {
                    PacketKind::Sync | PacketKind::Data => break,
                    PacketKind::Uart => out.push((data & 0xFF) as u8),
                }
            }
            Err(ElError::Eof) => break,
            Err(e) => return Err(e),
        }
        i += 1;
    }
    reader.seek_to_packet(saved)?;
    Ok(out)
}

/// Complete a synchronization ID whose run was left unfinished at the end of
/// the previous file, by reading the UART bytes leading `reader`'s file.
///
/// `partial_sync_id` and `uart_count_carried_in` are the accumulated ID and
/// UART count observed by [`last_sync`] with `accept_residue = true`. Returns
/// `-1` (matching [`SyncRecord::sentinel`]'s `sync_id`) if the leading run
/// doesn't total exactly 6 bytes, or if its header byte isn't `0x55`: the
/// fragment is unrecoverable and the caller should fall back to a sentinel.
pub fn defrag(
    reader: &mut FileReader,
    partial_sync_id: i64,
    uart_count_carried_in: u32,
    sink: &mut DiagnosticSink,
) -> Result<i64> {
    let leading = leading_uart_run(reader)?;
    if uart_count_carried_in as usize + leading.len() != 6 {
        sink.push(Diagnostic::UartFragmentation {
            packet_index: 0,
            sync_stamp: 0,
            uart_count: (uart_count_carried_in as usize + leading.len()).min(u8::MAX as usize) as u8,
        });
        return Ok(-1);
    }

    let mut sync_id = partial_sync_id;
    for (offset, byte) in leading.iter().enumerate() {
        let count = uart_count_carried_in + offset as u32;
        if count == 0 {
            if *byte != 0x55 {
                sink.push(Diagnostic::UartHeaderBroken { packet_index: 0, got: *byte });
                return Ok(-1);
            }
        } else {
            sync_id += (*byte as i64) << (8 * (count - 1));
        }
    }

    Ok(sync_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, encode_header, PacketKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn open_with(packets: &[(u32, i32, PacketKind)]) -> (NamedTempFile, FileReader) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&encode_header(1, 1_700_000_000.0, "test")).unwrap();
        for (stamp, data, kind) in packets {
            file.write_all(&encode(*stamp, *data, *kind)).unwrap();
        }
        file.flush().unwrap();
        let reader = FileReader::open(file.path()).unwrap();
        (file, reader)
    }

    fn sync_run(sync_id: i64, stamp: u32, offset: i32) -> Vec<(u32, i32, PacketKind)> {
        let mut out = vec![(stamp, offset, PacketKind::Sync)];
        for i in 0..6u32 {
            let byte = if i == 0 { 0x55 } else { ((sync_id >> (8 * (i - 1))) & 0xFF) as i32 };
            out.push((stamp, byte, PacketKind::Uart));
        }
        out
    }

    #[test]
    fn clean_run_publishes_once() {
        let mut machine = SyncMachine::new();
        let mut sink = DiagnosticSink::new();
        let packets = sync_run(0xABCDEF, 100, 7);

        let mut published = None;
        for (i, (stamp, data, kind)) in packets.iter().enumerate() {
            published = machine.push(*stamp, *data, *kind, i as u64, &mut sink);
        }

        let record = published.unwrap();
        assert_eq!(record.sync_id, 0xABCDEF);
        assert_eq!(record.sync_stamp, 100);
        assert_eq!(record.sync_offset, 7);
        assert!(sink.as_slice().is_empty());
    }

    #[test]
    fn broken_header_byte_is_flagged_and_skipped() {
        let mut machine = SyncMachine::new();
        let mut sink = DiagnosticSink::new();
        machine.push(1, 0, PacketKind::Sync, 0, &mut sink);
        machine.push(1, 0xAA, PacketKind::Uart, 1, &mut sink);

        assert!(matches!(sink.as_slice()[0], Diagnostic::UartHeaderBroken { got: 0xAA, .. }));

        // The rest of the broken run completes without publishing anything.
        let mut published = None;
        for i in 2..7u64 {
            published = machine.push(1, 0, PacketKind::Uart, i, &mut sink);
        }
        assert!(published.is_none());
    }

    #[test]
    fn sync_mid_run_warns_fragmentation_and_recovers() {
        let mut machine = SyncMachine::new();
        let mut sink = DiagnosticSink::new();
        machine.push(1, 0, PacketKind::Sync, 0, &mut sink);
        machine.push(1, 0x55, PacketKind::Uart, 1, &mut sink);
        // A second SYNC arrives before the run of 6 completes.
        machine.push(2, 9, PacketKind::Sync, 2, &mut sink);

        assert!(matches!(sink.as_slice()[0], Diagnostic::UartFragmentation { uart_count: 1, .. }));
        // Recovery: the original run is kept, the new SYNC is ignored.
        machine.push(1, 0x01, PacketKind::Uart, 3, &mut sink);
        let mut published = None;
        for i in 4..7u64 {
            published = machine.push(1, 0, PacketKind::Uart, i, &mut sink);
        }
        assert_eq!(published.unwrap().sync_stamp, 1);
    }

    #[test]
    fn first_sync_finds_run_at_start_of_file() {
        let (_file, mut reader) = open_with(&sync_run(42, 5, 3));
        let (record, uart_count) = first_sync(&mut reader, 0, 10).unwrap();
        assert_eq!(record.sync_id, 42);
        assert_eq!(uart_count, 0);
    }

    #[test]
    fn last_sync_rejects_residue_when_not_accepted() {
        let mut packets = sync_run(1, 10, 0);
        // A trailing, incomplete second run.
        packets.push((20, 0, PacketKind::Sync));
        packets.push((20, 0x55, PacketKind::Uart));
        let (_file, mut reader) = open_with(&packets);

        let (record, uart_count) = last_sync(&mut reader, 0, 20, false).unwrap();
        assert_eq!(record.sync_id, 1);
        assert_eq!(uart_count, 1);
    }

    #[test]
    fn last_sync_accepts_residue_when_requested() {
        let mut packets = sync_run(1, 10, 0);
        packets.push((20, 0, PacketKind::Sync));
        packets.push((20, 0x55, PacketKind::Uart));
        let (_file, mut reader) = open_with(&packets);

        let (record, uart_count) = last_sync(&mut reader, 0, 20, true).unwrap();
        assert_eq!(record.sync_stamp, 20);
        assert_eq!(uart_count, 1);
    }

    #[test]
    fn defrag_completes_id_from_leading_uart_run() {
        // Next file begins with the remaining 5 UART bytes of a run whose
        // header byte (0x55) and first data byte landed in the previous file.
        let sync_id_so_far = 0x01i64; // byte 0 of the id, carried in
        let remaining: Vec<(u32, i32, PacketKind)> = (1..6)
            .map(|i| (20, ((0xABCDEFu64 >> (8 * i)) & 0xFF) as i32, PacketKind::Uart))
            .collect();
        let (_file, mut reader) = open_with(&remaining);
        let mut sink = DiagnosticSink::new();

        let sync_id = defrag(&mut reader, sync_id_so_far | 0x00, 1, &mut sink).unwrap();
        assert_eq!(sync_id, (0xABCDEFu64 & !0xFF) as i64 | sync_id_so_far);
        assert!(sink.as_slice().is_empty());
    }

    #[test]
    fn defrag_reports_sentinel_on_length_mismatch() {
        let (_file, mut reader) = open_with(&[(20, 0x55, PacketKind::Uart)]);
        let mut sink = DiagnosticSink::new();
        let sync_id = defrag(&mut reader, 0, 1, &mut sink).unwrap();
        assert_eq!(sync_id, -1);
        assert!(!sink.as_slice().is_empty());
    }
}
