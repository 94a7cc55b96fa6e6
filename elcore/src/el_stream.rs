//! Combines [`FileReader`], [`PacketCodec`](crate::codec) and [`SyncMachine`]
//! into an iterator of [`AnnotatedSample`]s, retroactively tagging buffered
//! samples once their synchronization run completes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::codec::{self, FileHeader, PacketKind};
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::error::{ElError, Result};
use crate::path_catalog::PathCatalog;
use crate::reader::FileReader;
use crate::sync_machine::{self, SyncMachine, SyncRecord};

/// Samples are held this deep before being emitted, so a SyncRecord
/// completing up to `BUFFER_LENGTH - 1` packets after the DATA samples it
/// covers can still retroactively tag them.
pub const BUFFER_LENGTH: usize = 128;

/// Window size used when searching for a synchronization run near a file
/// boundary; widened geometrically if nothing turns up.
pub const SEEK_LENGTH: u64 = 1000;

/// One DATA packet, tagged with the synchronization ID/offset known to
/// apply to it (possibly retroactively, once the covering SyncRecord
/// completes later in the stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatedSample {
    pub stamp: u32,
    pub data: i32,
    pub sync_id: i64,
    pub sync_offset: i32,
}

/// How to seed synchronization state at the start of a stream.
#[derive(Debug, Clone)]
pub enum PreInfo {
    /// No synchronization known before this file's own first SyncRecord.
    None,
    /// Borrow the trailing (possibly incomplete) run from the previous file
    /// in the catalog. Falls back to `None`'s behavior if there is no
    /// previous file, or it carries no usable run.
    Auto,
    /// A record supplied by the caller, with the UART count it completed
    /// with (6 if the run was whole).
    Explicit(SyncRecord, u32),
}

/// How to resolve trailing buffered samples once the file itself is
/// exhausted.
#[derive(Debug, Clone)]
pub enum PostInfo {
    /// No further information: trailing samples are invalidated back to the
    /// sentinel record.
    None,
    /// Look at the next file in the catalog, either to complete an
    /// in-progress run via `defrag`, or to preview its first SyncRecord.
    /// Falls back to `None`'s behavior if there is no next file.
    Auto,
    /// A record supplied by the caller, in the same shape as [`PreInfo::Explicit`].
    Explicit(SyncRecord, u32),
}

/// Iterator over one log file's DATA packets, each annotated with the
/// synchronization ID/offset in force at the time it is emitted.
pub struct ElStream {
    path: PathBuf,
    catalog: PathCatalog,
    reader: FileReader,
    sync: SyncMachine,
    sink: DiagnosticSink,
    buffer: VecDeque<AnnotatedSample>,
    finished: bool,
    packet_index: u64,
    /// Synchronization record currently applied to freshly-read DATA
    /// packets; separate from `sync`'s own in-progress run.
    current: SyncRecord,
    postinfo: PostInfo,
    first_data_stamp: Option<u32>,
}

impl ElStream {
    pub fn open(path: impl Into<PathBuf>, catalog: PathCatalog, preinfo: PreInfo, postinfo: PostInfo) -> Result<Self> {
        let path = path.into();
        let reader = FileReader::open(&path)?;

        let (sync_stamp, sync_id, sync_offset, sync_count) = match &preinfo {
            PreInfo::None => (-1i64, -1i64, 0i32, 6u32),
            PreInfo::Auto => {
                let (record, uart_count) = Self::derive_preinfo_auto(&catalog, &path);
                (record.sync_stamp, record.sync_id, record.sync_offset, uart_count)
            }
            PreInfo::Explicit(record, uart_count) => {
                (record.sync_stamp, record.sync_id, record.sync_offset, *uart_count)
            }
        };

        let current = if sync_count != 6 {
            SyncRecord::sentinel()
        } else {
            SyncRecord { sync_stamp, sync_id, sync_offset }
        };

        Ok(Self {
            path,
            catalog,
            reader,
            sync: SyncMachine::seeded(sync_stamp, sync_id, sync_offset, sync_count),
            sink: DiagnosticSink::new(),
            buffer: VecDeque::new(),
            finished: false,
            packet_index: 0,
            current,
            postinfo,
            first_data_stamp: None,
        })
    }

    pub fn header(&self) -> &FileHeader {
        self.reader.header()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.sink.as_slice()
    }

    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.sink.drain()
    }

    /// Random access to a single packet's raw fields, bypassing the sync
    /// machine and the annotation buffer entirely.
    pub fn get_data(&mut self, index: u64) -> Result<(u32, i32, PacketKind)> {
        self.reader.seek_to_packet(index)?;
        let bytes = self.reader.read_packet()?;
        codec::decode(&bytes, index)
    }

    fn derive_preinfo_auto(catalog: &PathCatalog, path: &Path) -> (SyncRecord, u32) {
        let attempt = (|| -> Result<(SyncRecord, u32)> {
            let prev = catalog.previous(path)?;
            let mut reader = FileReader::open(&prev)?;
            sync_machine::last_sync(&mut reader, 0, SEEK_LENGTH, true)
        })();
        attempt.unwrap_or((SyncRecord::sentinel(), 0))
    }

    fn sync_replace(&mut self, record: SyncRecord) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let start = self.buffer[0].stamp as i64;
        let sync_stamp = record.sync_stamp;

        let index = if sync_stamp < start {
            let first = self.first_data_stamp.ok_or_else(|| {
                ElError::BadHeader("no DATA packet observed before buffer replace".into())
            })?;
            if first as i64 <= sync_stamp {
                return Err(ElError::BufferTooShort {
                    path: self.path.display().to_string(),
                    sync_stamp: sync_stamp.max(0) as u32,
                    first_stamp: first,
                });
            }
            0usize
        } else {
            (sync_stamp - start + 1) as usize
        };

        for i in index..self.buffer.len() {
            if self.buffer[i].stamp as i64 > sync_stamp {
                self.buffer[i].sync_id = record.sync_id;
                self.buffer[i].sync_offset = record.sync_offset;
            } else {
                self.sink.push(Diagnostic::TimestampWraparound {
                    buffer_index: i,
                    sample_stamp: self.buffer[i].stamp,
                    sync_stamp: sync_stamp.max(0) as u32,
                });
            }
        }
        Ok(())
    }

    fn derive_postinfo_auto(&mut self) -> SyncRecord {
        let (p_stamp, p_id, p_offset, p_count, p_skip) = self.sync.pending();

        let attempt = (|| -> Result<SyncRecord> {
            let next_path = self.catalog.next(&self.path)?;
            let mut next_reader = FileReader::open(&next_path)?;
            if !p_skip {
                let sync_id = sync_machine::defrag(&mut next_reader, p_id, p_count, &mut self.sink)?;
                Ok(SyncRecord { sync_stamp: p_stamp, sync_id, sync_offset: p_offset })
            } else {
                let (record, _uart_count) = sync_machine::first_sync(&mut next_reader, 0, SEEK_LENGTH)?;
                Ok(record)
            }
        })();

        attempt.unwrap_or_else(|_| SyncRecord::sentinel())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finished = true;

        let record = match &self.postinfo {
            PostInfo::None => {
                let stamp = self.buffer.front().map(|s| s.stamp as i64).unwrap_or(-1);
                SyncRecord { sync_stamp: stamp, sync_id: -1, sync_offset: 0 }
            }
            PostInfo::Auto => self.derive_postinfo_auto(),
            PostInfo::Explicit(record, _uart_count) => *record,
        };

        // A sentinel tail record carries no synchronization information:
        // running it through `sync_replace` would stomp every sample already
        // annotated earlier in the stream (by preinfo or a completed in-file
        // SYNC run) back down to "no sync known". Leave the buffer's existing
        // annotations exactly as they stand instead.
        if record.is_sentinel() {
            return Ok(());
        }

        self.sync_replace(record)
    }
}

impl Iterator for ElStream {
    type Item = Result<AnnotatedSample>;

    fn next(&mut self) -> Option<Result<AnnotatedSample>> {
        loop {
            if self.finished {
                return self.buffer.pop_front().map(Ok);
            }

            match self.reader.read_packet() {
                Ok(bytes) => {
                    let index = self.packet_index;
                    self.packet_index += 1;

                    let (stamp, data, kind) = match codec::decode(&bytes, index) {
                        Ok(v) => v,
                        Err(e) => return Some(Err(e)),
                    };

                    match kind {
                        PacketKind::Data => {
                            self.buffer.push_back(AnnotatedSample {
                                stamp,
                                data,
                                sync_id: self.current.sync_id,
                                sync_offset: self.current.sync_offset,
                            });
                            if self.first_data_stamp.is_none() {
                                self.first_data_stamp = Some(stamp);
                            }
                        }
                        PacketKind::Sync | PacketKind::Uart => {
                            if let Some(record) = self.sync.push(stamp, data, kind, index, &mut self.sink) {
                                if let Err(e) = self.sync_replace(record) {
                                    return Some(Err(e));
                                }
                                self.current = record;
                            }
                        }
                    }

                    if self.buffer.len() < BUFFER_LENGTH {
                        continue;
                    }
                    return self.buffer.pop_front().map(Ok);
                }
                Err(ElError::Eof) => {
                    if let Err(e) = self.finalize() {
                        return Some(Err(e));
                    }
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
