//! Concatenates consecutive log files into one annotated, time-axed table
//! spanning an arbitrary date range.

use chrono::{DateTime, Utc};

use crate::el_stream::{ElStream, PostInfo, PreInfo};
use crate::error::{ElError, Result};
use crate::path_catalog::PathCatalog;

/// One row of an assembled span: the raw encoder sample plus the
/// synchronization annotation in force at the time, and a wall-clock
/// `unix_time` derived from the covering file's own creation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssembledRow {
    pub stamp: u32,
    pub unix_time: f64,
    pub data: i32,
    pub sync_id: i64,
    pub sync_offset: i32,
}

/// List every file's path needed to cover `[dt_start, dt_end)`, in order.
///
/// The end of the range is the file *following* the one that covers
/// `dt_end`, not that file itself: `locate(dt_end)`'s file may still have a
/// pending synchronization run whose completion lives in the next file, so
/// one extra file past the nominal end is always included.
pub fn paths_for_span(
    catalog: &PathCatalog,
    dt_start: DateTime<Utc>,
    dt_end: DateTime<Utc>,
) -> Result<Vec<std::path::PathBuf>> {
    if dt_start >= dt_end {
        return Err(ElError::BadFileName(format!(
            "span start {dt_start} must precede its end {dt_end}"
        )));
    }

    let first = catalog.locate(dt_start)?;
    let last = catalog.next(&catalog.locate(dt_end)?)?;

    let mut paths = vec![first.clone()];
    let mut cur = first;
    while cur != last {
        cur = catalog.next(&cur)?;
        paths.push(cur.clone());
    }
    Ok(paths)
}

/// Read every file covering `[dt_start, dt_end)` and concatenate their
/// annotated samples into one table, with `unix_time` established from the
/// first file's creation time and its first DATA stamp.
///
/// Every file in the span is opened with `PreInfo::Auto`/`PostInfo::Auto`,
/// so synchronization runs that straddle a file boundary are completed via
/// the neighboring file rather than left at the sentinel.
pub fn assemble_span(
    catalog: &PathCatalog,
    dt_start: DateTime<Utc>,
    dt_end: DateTime<Utc>,
) -> Result<Vec<AssembledRow>> {
    let paths = paths_for_span(catalog, dt_start, dt_end)?;

    let mut rows = Vec::new();
    let mut origin_unix_time: Option<f64> = None;
    let mut origin_stamp: Option<u32> = None;

    for path in paths {
        let stream = ElStream::open(path, catalog.clone(), PreInfo::Auto, PostInfo::Auto)?;
        if origin_unix_time.is_none() {
            origin_unix_time = Some(stream.header().unix_time);
        }

        for sample in stream {
            let sample = sample?;
            let stamp_origin = *origin_stamp.get_or_insert(sample.stamp);
            let unix_time = origin_unix_time.unwrap()
                + (sample.stamp as f64 - stamp_origin as f64) / 1000.0;

            rows.push(AssembledRow {
                stamp: sample.stamp,
                unix_time,
                data: sample.data,
                sync_id: sample.sync_id,
                sync_offset: sample.sync_offset,
            });
        }
    }

    Ok(rows)
}
