//! Enumerates dated log files under a base directory and offers `latest`,
//! `previous`, `next` and `locate` navigation by filename ordering.
//!
//! Files are laid out as `<base>/YYYY/MM/DD/el_YYYY-MMDD-HHMMSS+0000.dat[.xz]`.
//! Within a day, and across days, the fixed-width zero-padded fields make
//! plain string ordering equivalent to chronological ordering, so the whole
//! catalog can be treated as one flat sorted list.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::{ElError, Result};

const FILENAME_PREFIX: &str = "el_";

/// Enumerates and navigates the dated log file tree rooted at `base`.
#[derive(Debug, Clone)]
pub struct PathCatalog {
    base: PathBuf,
}

impl PathCatalog {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Format the filename a file covering `dt` would have, were one to exist.
    pub fn filename_for(dt: DateTime<Utc>) -> String {
        format!(
            "{FILENAME_PREFIX}{:04}-{:02}{:02}-{:02}{:02}{:02}+0000.dat",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
        )
    }

    /// Directory `<base>/YYYY/MM/DD` that would hold a file for `dt`.
    pub fn day_dir_for(&self, dt: DateTime<Utc>) -> PathBuf {
        self.base
            .join(format!("{:04}", dt.year()))
            .join(format!("{:02}", dt.month()))
            .join(format!("{:02}", dt.day()))
    }

    /// All log files under `base`, sorted so that string order equals
    /// chronological order.
    fn all_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!("{}/*/*/*/{FILENAME_PREFIX}*.dat*", self.base.display());
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ElError::BadFileName(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Files within the single day directory containing `path`, sorted.
    fn siblings_of(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let dir = path
            .parent()
            .ok_or_else(|| ElError::BadFileName(format!("{} has no parent dir", path.display())))?;
        let pattern = format!("{}/{FILENAME_PREFIX}*.dat*", dir.display());
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ElError::BadFileName(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Lexicographically largest file in the most recent non-empty day directory.
    pub fn latest(&self) -> Result<PathBuf> {
        let files = self.all_files()?;
        files
            .last()
            .cloned()
            .ok_or_else(|| ElError::CatalogEmpty(self.base.display().to_string()))
    }

    /// File immediately preceding `path` in directory+name order.
    pub fn previous(&self, path: &Path) -> Result<PathBuf> {
        let siblings = self.siblings_of(path)?;
        if let Some(idx) = siblings.iter().position(|p| p == path) {
            if idx > 0 {
                return Ok(siblings[idx - 1].clone());
            }
        }

        // Fall back to the full catalog: find the entry immediately before
        // `path` in the global ordering (crosses day/month/year boundaries).
        let all = self.all_files()?;
        let idx = all.partition_point(|p| p.as_path() < path);
        if idx == 0 {
            return Err(ElError::NoPreviousFile(path.display().to_string()));
        }
        Ok(all[idx - 1].clone())
    }

    /// File immediately following `path` in directory+name order.
    pub fn next(&self, path: &Path) -> Result<PathBuf> {
        let siblings = self.siblings_of(path)?;
        if let Some(idx) = siblings.iter().position(|p| p == path) {
            if idx + 1 < siblings.len() {
                return Ok(siblings[idx + 1].clone());
            }
        }

        let all = self.all_files()?;
        let idx = all.partition_point(|p| p.as_path() <= path);
        all.get(idx)
            .cloned()
            .ok_or_else(|| ElError::NoNextFile(path.display().to_string()))
    }

    /// Create (and `mkdir -p` the day directory for) a brand new file path
    /// for `dt`, as `RawSampler` does when rotating to a new log file. Fails
    /// if a file of that exact name already exists: a rotation is expected
    /// to land on a fresh second, and a collision means the clock or the
    /// rotation cadence is misbehaving.
    pub fn create_path_for(&self, dt: DateTime<Utc>) -> Result<PathBuf> {
        let dir = self.day_dir_for(dt);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(Self::filename_for(dt));
        if path.exists() {
            return Err(ElError::BadFileName(format!("filename collision: {}", path.display())));
        }
        Ok(path)
    }

    /// Returns the file covering `dt`: the file `p` such that
    /// `p <= format(dt) < next(p)` under filename ordering.
    pub fn locate(&self, dt: DateTime<Utc>) -> Result<PathBuf> {
        let day_dir = self.day_dir_for(dt);
        let virtual_path = day_dir.join(Self::filename_for(dt));

        let all = self.all_files()?;
        if all.is_empty() {
            return Err(ElError::CatalogEmpty(self.base.display().to_string()));
        }

        let idx = all.partition_point(|p| p.as_path() < virtual_path.as_path());
        if idx == all.len() {
            // `dt` is after every file's start: the last (currently open, or
            // most recent rotated) file is the one covering it.
            return Ok(all[all.len() - 1].clone());
        }
        if idx == 0 {
            return Err(ElError::NoPreviousFile(virtual_path.display().to_string()));
        }
        Ok(all[idx - 1].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn touch(base: &Path, y: i32, m: u32, d: u32, name: &str) -> PathBuf {
        let dir = base
            .join(format!("{y:04}"))
            .join(format!("{m:02}"))
            .join(format!("{d:02}"));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn latest_picks_lexicographically_last() {
        let dir = tempdir().unwrap();
        touch(dir.path(), 2024, 1, 1, "el_2024-0101-000000+0000.dat");
        let last = touch(dir.path(), 2024, 1, 2, "el_2024-0102-120000+0000.dat");
        touch(dir.path(), 2024, 1, 2, "el_2024-0102-010000+0000.dat");

        let cat = PathCatalog::new(dir.path());
        assert_eq!(cat.latest().unwrap(), last);
    }

    #[test]
    fn previous_and_next_cross_day_boundary() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), 2024, 1, 1, "el_2024-0101-230000+0000.dat");
        let b = touch(dir.path(), 2024, 1, 2, "el_2024-0102-000000+0000.dat");

        let cat = PathCatalog::new(dir.path());
        assert_eq!(cat.next(&a).unwrap(), b);
        assert_eq!(cat.previous(&b).unwrap(), a);
    }

    #[test]
    fn previous_of_first_file_fails() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), 2024, 1, 1, "el_2024-0101-000000+0000.dat");
        let cat = PathCatalog::new(dir.path());
        assert!(cat.previous(&a).is_err());
    }

    #[test]
    fn locate_returns_covering_file() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), 2024, 1, 1, "el_2024-0101-000000+0000.dat");
        let b = touch(dir.path(), 2024, 1, 1, "el_2024-0101-120000+0000.dat");

        let cat = PathCatalog::new(dir.path());
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        assert_eq!(cat.locate(dt).unwrap(), a);

        let dt2 = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        assert_eq!(cat.locate(dt2).unwrap(), b);
    }

    #[test]
    fn locate_before_first_file_fails() {
        let dir = tempdir().unwrap();
        touch(dir.path(), 2024, 1, 2, "el_2024-0102-000000+0000.dat");
        let cat = PathCatalog::new(dir.path());
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(cat.locate(dt).is_err());
    }

    #[test]
    fn create_path_for_makes_day_dir_and_rejects_collision() {
        let dir = tempdir().unwrap();
        let cat = PathCatalog::new(dir.path());
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();

        let path = cat.create_path_for(dt).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());

        std::fs::write(&path, b"x").unwrap();
        assert!(cat.create_path_for(dt).is_err());
    }
}
