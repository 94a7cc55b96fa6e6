//! Converts the latest encoder reading into a zenith angle.

use crate::codec::PacketKind;
use crate::error::{ElError, Result};
use crate::path_catalog::PathCatalog;
use crate::reader::FileReader;

/// Calibration constants for the encoder-to-zenith conversion. Revised
/// periodically as the encoder is recalibrated; `DEFAULT` matches the most
/// recent calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZenithCalibration {
    pub offset: f64,
    pub scale: f64,
}

impl ZenithCalibration {
    pub const DEFAULT: ZenithCalibration = ZenithCalibration { offset: 7062.0, scale: 900.0 };

    pub fn convert(&self, encoder_value: i32) -> f64 {
        (encoder_value as f64 - self.offset) / self.scale
    }
}

/// Scan a file backward from its last packet for the most recent DATA
/// value, without going through [`crate::el_stream::ElStream`]: a raw
/// random-access reverse scan, since only the single latest sample matters.
fn last_data_value(reader: &mut FileReader) -> Result<i32> {
    let length = reader.length_in_packets();
    for i in (0..length).rev() {
        reader.seek_to_packet(i)?;
        let bytes = reader.read_packet()?;
        let (_stamp, data, kind) = crate::codec::decode(&bytes, i)?;
        if kind == PacketKind::Data {
            return Ok(data);
        }
    }
    Err(ElError::NoLatest)
}

/// Returns the latest known zenith angle, converted from the most recent
/// DATA packet in the catalog's latest file. If that file has no DATA
/// packet at all (e.g. it was only just rotated into existence), falls back
/// to the file immediately before it, once.
pub fn latest_zenith(catalog: &PathCatalog, calibration: ZenithCalibration) -> Result<f64> {
    let latest_path = catalog.latest()?;

    let mut reader = FileReader::open(&latest_path)?;
    if let Ok(data) = last_data_value(&mut reader) {
        return Ok(calibration.convert(data));
    }

    let previous_path = catalog.previous(&latest_path)?;
    let mut reader = FileReader::open(&previous_path)?;
    let data = last_data_value(&mut reader).map_err(|_| ElError::NoLatest)?;
    Ok(calibration.convert(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, encode_header};
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &std::path::Path, name: &str, packets: &[(u32, i32, PacketKind)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&encode_header(1, 1_700_000_000.0, "test")).unwrap();
        for (stamp, data, kind) in packets {
            file.write_all(&encode(*stamp, *data, *kind)).unwrap();
        }
        path
    }

    #[test]
    fn converts_latest_data_packet() {
        let dir = tempdir().unwrap();
        let day_dir = dir.path().join("2024/01/01");
        fs::create_dir_all(&day_dir).unwrap();
        write_file(
            &day_dir,
            "el_2024-0101-000000+0000.dat",
            &[(1, 10, PacketKind::Data), (2, 7962, PacketKind::Data)],
        );

        let catalog = PathCatalog::new(dir.path());
        let z = latest_zenith(&catalog, ZenithCalibration::DEFAULT).unwrap();
        assert!((z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_previous_file_when_latest_has_no_data() {
        let dir = tempdir().unwrap();
        let day_dir = dir.path().join("2024/01/01");
        fs::create_dir_all(&day_dir).unwrap();
        write_file(
            &day_dir,
            "el_2024-0101-000000+0000.dat",
            &[(1, 7062, PacketKind::Data)],
        );
        write_file(&day_dir, "el_2024-0101-010000+0000.dat", &[(1, 0, PacketKind::Sync)]);

        let catalog = PathCatalog::new(dir.path());
        let z = latest_zenith(&catalog, ZenithCalibration::DEFAULT).unwrap();
        assert!((z - 0.0).abs() < 1e-9);
    }
}
