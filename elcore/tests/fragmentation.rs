//! Cross-file scenarios that need two on-disk files and a [`PathCatalog`],
//! as opposed to the single-file unit tests colocated with each module.

use std::fs;
use std::io::Write;
use std::path::Path;

use elcore::codec::{encode, encode_header, PacketKind};
use elcore::el_stream::{ElStream, PostInfo, PreInfo};
use elcore::path_catalog::PathCatalog;
use elcore::span_assembler::assemble_span;

use chrono::{TimeZone, Utc};

fn write_file(dir: &Path, name: &str, creation_unix_time: f64, packets: &[(u32, i32, PacketKind)]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(&encode_header(1, creation_unix_time, "test")).unwrap();
    for (stamp, data, kind) in packets {
        file.write_all(&encode(*stamp, *data, *kind)).unwrap();
    }
    path
}

/// File A ends with SYNC + three UARTs `[0x55, 0x02, 0x00]`; file B begins
/// with three UARTs `[0x03, 0x00, 0x00]` then DATA. The DATA in B must be
/// annotated with `sync_id = 0x00_00_00_00_03_02 = 0x30002`.
#[test]
fn sync_fragment_spanning_two_files_completes_via_defrag() {
    let dir = tempfile::tempdir().unwrap();
    let day_dir = dir.path().join("2024/01/01");
    fs::create_dir_all(&day_dir).unwrap();

    let packets_a = vec![
        (0u32, 0i32, PacketKind::Data),
        (1, 9, PacketKind::Sync),
        (1, 0x55, PacketKind::Uart),
        (1, 0x02, PacketKind::Uart),
        (1, 0x00, PacketKind::Uart),
    ];
    write_file(&day_dir, "el_2024-0101-000000+0000.dat", 1_700_000_000.0, &packets_a);

    let packets_b = vec![
        (2u32, 0x03, PacketKind::Uart),
        (2, 0x00, PacketKind::Uart),
        (2, 0x00, PacketKind::Uart),
        (2, 42, PacketKind::Data),
    ];
    write_file(&day_dir, "el_2024-0101-000010+0000.dat", 1_700_000_010.0, &packets_b);

    let catalog = PathCatalog::new(dir.path());
    let path_a = day_dir.join("el_2024-0101-000000+0000.dat");
    let path_b = day_dir.join("el_2024-0101-000010+0000.dat");

    // File A, read standalone, leaves its lone DATA sample unannotated: the
    // sync it precedes is the one under reconstruction.
    let stream_a = ElStream::open(path_a, catalog.clone(), PreInfo::None, PostInfo::None).unwrap();
    let samples_a: Vec<_> = stream_a.collect::<elcore::Result<Vec<_>>>().unwrap();
    assert_eq!(samples_a.len(), 1);
    assert_eq!(samples_a[0].sync_id, -1);

    // File B, opened with postinfo auto-derived from A via defrag, tags its
    // DATA sample with the completed sync id.
    let stream_b = ElStream::open(path_b, catalog, PreInfo::Auto, PostInfo::None).unwrap();
    let samples_b: Vec<_> = stream_b.collect::<elcore::Result<Vec<_>>>().unwrap();
    assert_eq!(samples_b.len(), 1);
    assert_eq!(samples_b[0].sync_id, 0x30002);
    assert_eq!(samples_b[0].sync_offset, 9);
}

#[test]
fn assemble_span_carries_the_fragment_across_the_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let day_dir = dir.path().join("2024/01/01");
    fs::create_dir_all(&day_dir).unwrap();

    let packets_a = vec![
        (0u32, 0i32, PacketKind::Data),
        (1, 9, PacketKind::Sync),
        (1, 0x55, PacketKind::Uart),
        (1, 0x02, PacketKind::Uart),
        (1, 0x00, PacketKind::Uart),
    ];
    write_file(&day_dir, "el_2024-0101-000000+0000.dat", 1_700_000_000.0, &packets_a);

    let packets_b = vec![
        (2u32, 0x03, PacketKind::Uart),
        (2, 0x00, PacketKind::Uart),
        (2, 0x00, PacketKind::Uart),
        (2, 42, PacketKind::Data),
    ];
    write_file(&day_dir, "el_2024-0101-000010+0000.dat", 1_700_000_010.0, &packets_b);

    // A third, trailing file: `end` falls inside file B's window, so
    // `path_end = next(locate(end))` resolves to this one and it is included
    // in the assembled span too.
    let packets_c = vec![(3u32, 99i32, PacketKind::Data)];
    write_file(&day_dir, "el_2024-0101-000020+0000.dat", 1_700_000_020.0, &packets_c);

    let catalog = PathCatalog::new(dir.path());
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 15).unwrap();

    let rows = assemble_span(&catalog, start, end).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].sync_id, -1);
    assert_eq!(rows[1].data, 42);
    assert_eq!(rows[1].sync_id, 0x30002);
    assert_eq!(rows[2].data, 99);
}
