//! `el-read-uio` — the UIO/FPGA `RawSampler`: memory-maps the
//! `axi_fifo_mm_s` hardware FIFO register window, polls its status words,
//! drains hardware records over a bounded producer/consumer queue, and
//! writes them into the same 12-byte-packet log file format `el-read`
//! produces, so both sampler variants satisfy the same on-disk contract.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use memmap2::{Mmap, MmapOptions};

use elcore::codec::{encode, encode_header, PacketKind};
use elcore::config::Config;
use elcore::lock::LockGuard;
use elcore::path_catalog::PathCatalog;
use elcore::tsu_time::{parse_device_addr, HardwareRecord};
use elcore::version::print_cli_version_banner;
use elcore::{ElError, Result};

const VERSION: u32 = 2020011601;
const HEADER_TEXT: &str = "Elevation logger data (UIO sampler)\n\
Packet format: [HEADER 2 bytes][BODY 4+4 bytes][FOOTER 2 bytes]\n\
HEADER: 0x07 0x12\n\
BODY + FOOTER:\n\
\tDATA: [timestamp] [enc value] 0x7A 0xDA\n\
\tSYNC: [timestamp] [offset] 0x0C 0x57\n\
\tUART: [timestamp] [UART data] 0x48 0x20\n";

const DEFAULT_FILE_LEN: u64 = 1_000_000;
const MMAP_WINDOW_LEN: usize = 0x100;
const DATA_OFFSET: usize = 16;
const QUEUE_BOUND: usize = 4096;
const POLL_IDLE_SLEEP: Duration = Duration::from_millis(100);
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "el-read-uio", about = "Relay elevation encoder hardware FIFO records from a UIO device into rotating log files")]
struct Args {
    /// Override the log tree base directory (else $EL_BASE_DIR, else the built-in default).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Override the advisory lock path (else $EL_LOCK_PATH, else the built-in default).
    #[arg(long)]
    lock_path: Option<PathBuf>,

    /// Override the AXI base address, e.g. `0x43c10000` (else $EL_DEVICE_ADDR, else the built-in default).
    #[arg(long)]
    device_addr: Option<String>,

    /// Override the TAI-UTC leap second offset (else $EL_LEAP_OFFSET, else the built-in default).
    #[arg(long)]
    leap_offset: Option<i64>,

    /// Packets per log file before rotating.
    #[arg(long, default_value_t = DEFAULT_FILE_LEN)]
    file_len: u64,

    /// Display version and quit.
    #[arg(long)]
    version: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let args = Args::parse();

    if args.version {
        print_cli_version_banner(
            "el-read-uio",
            env!("CARGO_PKG_VERSION"),
            env!("RELEASE_VERSION"),
            env!("GIT_COMMIT"),
        );
        return ExitCode::SUCCESS;
    }

    let mut config = Config::from_env();
    if let Some(base_dir) = args.base_dir.clone() {
        config = config.with_base_dir(base_dir);
    }
    if let Some(lock_path) = args.lock_path.clone() {
        config = config.with_lock_path(lock_path);
    }
    if let Some(leap_offset) = args.leap_offset {
        config = config.with_leap_offset(leap_offset);
    }
    if let Some(device_addr) = &args.device_addr {
        match parse_device_addr(device_addr) {
            Ok(addr) => config = config.with_device_addr(addr),
            Err(e) => {
                log::error!("{e}");
                return ExitCode::from(1);
            }
        }
    }

    let lock = match LockGuard::acquire(&config.lock_path) {
        Ok(lock) => lock,
        Err(ElError::Locked(path)) => {
            log::error!("another el-read-uio already holds the lock at {path}");
            return ExitCode::from(2);
        }
        Err(e) => {
            log::error!("failed to acquire lock: {e}");
            return ExitCode::from(1);
        }
    };
    log::info!("acquired lock at {}", lock.path().display());

    let dev_path = match find_uio_device(config.device_addr) {
        Ok(path) => path,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(1);
        }
    };
    log::info!("mapping {}", dev_path.display());

    let mmap = match open_device(&dev_path) {
        Ok(mmap) => Arc::new(mmap),
        Err(e) => {
            log::error!("failed to memory-map {}: {e}", dev_path.display());
            return ExitCode::from(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        }) {
            log::warn!("failed to install Ctrl-C handler: {e}");
        }
    }

    let (tx, rx) = mpsc::sync_channel(QUEUE_BOUND);
    let producer_shutdown = shutdown.clone();
    let producer_mmap = mmap.clone();
    let producer = thread::spawn(move || producer_loop(&producer_mmap, &tx, &producer_shutdown));

    let catalog = PathCatalog::new(config.base_dir.clone());
    let result = consume(&catalog, rx, args.file_len, config.leap_offset, &shutdown);

    shutdown.store(true, Ordering::SeqCst);
    if producer.join().is_err() {
        log::warn!("producer thread panicked");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(1)
        }
    }
}

/// Locate the generic-uio device file for the `axi_fifo_mm_s` IP core at
/// `device_addr`, mirroring `get_path_dev`'s sysfs lookup.
fn find_uio_device(device_addr: u64) -> Result<PathBuf> {
    let sysfs_dir = PathBuf::from(format!("/sys/devices/platform/axi/{device_addr:08x}.axi_fifo_mm_s/uio"));
    if !sysfs_dir.exists() {
        return Err(ElError::DeviceMissing(format!(
            "{} does not exist; check firmware and device tree",
            sysfs_dir.display()
        )));
    }

    let pattern = format!("{}/uio*", sysfs_dir.display());
    let name = glob::glob(&pattern)
        .map_err(|e| ElError::DeviceMissing(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .find_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .ok_or_else(|| ElError::DeviceMissing(format!("no uio* entry under {}", sysfs_dir.display())))?;

    Ok(PathBuf::from("/dev").join(name))
}

fn open_device(dev_path: &std::path::Path) -> std::io::Result<Mmap> {
    let file = File::open(dev_path)?;
    unsafe { MmapOptions::new().len(MMAP_WINDOW_LEN).map(&file) }
}

fn read_u32(mmap: &Mmap, offset: usize) -> u32 {
    u32::from_le_bytes(mmap[offset..offset + 4].try_into().unwrap())
}

/// `(r_len, w_len, residue)` status word at offset 0.
fn poll_status(mmap: &Mmap) -> (u32, u32, u32) {
    (read_u32(mmap, 0), read_u32(mmap, 4), read_u32(mmap, 8))
}

/// The data port at offset 16 is four words wide; only the first three carry
/// the 96-bit hardware record, matching `el_EncData`'s use of `data_bytes[0..3]`.
fn read_record(mmap: &Mmap) -> HardwareRecord {
    let words = [
        read_u32(mmap, DATA_OFFSET),
        read_u32(mmap, DATA_OFFSET + 4),
        read_u32(mmap, DATA_OFFSET + 8),
    ];
    HardwareRecord::from_words(words)
}

/// Producer task: polls the FIFO status word and drains every available
/// record into `tx` before sleeping. Breaks out once `shutdown` is set and
/// the channel has no more receivers.
fn producer_loop(mmap: &Mmap, tx: &mpsc::SyncSender<HardwareRecord>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        loop {
            let (r_len, _w_len, residue) = poll_status(mmap);
            if r_len == 0 && residue == 0 {
                break;
            }
            if tx.send(read_record(mmap)).is_err() {
                return;
            }
        }
        thread::sleep(POLL_IDLE_SLEEP);
    }
}

/// Map a decoded hardware record onto the wire packet format shared with
/// `el-read`. `state` selects the packet kind (0=DATA, 1=SYNC, anything else
/// is treated as UART, matching the firmware's use of the two spare bits);
/// the 32-bit packet timestamp is the record's UTC time in milliseconds,
/// wrapping exactly as the documented 32-bit stamp wraparound describes.
/// This hardware path carries no separate encoder reading, so the packet's
/// data field carries the record's sub-nanosecond timing residue.
fn to_packet(record: &HardwareRecord, leap_offset: i64) -> (u32, i32, PacketKind) {
    let kind = match record.state {
        0 => PacketKind::Data,
        1 => PacketKind::Sync,
        _ => PacketKind::Uart,
    };
    let millis = (record.utc(leap_offset) * 1000.0) as i64;
    (millis as u32, record.sub_nsec as i32, kind)
}

struct RotatingWriter<'a> {
    catalog: &'a PathCatalog,
    file: File,
    file_len: u64,
    remaining: u64,
}

impl<'a> RotatingWriter<'a> {
    fn open_new(catalog: &'a PathCatalog, file_len: u64) -> Result<Self> {
        let path = catalog.create_path_for(Utc::now())?;
        log::info!("rotating to {}", path.display());

        let mut file = File::create(&path)?;
        let now = Utc::now();
        let unix_time = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 * 1e-6;
        file.write_all(&encode_header(VERSION, unix_time, HEADER_TEXT))?;

        Ok(Self { catalog, file, file_len, remaining: file_len })
    }

    fn write_record(&mut self, record: &HardwareRecord, leap_offset: i64) -> Result<()> {
        if self.remaining == 0 {
            *self = Self::open_new(self.catalog, self.file_len)?;
        }
        let (stamp, payload, kind) = to_packet(record, leap_offset);
        self.file.write_all(&encode(stamp, payload, kind))?;
        self.remaining -= 1;
        Ok(())
    }
}

/// Consumer task: drains `rx`, writing each record through a
/// [`RotatingWriter`]. Exits once `shutdown` is set and the channel has
/// drained, or as soon as the producer disconnects.
fn consume(
    catalog: &PathCatalog,
    rx: mpsc::Receiver<HardwareRecord>,
    file_len: u64,
    leap_offset: i64,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut writer = RotatingWriter::open_new(catalog, file_len)?;

    loop {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(record) => writer.write_record(&record, leap_offset)?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    return Ok(());
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}
