//! `el-read` — the TCP `RawSampler`: connects to an upstream device that
//! streams 12-byte elevation encoder packets, writes a 256-byte header and
//! relays packets into rotating log files under a `PathCatalog`-managed
//! tree. Also doubles as a thin control client for the `e#reset_enable` /
//! `e#reset_disable` out-of-band commands the upstream device accepts.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use elcore::codec::encode_header;
use elcore::config::Config;
use elcore::lock::LockGuard;
use elcore::path_catalog::PathCatalog;
use elcore::version::print_cli_version_banner;
use elcore::{ElError, Result};

const VERSION: u32 = 2020011601;
const HEADER_TEXT: &str = "Elevation logger data\n\
Packet format: [HEADER 2 bytes][BODY 4+4 bytes][FOOTER 2 bytes]\n\
HEADER: 0x07 0x12\n\
BODY + FOOTER:\n\
\tDATA: [timestamp] [enc value] 0x7A 0xDA\n\
\tSYNC: [timestamp] [offset] 0x0C 0x57\n\
\tUART: [timestamp] [UART data] 0x48 0x20\n";

const RECV_BUFLEN: usize = 128 * 12;
const DEFAULT_FILE_LEN: u64 = 1_000_000;

#[derive(Parser)]
#[command(name = "el-read", about = "Relay elevation encoder packets from an upstream TCP device into rotating log files")]
struct Args {
    /// Override the log tree base directory (else $EL_BASE_DIR, else the built-in default).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Override the advisory lock path (else $EL_LOCK_PATH, else the built-in default).
    #[arg(long)]
    lock_path: Option<PathBuf>,

    /// Upstream device host (else $EL_SERVER_HOST, else the built-in default).
    #[arg(long)]
    host: Option<String>,

    /// Upstream device port (else $EL_SERVER_PORT, else the built-in default).
    #[arg(long)]
    port: Option<u16>,

    /// Packets per log file before rotating.
    #[arg(long, default_value_t = DEFAULT_FILE_LEN)]
    file_len: u64,

    /// Send `e#reset_enable` to the upstream device and quit.
    #[arg(long, conflicts_with = "reset_disable")]
    reset_enable: bool,

    /// Send `e#reset_disable` to the upstream device and quit.
    #[arg(long)]
    reset_disable: bool,

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
            "el-read",
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
    if args.host.is_some() || args.port.is_some() {
        let host = args.host.clone().unwrap_or(config.server_host.clone());
        let port = args.port.unwrap_or(config.server_port);
        config = config.with_server_addr(host, port);
    }

    if args.reset_enable || args.reset_disable {
        let command: &[u8] = if args.reset_enable { b"e#reset_enable" } else { b"e#reset_disable" };
        return match send_control_command(&config.server_addr(), command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{e}");
                ExitCode::from(1)
            }
        };
    }

    let lock = match LockGuard::acquire(&config.lock_path) {
        Ok(lock) => lock,
        Err(ElError::Locked(path)) => {
            log::error!("another el-read already holds the lock at {path}");
            return ExitCode::from(2);
        }
        Err(e) => {
            log::error!("failed to acquire lock: {e}");
            return ExitCode::from(1);
        }
    };
    log::info!("acquired lock at {}", lock.path().display());

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

    let catalog = PathCatalog::new(config.base_dir.clone());

    log::info!("connecting to upstream device at {}", config.server_addr());
    let mut stream = match TcpStream::connect(config.server_addr()) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("failed to connect to upstream device: {e}");
            return ExitCode::from(1);
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        let path = match catalog.create_path_for(Utc::now()) {
            Ok(path) => path,
            Err(e) => {
                log::error!("failed to create rotation target: {e}");
                return ExitCode::from(1);
            }
        };

        log::info!("rotating to {}", path.display());
        if let Err(e) = relay_one_file(&mut stream, &path, args.file_len) {
            log::error!("relay into {} failed: {e}", path.display());
            return ExitCode::from(1);
        }
    }

    ExitCode::SUCCESS
}

/// Open `path`, write its 256-byte header, then relay `file_len` packets
/// (`file_len * 12` bytes) read from `stream` in `RECV_BUFLEN`-sized chunks.
/// The only suspension point is the blocking read from `stream`.
fn relay_one_file(stream: &mut TcpStream, path: &std::path::Path, file_len: u64) -> Result<()> {
    let mut file = std::fs::File::create(path)?;

    let now = Utc::now();
    let unix_time = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 * 1e-6;
    file.write_all(&encode_header(VERSION, unix_time, HEADER_TEXT))?;

    let mut remaining = file_len * 12;
    let mut buf = [0u8; RECV_BUFLEN];

    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            return Err(ElError::TransportError("upstream device closed the connection".into()));
        }
        file.write_all(&buf[..n])?;
        remaining -= n as u64;
    }

    Ok(())
}

/// Send one out-of-band control command (`e#reset_enable` / `e#reset_disable`)
/// over a short-lived connection, matching the upstream protocol's
/// connect-send-close pattern for these commands.
fn send_control_command(addr: &str, command: &[u8]) -> Result<()> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(command)?;
    Ok(())
}
