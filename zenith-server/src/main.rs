//! `zenith-server` — serves the current zenith angle over a tiny line
//! protocol: request `e#zenith?`, response a `%.3f` ASCII float with no
//! trailing newline. One client at a time, one request at a time; the
//! listener does not accept a new connection until the current one closes.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use elcore::config::Config;
use elcore::path_catalog::PathCatalog;
use elcore::version::print_cli_version_banner;
use elcore::zenith::{latest_zenith, ZenithCalibration};

const REQUEST: &str = "e#zenith?";
const READ_BUF_LEN: usize = 1024;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "zenith-server", about = "Serve the current zenith angle over TCP")]
struct Args {
    /// Override the base directory of the log file tree (else $EL_BASE_DIR, else the built-in default).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Override the bind host (else $EL_SERVER_HOST, else the built-in default).
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port (else $EL_SERVER_PORT, else the built-in default).
    #[arg(long)]
    port: Option<u16>,

    /// Display version and quit.
    #[arg(long)]
    version: bool,
}

fn handle_client(mut stream: TcpStream, catalog: &PathCatalog) -> std::io::Result<()> {
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            log::debug!("connection from {peer} closed");
            return Ok(());
        }

        let request = String::from_utf8_lossy(&buf[..n]);
        let request = request.trim();
        if request != REQUEST {
            log::warn!("unrecognized request from {peer}: {request:?}");
            continue;
        }

        match latest_zenith(catalog, ZenithCalibration::DEFAULT) {
            Ok(zenith) => {
                stream.write_all(format!("{zenith:.3}").as_bytes())?;
            }
            Err(e) => {
                log::error!("latest_zenith failed while serving {peer}: {e}");
            }
        }
    }
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
            "zenith-server",
            env!("CARGO_PKG_VERSION"),
            env!("RELEASE_VERSION"),
            env!("GIT_COMMIT"),
        );
        return ExitCode::SUCCESS;
    }

    let mut config = Config::from_env();
    if let Some(base_dir) = args.base_dir {
        config = config.with_base_dir(base_dir);
    }
    if args.host.is_some() || args.port.is_some() {
        let host = args.host.unwrap_or(config.server_host.clone());
        let port = args.port.unwrap_or(config.server_port);
        config = config.with_server_addr(host, port);
    }

    let catalog = PathCatalog::new(config.base_dir);

    let listener = match TcpListener::bind(config.server_addr()) {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to bind {}: {e}", config.server_addr());
            return ExitCode::from(1);
        }
    };
    log::info!("zenith-server listening on {}", config.server_addr());

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                if let Err(e) = handle_client(stream, &catalog) {
                    log::warn!("client connection error: {e}");
                }
            }
            Err(e) => log::warn!("failed to accept connection: {e}"),
        }
    }

    ExitCode::SUCCESS
}
