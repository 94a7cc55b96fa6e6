//! `zenith-client` — connect to a `zenith-server`, send one `e#zenith?`
//! request, print the parsed response.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::ExitCode;

use clap::Parser;

use elcore::config::Config;
use elcore::version::print_cli_version_banner;

const REQUEST: &[u8] = b"e#zenith?";

#[derive(Parser)]
#[command(name = "zenith-client", about = "Request the current zenith angle from a zenith-server")]
struct Args {
    /// Override the server host (else $EL_SERVER_HOST, else the built-in default).
    #[arg(long)]
    host: Option<String>,

    /// Override the server port (else $EL_SERVER_PORT, else the built-in default).
    #[arg(long)]
    port: Option<u16>,

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
            "zenith-client",
            env!("CARGO_PKG_VERSION"),
            env!("RELEASE_VERSION"),
            env!("GIT_COMMIT"),
        );
        return ExitCode::SUCCESS;
    }

    let mut config = Config::from_env();
    if args.host.is_some() || args.port.is_some() {
        let host = args.host.unwrap_or(config.server_host.clone());
        let port = args.port.unwrap_or(config.server_port);
        config = config.with_server_addr(host, port);
    }

    match request_zenith(&config.server_addr()) {
        Ok(zenith) => {
            println!("{zenith:.3}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn request_zenith(addr: &str) -> std::io::Result<f64> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(REQUEST)?;

    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf)?;
    let response = String::from_utf8_lossy(&buf[..n]);

    response
        .trim()
        .parse::<f64>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
