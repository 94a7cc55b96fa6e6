//! `latest-zenith` — print the zenith angle derived from the most recent
//! DATA packet in the log file tree.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use elcore::config::Config;
use elcore::path_catalog::PathCatalog;
use elcore::version::print_cli_version_banner;
use elcore::zenith::{latest_zenith, ZenithCalibration};
use elcore::ElError;

#[derive(Parser)]
#[command(name = "latest-zenith", about = "Print the zenith angle from the latest elevation encoder log file")]
struct Args {
    /// Override the base directory of the log file tree (else $EL_BASE_DIR, else the built-in default).
    #[arg(long)]
    base_dir: Option<PathBuf>,

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
            "latest-zenith",
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

    let catalog = PathCatalog::new(config.base_dir);
    match latest_zenith(&catalog, ZenithCalibration::DEFAULT) {
        Ok(zenith) => {
            println!("{zenith:.3}");
            ExitCode::SUCCESS
        }
        Err(ElError::NoLatest) => {
            log::error!("no DATA packet found in the latest or previous log file");
            ExitCode::from(1)
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(1)
        }
    }
}
