//! Process-wide configuration: base directory, advisory lock path, zenith
//! wire-protocol endpoint, FPGA device address, and leap-second offset.
//!
//! Library constructors never read the environment themselves ([`path_catalog`](crate::path_catalog),
//! [`el_stream`](crate::el_stream), [`zenith`](crate::zenith) all take explicit parameters); only a CLI's
//! `main` resolves a [`Config`] from environment variables via [`Config::from_env`] and
//! passes its fields down.

use std::path::PathBuf;

/// Recognized environment variables, one per [`Config`] field.
pub const ENV_BASE_DIR: &str = "EL_BASE_DIR";
pub const ENV_LOCK_PATH: &str = "EL_LOCK_PATH";
pub const ENV_SERVER_HOST: &str = "EL_SERVER_HOST";
pub const ENV_SERVER_PORT: &str = "EL_SERVER_PORT";
pub const ENV_DEVICE_ADDR: &str = "EL_DEVICE_ADDR";
pub const ENV_LEAP_OFFSET: &str = "EL_LEAP_OFFSET";

/// Default AXI base address of the `axi_fifo_mm_s` IP core.
pub const DEFAULT_DEVICE_ADDR: u64 = 0x43c1_0000;

/// Default TAI-UTC leap second offset, as of the last IERS bulletin this
/// system was deployed against.
pub const DEFAULT_LEAP_OFFSET: i64 = 37;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_dir: PathBuf,
    pub lock_path: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub device_addr: u64,
    pub leap_offset: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/home/gb/logger/bdata/el_enc"),
            lock_path: PathBuf::from("/tmp/el_enc.lock"),
            server_host: "0.0.0.0".to_string(),
            server_port: 9876,
            device_addr: DEFAULT_DEVICE_ADDR,
            leap_offset: DEFAULT_LEAP_OFFSET,
        }
    }
}

impl Config {
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_lock_path(mut self, lock_path: impl Into<PathBuf>) -> Self {
        self.lock_path = lock_path.into();
        self
    }

    pub fn with_server_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.server_host = host.into();
        self.server_port = port;
        self
    }

    pub fn with_device_addr(mut self, device_addr: u64) -> Self {
        self.device_addr = device_addr;
        self
    }

    pub fn with_leap_offset(mut self, leap_offset: i64) -> Self {
        self.leap_offset = leap_offset;
        self
    }

    /// `(host, port)` formatted for `TcpStream::connect`/`TcpListener::bind`.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Start from [`Default`] and overlay whichever of the recognized
    /// environment variables are set. Malformed numeric overrides are
    /// ignored, falling back to the default rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var(ENV_BASE_DIR) {
            config.base_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var(ENV_LOCK_PATH) {
            config.lock_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var(ENV_SERVER_HOST) {
            config.server_host = v;
        }
        if let Ok(v) = std::env::var(ENV_SERVER_PORT) {
            if let Ok(port) = v.parse() {
                config.server_port = port;
            }
        }
        if let Ok(v) = std::env::var(ENV_DEVICE_ADDR) {
            let trimmed = v.trim_start_matches("0x").trim_start_matches("0X");
            if let Ok(addr) = u64::from_str_radix(trimmed, 16) {
                config.device_addr = addr;
            }
        }
        if let Ok(v) = std::env::var(ENV_LEAP_OFFSET) {
            if let Ok(offset) = v.parse() {
                config.leap_offset = offset;
            }
        }

        config
    }
}
