//! Stream reconstruction engine for telescope elevation encoder logs.
//!
//! A log file is a fixed 256-byte header followed by a packed sequence of
//! 12-byte packets ([`codec`]). [`path_catalog`] enumerates and navigates the
//! dated file tree a [`reader::FileReader`] opens one of at a time.
//! [`sync_machine`] reassembles SYNC+UART runs into synchronization records,
//! [`el_stream`] combines all of the above into a per-file iterator of
//! annotated samples, and [`span_assembler`] concatenates that iterator
//! across a time range. [`zenith`] is the one consumer of the raw encoder
//! value that turns it into an astronomical quantity.

pub mod codec;
pub mod config;
pub mod diagnostic;
pub mod el_stream;
pub mod error;
pub mod lock;
pub mod path_catalog;
pub mod reader;
pub mod span_assembler;
pub mod sync_machine;
pub mod tsu_time;
pub mod version;
pub mod zenith;

pub use config::Config;
pub use error::{ElError, Result};
