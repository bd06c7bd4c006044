//! Filesystem primitives for the module update manager
//!
//! Provides locked atomic writes, SHA-256 checksums, whole-directory copy and
//! replace helpers, and a format-agnostic configuration store.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod tree;

pub use checksum::{compute_file_checksum, parse_checksum_file};
pub use config::ConfigStore;
pub use error::{Error, Result};
