#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

/// Construction-time knobs: initial capacity and the density and grave
/// thresholds driving growth and compaction.
pub mod config;

/// Configuration errors.
pub mod error;

pub mod hash_table;

pub mod key_policy;

pub use config::TableConfig;
pub use error::ConfigError;
pub use hash_table::Entry;
pub use hash_table::HashTable;
pub use key_policy::KeyPolicy;
