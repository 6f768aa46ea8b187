//! Common utilities and types shared across coordkv

pub mod config;
pub mod error;
pub mod utils;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use utils::{
    display_bytes, key_in_range, key_successor, parse_duration, prefix_range_end, validate_key,
    FROM_KEY_END,
};
