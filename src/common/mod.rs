//! Common utilities and types shared across syncrony

pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, ElectionConfig, RenewWith, StoreConfig};
pub use error::{Error, Result, StoreError};
pub use utils::{encode_key_path, jittered, wire_bool};
