//! Error types for syncrony

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// etcd v2 error codes the client and election care about.
pub mod code {
    pub const KEY_NOT_FOUND: u64 = 100;
    pub const TEST_FAILED: u64 = 101;
    pub const NOT_FILE: u64 = 102;
    pub const NOT_DIR: u64 = 104;
    pub const NODE_EXIST: u64 = 105;
    pub const DIR_NOT_EMPTY: u64 = 108;
    pub const PREV_VALUE_REQUIRED: u64 = 201;
    pub const TTL_NAN: u64 = 202;
    pub const INDEX_NAN: u64 = 203;
    pub const RAFT_INTERNAL: u64 = 300;
    pub const LEADER_ELECT: u64 = 301;
    pub const WATCHER_CLEARED: u64 = 400;
    pub const EVENT_INDEX_CLEARED: u64 = 401;
}

/// Error payload returned by the store for a well-formed request it refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreError {
    pub error_code: u64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Store index at the time of the error
    #[serde(default)]
    pub index: u64,
    /// Anything else the store sent along
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StoreError {
    pub fn is_key_not_found(&self) -> bool {
        self.error_code == code::KEY_NOT_FOUND
    }

    /// `prevValue`/`prevIndex` did not match
    pub fn is_compare_failed(&self) -> bool {
        self.error_code == code::TEST_FAILED
    }

    /// `prevExist=false` on a key that exists
    pub fn is_node_exist(&self) -> bool {
        self.error_code == code::NODE_EXIST
    }

    /// Any of the ways a conditional write can lose: the key was missing,
    /// already present, or held a different value/index.
    pub fn is_precondition_failed(&self) -> bool {
        self.is_key_not_found() || self.is_compare_failed() || self.is_node_exist()
    }

    /// The requested wait index fell out of the store's event history.
    pub fn is_index_cleared(&self) -> bool {
        self.error_code == code::EVENT_INDEX_CLEARED
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({})", cause)?;
        }
        write!(f, " at index {}", self.index)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    #[error("Store rejected request: {0}")]
    Rejected(StoreError),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed store response: {0}")]
    Decode(#[from] serde_json::Error),

    // === Caller Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// The store's error payload, if this is a store rejection
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Error::Rejected(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }

    pub fn is_key_not_found(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_key_not_found)
    }

    /// A lost compare-and-swap. This is an expected outcome, not a fault.
    pub fn is_precondition_failed(&self) -> bool {
        self.store_error()
            .is_some_and(StoreError::is_precondition_failed)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Rejected(e)
    }
}
