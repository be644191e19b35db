//! # syncrony
//!
//! Distributed leader election over an etcd-style key-value store:
//! - Compare-and-swap lock acquisition with a lease (ttl)
//! - Periodic renewal while leading
//! - Watch-based takeover when the lock is deleted or expires
//! - A local watchdog that drops leadership if renewal stalls
//! - Failover across store endpoints with jittered retry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Election A   │  │ Election B   │  │ Election C   │
//! │ (leading)    │  │ (following)  │  │ (following)  │
//! │  renew/ttl   │  │  watch lock  │  │  watch lock  │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ PUT prevValue   │ GET wait        │ GET wait
//!        └────────────┬────┴─────────────────┘
//!                     │ HTTP+JSON (v2 keys API)
//!          ┌──────────▼───────────┐
//!          │ store endpoints      │
//!          │ node-1 node-2 node-3 │
//!          └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Campaign from the CLI
//! ```bash
//! syncrony --endpoints http://10.0.0.1:4001,http://10.0.0.2:4001 \
//!   campaign --path jobs/scheduler --ttl 15 --interval-ms 5000
//! ```
//!
//! ### Inspect the lock
//! ```bash
//! syncrony get jobs/scheduler
//! syncrony watch jobs/scheduler
//! ```

pub mod common;
pub mod election;
pub mod store;

// Re-export commonly used types
pub use common::{Config, ElectionConfig, Error, RenewWith, Result, StoreConfig, StoreError};
pub use election::{Election, ElectionState};
pub use store::Client;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
