//! Store client
//!
//! Talks to an etcd-compatible v2 keys API over HTTP+JSON:
//! - Compare-and-swap writes and deletes
//! - Leases (ttl)
//! - Long-poll reads and restartable watch streams
//! - Failover across endpoints with jittered retry

pub mod client;
pub mod types;
pub mod watch;

pub use client::Client;
pub use types::{Action, Node, Precondition, Response, Wait};
