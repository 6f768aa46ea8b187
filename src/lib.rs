//! # coordkv
//!
//! A typed client for etcd-style coordination stores:
//! - Single-key and range reads, including reads at a past revision
//! - Paginated scans pinned to one revision
//! - Watch subscriptions with explicit cancellation
//! - Leases that scope a key's lifetime
//! - An in-process MVCC store with the same semantics, for tests and demos
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Client                     │
//! │  validation, deadlines, typed results   │
//! │   - Pager: revision-pinned pages        │
//! │   - WatchStream: forwarding task        │
//! └───────────┬─────────────────────────────┘
//!             │ KvBackend
//!   ┌─────────┴──────────┐
//!   │                    │
//! ┌─▼───────────┐   ┌────▼─────────┐
//! │ GrpcBackend │   │ MemoryBackend│
//! │ (etcd v3)   │   │ (in-process) │
//! └─────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Run the demo scenarios
//! ```bash
//! coordkv --endpoints 127.0.0.1:2379 demo
//! coordkv --in-memory demo --scenario watch
//! ```
//!
//! ### Use the CLI
//! ```bash
//! coordkv put my-key my-value
//! coordkv get key --prefix --limit 10
//! coordkv lease grant 5
//! coordkv watch key --prefix
//! ```

pub mod backend;
pub mod client;
pub mod common;
pub mod ops;
pub mod proto;

// Re-export commonly used types
pub use backend::{GrpcBackend, KvBackend, MemoryBackend};
pub use client::{
    Client, DeleteOptions, GetOptions, KeyValue, LeaseId, Pager, PutOptions, Revision,
    WatchEvent, WatchOptions, WatchStream,
};
pub use common::{ClientConfig, Error, Result};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
