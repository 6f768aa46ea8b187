//! Demonstration scenarios
//!
//! Each scenario exercises one part of the client against a live store and
//! returns a report for the CLI to print. Every scenario starts by deleting
//! the `key` prefix so runs do not see each other's data.

pub mod lease;
pub mod pagination;
pub mod single_value;
pub mod watch;

pub use lease::{lease_expiry, LeaseReport};
pub use pagination::{paginate_prefix, PageSummary, PaginationReport};
pub use single_value::{single_value, SingleValueReport};
pub use watch::{watch_prefix, WatchReport};

use crate::client::{Client, DeleteOptions};
use crate::common::Result;
use serde::Serialize;
use std::time::Duration;

/// Prefix every scenario writes under
pub const KEY_PREFIX: &str = "key";

/// Tunables shared by the scenarios
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Keys inserted by the pagination scenario
    pub page_keys: usize,
    pub page_limit: u64,
    /// Events produced before and after canceling the watch
    pub watch_events: usize,
    /// How long to wait for a single watch event
    pub watch_settle: Duration,
    pub lease_ttl_secs: i64,
    /// How long to wait before checking that the leased key expired
    pub lease_wait: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            page_keys: 50,
            page_limit: 10,
            watch_events: 10,
            watch_settle: Duration::from_secs(2),
            lease_ttl_secs: 1,
            lease_wait: Duration::from_secs(3),
        }
    }
}

/// Reports of a full demo run
#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub single_value: SingleValueReport,
    pub pagination: PaginationReport,
    pub watch: WatchReport,
    pub lease: LeaseReport,
}

/// Run every scenario in order, stopping at the first failure
pub async fn run_all(client: &Client, config: &ScenarioConfig) -> Result<DemoReport> {
    tracing::info!("Starting demo against {} backend", client.backend_name());
    Ok(DemoReport {
        single_value: single_value(client).await?,
        pagination: paginate_prefix(client, config).await?,
        watch: watch_prefix(client, config).await?,
        lease: lease_expiry(client, config).await?,
    })
}

/// Delete everything under [`KEY_PREFIX`]
pub(crate) async fn clear_prefix(client: &Client) -> Result<i64> {
    let resp = client
        .delete(KEY_PREFIX, DeleteOptions::new().with_prefix())
        .await?;
    if resp.deleted > 0 {
        tracing::debug!("Cleared {} leftover keys", resp.deleted);
    }
    Ok(resp.deleted)
}
