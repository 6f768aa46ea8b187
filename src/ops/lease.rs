//! Attach a key to a short lease and watch it expire

use super::ScenarioConfig;
use crate::client::{Client, GetOptions, LeaseId, PutOptions};
use crate::common::Result;
use serde::Serialize;

pub async fn lease_expiry(client: &Client, config: &ScenarioConfig) -> Result<LeaseReport> {
    tracing::info!(
        "Starting lease scenario (ttl {}s, wait {:?})",
        config.lease_ttl_secs,
        config.lease_wait
    );
    super::clear_prefix(client).await?;

    let present_before = !client.get("key", GetOptions::new()).await?.is_empty();

    let lease = client.grant_lease(config.lease_ttl_secs).await?;
    client
        .put("key", "leased", PutOptions::new().with_lease(lease.id))
        .await?;
    let present_with_lease = !client.get("key", GetOptions::new()).await?.is_empty();

    tokio::time::sleep(config.lease_wait).await;
    let present_after_expiry = !client.get("key", GetOptions::new()).await?.is_empty();
    tracing::info!(
        "Lease {} expired, key present: {}",
        lease.id,
        present_after_expiry
    );

    Ok(LeaseReport {
        lease: lease.id,
        ttl: lease.ttl,
        present_before,
        present_with_lease,
        present_after_expiry,
    })
}

#[derive(Debug, Serialize)]
pub struct LeaseReport {
    pub lease: LeaseId,
    pub ttl: i64,
    pub present_before: bool,
    pub present_with_lease: bool,
    pub present_after_expiry: bool,
}
