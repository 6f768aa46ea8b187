//! Put a key twice and read both versions back

use crate::client::{Client, GetOptions, PutOptions, Revision};
use crate::common::Result;
use serde::Serialize;

pub async fn single_value(client: &Client) -> Result<SingleValueReport> {
    tracing::info!("Starting single value scenario");
    super::clear_prefix(client).await?;

    let first = client.put("key", "444", PutOptions::new()).await?;
    let second = client.put("key", "555", PutOptions::new()).await?;

    let latest = client.get("key", GetOptions::new()).await?;
    let historical = client
        .get("key", GetOptions::new().with_revision(first.revision))
        .await?;

    Ok(SingleValueReport {
        first_revision: first.revision,
        second_revision: second.revision,
        latest: latest.kvs.first().map(|kv| kv.value_str().into_owned()),
        at_first_revision: historical.kvs.first().map(|kv| kv.value_str().into_owned()),
    })
}

#[derive(Debug, Serialize)]
pub struct SingleValueReport {
    pub first_revision: Revision,
    pub second_revision: Revision,
    pub latest: Option<String>,
    pub at_first_revision: Option<String>,
}
