//! Insert a batch of keys and page through them

use super::ScenarioConfig;
use crate::client::{Client, GetOptions, PutOptions, Revision};
use crate::common::Result;
use serde::Serialize;

pub async fn paginate_prefix(client: &Client, config: &ScenarioConfig) -> Result<PaginationReport> {
    tracing::info!(
        "Starting pagination scenario ({} keys, {} per page)",
        config.page_keys,
        config.page_limit
    );
    super::clear_prefix(client).await?;

    for i in 0..config.page_keys {
        client
            .put(format!("key_{:02}", i), i.to_string(), PutOptions::new())
            .await?;
    }

    let mut pager = client.paginate(
        super::KEY_PREFIX,
        GetOptions::new()
            .with_prefix()
            .with_limit(config.page_limit),
    )?;

    let mut pages = Vec::new();
    let mut total = 0;
    while let Some(page) = pager.next_page().await? {
        total += page.len();
        let summary = PageSummary {
            first_key: page.first().map(|kv| kv.key_str().into_owned()).unwrap_or_default(),
            last_key: page.last().map(|kv| kv.key_str().into_owned()).unwrap_or_default(),
            len: page.len(),
        };
        tracing::debug!(
            "Page {}: {}..{}",
            pages.len() + 1,
            summary.first_key,
            summary.last_key
        );
        pages.push(summary);
    }

    Ok(PaginationReport {
        inserted: config.page_keys,
        total,
        revision: pager.revision().unwrap_or_default(),
        pages,
    })
}

#[derive(Debug, Serialize)]
pub struct PageSummary {
    pub first_key: String,
    pub last_key: String,
    pub len: usize,
}

#[derive(Debug, Serialize)]
pub struct PaginationReport {
    pub inserted: usize,
    /// Entries seen across all pages
    pub total: usize,
    /// Revision the pages were read at
    pub revision: Revision,
    pub pages: Vec<PageSummary>,
}
