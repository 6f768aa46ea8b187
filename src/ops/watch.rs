//! Watch a prefix, then confirm cancellation stops delivery

use super::ScenarioConfig;
use crate::client::{Client, PutOptions, WatchEvent, WatchOptions};
use crate::common::{Error, Result};
use serde::Serialize;

pub async fn watch_prefix(client: &Client, config: &ScenarioConfig) -> Result<WatchReport> {
    tracing::info!(
        "Starting watch scenario ({} events)",
        config.watch_events
    );
    super::clear_prefix(client).await?;

    let mut stream = client
        .watch(super::KEY_PREFIX, WatchOptions::new().with_prefix())
        .await?;

    for i in 0..config.watch_events {
        client
            .put(format!("key_{:02}", i), i.to_string(), PutOptions::new())
            .await?;
    }

    let mut events = Vec::with_capacity(config.watch_events);
    while events.len() < config.watch_events {
        match tokio::time::timeout(config.watch_settle, stream.next_event()).await {
            Ok(Some(event)) => events.push(event?),
            Ok(None) => {
                return Err(Error::Unavailable(format!(
                    "watch ended after {} of {} events",
                    events.len(),
                    config.watch_events
                )))
            }
            Err(_) => {
                return Err(Error::DeadlineExceeded(format!(
                    "watch delivered {} of {} events within {:?}",
                    events.len(),
                    config.watch_events,
                    config.watch_settle
                )))
            }
        }
    }

    stream.cancel();
    tracing::info!("Watch canceled after {} events", events.len());

    let offset = config.watch_events;
    for i in offset..offset * 2 {
        client
            .put(format!("key_{:02}", i), i.to_string(), PutOptions::new())
            .await?;
    }

    let mut late_events = 0;
    while let Ok(Some(item)) = tokio::time::timeout(config.watch_settle, stream.next_event()).await
    {
        if item.is_ok() {
            late_events += 1;
        }
    }
    if late_events > 0 {
        tracing::warn!("{} events arrived after cancel", late_events);
    }

    Ok(WatchReport {
        events,
        late_events,
    })
}

#[derive(Debug, Serialize)]
pub struct WatchReport {
    /// Events received before the watch was canceled
    pub events: Vec<WatchEvent>,
    /// Events received after it; zero when cancellation works
    pub late_events: usize,
}
