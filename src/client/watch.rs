//! Watch subscriptions
//!
//! Each subscription runs a forwarding task that pulls responses from the
//! backend stream and pushes typed events into a bounded channel. The task
//! stops when the subscription is canceled, when the consumer goes away, or
//! after delivering a final error if the store side fails. Stopping drops
//! the backend stream, which releases the server-side watch.

use crate::backend::{watch_canceled, WatchHandle, WatchResponseStream};
use crate::client::types::WatchEvent;
use crate::common::{Error, Result};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Live stream of [`WatchEvent`]s for one subscription
///
/// Events arrive in store revision order. The stream yields `None` once
/// the subscription has ended; a store-side failure is reported as one
/// final `Err` item first. Dropping the stream cancels the subscription.
pub struct WatchStream {
    watch_id: i64,
    events: mpsc::Receiver<Result<WatchEvent>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchStream {
    pub(crate) fn spawn(handle: WatchHandle, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        let token = CancellationToken::new();
        let task = tokio::spawn(forward_events(
            handle.watch_id,
            handle.responses,
            tx,
            token.clone(),
        ));
        Self {
            watch_id: handle.watch_id,
            events: rx,
            token,
            task: Some(task),
        }
    }

    /// Store-assigned watch ID
    pub fn watch_id(&self) -> i64 {
        self.watch_id
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn next_event(&mut self) -> Option<Result<WatchEvent>> {
        self.events.recv().await
    }

    /// Stop the subscription. Events already buffered can still be read.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this subscription, for wiring into a caller's
    /// own shutdown signal
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel and wait for the forwarding task to exit
    pub async fn close(mut self) -> Result<()> {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::Internal(format!("watch task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Stream for WatchStream {
    type Item = Result<WatchEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

async fn forward_events(
    watch_id: i64,
    mut responses: WatchResponseStream,
    tx: mpsc::Sender<Result<WatchEvent>>,
    token: CancellationToken,
) {
    'stream: loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tx.closed() => break,
            next = responses.next() => next,
        };

        match next {
            Some(Ok(resp)) => {
                if resp.canceled {
                    let err = watch_canceled(&resp);
                    tracing::warn!("Watch {} ended by the store: {}", watch_id, err);
                    deliver(&tx, &token, Err(err)).await;
                    break;
                }
                for event in resp.events {
                    let item = WatchEvent::try_from(event);
                    let malformed = item.is_err();
                    if !deliver(&tx, &token, item).await || malformed {
                        break 'stream;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Watch {} failed: {}", watch_id, e);
                deliver(&tx, &token, Err(e)).await;
                break;
            }
            None => {
                tracing::warn!("Watch {} stream closed by the store", watch_id);
                deliver(
                    &tx,
                    &token,
                    Err(Error::Unavailable(format!(
                        "watch {} stream closed by the store",
                        watch_id
                    ))),
                )
                .await;
                break;
            }
        }
    }
    tracing::debug!("Watch {} forwarder stopped", watch_id);
}

/// Push one item unless the subscription is canceled first
async fn deliver(
    tx: &mpsc::Sender<Result<WatchEvent>>,
    token: &CancellationToken,
    item: Result<WatchEvent>,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
