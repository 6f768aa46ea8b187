//! Watch subscriptions: ordering, cancellation, and failure reporting

use coordkv::client::EventKind;
use coordkv::{
    Client, ClientConfig, DeleteOptions, Error, MemoryBackend, PutOptions, WatchOptions,
};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Client, MemoryBackend) {
    let store = MemoryBackend::new();
    let client = Client::with_backend(Arc::new(store.clone()), &ClientConfig::default());
    (client, store)
}

#[tokio::test]
async fn test_events_in_order() {
    let (client, _store) = setup();
    let mut stream = client
        .watch("key", WatchOptions::new().with_prefix())
        .await
        .unwrap();

    let mut revisions = Vec::new();
    for i in 0..10 {
        let resp = client
            .put(format!("key_{:02}", i), i.to_string(), PutOptions::new())
            .await
            .unwrap();
        revisions.push(resp.revision);
    }
    // Outside the prefix
    client.put("other", "x", PutOptions::new()).await.unwrap();

    for (i, revision) in revisions.iter().enumerate() {
        let event = stream.next_event().await.unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Put);
        assert_eq!(event.kv.key_str(), format!("key_{:02}", i));
        assert_eq!(event.kv.value_str(), i.to_string());
        assert_eq!(event.revision(), *revision);
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(50), stream.next_event())
            .await
            .is_err(),
        "no event expected for keys outside the prefix"
    );
}

#[tokio::test]
async fn test_no_events_after_cancel() {
    let (client, store) = setup();
    let mut stream = client
        .watch("key", WatchOptions::new().with_prefix())
        .await
        .unwrap();

    client.put("key_00", "0", PutOptions::new()).await.unwrap();
    assert!(stream.next_event().await.unwrap().is_ok());

    stream.cancel();
    assert!(stream.is_canceled());
    for i in 10..20 {
        client
            .put(format!("key_{:02}", i), i.to_string(), PutOptions::new())
            .await
            .unwrap();
    }
    assert!(stream.next_event().await.is_none());
    stream.close().await.unwrap();
    assert_eq!(store.watcher_count(), 0);
}

#[tokio::test]
async fn test_dropping_stream_releases_watch() {
    let (client, store) = setup();
    let stream = client
        .watch("key", WatchOptions::new().with_prefix())
        .await
        .unwrap();
    assert_eq!(store.watcher_count(), 1);

    drop(stream);
    // The forwarder notices the cancel on its next poll
    for _ in 0..100 {
        if store.watcher_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.watcher_count(), 0);
}

#[tokio::test]
async fn test_delete_events_and_filters() {
    let (client, _store) = setup();
    let mut deletes = client
        .watch("key", WatchOptions::new().with_prefix().without_puts())
        .await
        .unwrap();

    client.put("key_a", "1", PutOptions::new()).await.unwrap();
    client.put("key_b", "2", PutOptions::new()).await.unwrap();
    let resp = client
        .delete("key", DeleteOptions::new().with_prefix())
        .await
        .unwrap();

    let first = deletes.next().await.unwrap().unwrap();
    let second = deletes.next().await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Delete);
    assert_eq!(second.kind, EventKind::Delete);
    assert_eq!(first.revision(), resp.revision);
    assert_eq!(second.revision(), resp.revision);
}

#[tokio::test]
async fn test_replay_from_revision() {
    let (client, _store) = setup();
    let r1 = client.put("key", "1", PutOptions::new()).await.unwrap();
    client.put("key", "2", PutOptions::new()).await.unwrap();

    let mut stream = client
        .watch(
            "key",
            WatchOptions::new()
                .with_start_revision(r1.revision)
                .with_prev_kv(),
        )
        .await
        .unwrap();
    client.put("key", "3", PutOptions::new()).await.unwrap();

    let values: Vec<String> = stream
        .by_ref()
        .take(3)
        .map(|e| e.unwrap().kv.value_str().into_owned())
        .collect()
        .await;
    assert_eq!(values, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_future_start_revision_holds_back_older_events() {
    let (client, store) = setup();
    client.put("key", "1", PutOptions::new()).await.unwrap();

    let start = store.revision() + 3;
    let mut stream = client
        .watch("key", WatchOptions::new().with_start_revision(start))
        .await
        .unwrap();

    // Revisions 2, 3 and 4; only the last reaches the start revision
    for value in ["2", "3", "4"] {
        client.put("key", value, PutOptions::new()).await.unwrap();
    }

    let event = stream.next_event().await.unwrap().unwrap();
    assert_eq!(event.revision(), start);
    assert_eq!(event.kv.value_str(), "4");
    assert!(
        tokio::time::timeout(Duration::from_millis(50), stream.next_event())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_store_loss_is_final_error() {
    let (client, store) = setup();
    let mut stream = client
        .watch("key", WatchOptions::new().with_prefix())
        .await
        .unwrap();

    store.disconnect();
    assert!(matches!(
        stream.next_event().await,
        Some(Err(Error::Unavailable(_)))
    ));
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn test_watch_after_disconnect_fails() {
    let (client, store) = setup();
    store.disconnect();
    assert!(matches!(
        client.watch("key", WatchOptions::new()).await,
        Err(Error::Unavailable(_))
    ));
}
