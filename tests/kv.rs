//! Put, get and delete through the client against the in-process store

use coordkv::client::{SortOrder, SortTarget};
use coordkv::{Client, ClientConfig, DeleteOptions, Error, GetOptions, MemoryBackend, PutOptions};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Client, MemoryBackend) {
    let store = MemoryBackend::new();
    let client = Client::with_backend(Arc::new(store.clone()), &ClientConfig::default());
    (client, store)
}

#[tokio::test]
async fn test_put_get_history() {
    let (client, _store) = setup();

    let r1 = client.put("key", "444", PutOptions::new()).await.unwrap();
    let r2 = client.put("key", "555", PutOptions::new()).await.unwrap();
    assert!(r2.revision > r1.revision);

    let latest = client.get("key", GetOptions::new()).await.unwrap();
    assert_eq!(latest.first_value(), Some(&b"555"[..]));
    assert_eq!(latest.kvs[0].version, 2);
    assert_eq!(latest.kvs[0].create_revision, r1.revision);
    assert_eq!(latest.kvs[0].mod_revision, r2.revision);

    let old = client
        .get("key", GetOptions::new().with_revision(r1.revision))
        .await
        .unwrap();
    assert_eq!(old.first_value(), Some(&b"444"[..]));
}

#[tokio::test]
async fn test_missing_key_is_empty_not_error() {
    let (client, _store) = setup();
    let resp = client.get("nothing", GetOptions::new()).await.unwrap();
    assert!(resp.is_empty());
    assert_eq!(resp.count, 0);
}

#[tokio::test]
async fn test_read_before_key_existed() {
    let (client, _store) = setup();
    let r1 = client.put("other", "x", PutOptions::new()).await.unwrap();
    client.put("key", "v", PutOptions::new()).await.unwrap();

    let resp = client
        .get("key", GetOptions::new().with_revision(r1.revision))
        .await
        .unwrap();
    assert!(resp.is_empty());
}

#[tokio::test]
async fn test_future_revision() {
    let (client, _store) = setup();
    client.put("key", "v", PutOptions::new()).await.unwrap();
    assert!(matches!(
        client.get("key", GetOptions::new().with_revision(100)).await,
        Err(Error::RevisionOutOfRange(_))
    ));
}

#[tokio::test]
async fn test_range_reads() {
    let (client, _store) = setup();
    for key in ["key_a", "key_b", "key_c", "kez", "other"] {
        client.put(key, key, PutOptions::new()).await.unwrap();
    }

    let prefix = client
        .get("key", GetOptions::new().with_prefix())
        .await
        .unwrap();
    let keys: Vec<_> = prefix.kvs.iter().map(|kv| kv.key_str().into_owned()).collect();
    assert_eq!(keys, vec!["key_a", "key_b", "key_c"]);

    let from = client
        .get("key_b", GetOptions::new().with_from_key())
        .await
        .unwrap();
    assert_eq!(from.kvs.len(), 4);

    let bounded = client
        .get("key_a", GetOptions::new().with_range_end("key_c"))
        .await
        .unwrap();
    assert_eq!(bounded.kvs.len(), 2);

    let limited = client
        .get(
            "key",
            GetOptions::new()
                .with_prefix()
                .with_limit(2)
                .with_sort(SortTarget::Key, SortOrder::Descend),
        )
        .await
        .unwrap();
    assert_eq!(limited.kvs[0].key, b"key_c");
    assert!(limited.more);
    assert_eq!(limited.count, 3);

    let counted = client
        .get("key", GetOptions::new().with_prefix().with_count_only())
        .await
        .unwrap();
    assert!(counted.kvs.is_empty());
    assert_eq!(counted.count, 3);

    let keys_only = client
        .get("key", GetOptions::new().with_prefix().with_keys_only())
        .await
        .unwrap();
    assert!(keys_only.kvs.iter().all(|kv| kv.value.is_empty()));
}

#[tokio::test]
async fn test_from_key_paging_by_hand() {
    let (client, _store) = setup();
    for i in 0..30 {
        client
            .put(format!("key_{:02}", i), i.to_string(), PutOptions::new())
            .await
            .unwrap();
    }

    let first = client
        .get("key", GetOptions::new().with_prefix().with_limit(10))
        .await
        .unwrap();
    let last = first.kvs.last().unwrap().key_str().into_owned();
    assert_eq!(last, "key_09");
    assert!(first.more);

    // Restart at the last key, inclusive; its entry comes back first
    let next = client
        .get(last.as_str(), GetOptions::new().with_from_key().with_limit(10))
        .await
        .unwrap();
    assert_eq!(next.kvs[0].key_str(), "key_09");
    let fresh: Vec<_> = next.kvs[1..]
        .iter()
        .map(|kv| kv.key_str().into_owned())
        .collect();
    assert_eq!(fresh.len(), 9);
    assert_eq!(fresh.first().unwrap(), "key_10");
    assert_eq!(fresh.last().unwrap(), "key_18");
    assert!(next.more);
}

#[tokio::test]
async fn test_delete_prefix() {
    let (client, store) = setup();
    for i in 0..5 {
        client
            .put(format!("key_{}", i), "v", PutOptions::new())
            .await
            .unwrap();
    }
    client.put("other", "v", PutOptions::new()).await.unwrap();
    let before = store.revision();

    let resp = client
        .delete("key", DeleteOptions::new().with_prefix())
        .await
        .unwrap();
    assert_eq!(resp.deleted, 5);
    assert_eq!(resp.revision, before + 1);

    assert!(client
        .get("key", GetOptions::new().with_prefix())
        .await
        .unwrap()
        .is_empty());
    assert!(!client.get("other", GetOptions::new()).await.unwrap().is_empty());

    // Nothing to delete leaves the revision alone
    let resp = client.delete("key_0", DeleteOptions::new()).await.unwrap();
    assert_eq!(resp.deleted, 0);
    assert_eq!(store.revision(), before + 1);
}

#[tokio::test]
async fn test_invalid_argument() {
    let (client, _store) = setup();
    assert!(matches!(
        client.put("", "v", PutOptions::new()).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        client.get("", GetOptions::new()).await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded() {
    let (client, store) = setup();
    store.set_latency(Duration::from_secs(5));

    let client = client.with_timeout(Duration::from_millis(100));
    let err = client.put("key", "v", PutOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded(_)));
    assert!(err.is_retryable());
    assert_eq!(store.revision(), 0);
}

#[tokio::test]
async fn test_unavailable_after_disconnect() {
    let (client, store) = setup();
    client.put("key", "v", PutOptions::new()).await.unwrap();

    store.disconnect();
    assert!(matches!(
        client.get("key", GetOptions::new()).await,
        Err(Error::Unavailable(_))
    ));
    assert!(matches!(
        client.put("key", "w", PutOptions::new()).await,
        Err(Error::Unavailable(_))
    ));

    store.reconnect();
    let resp = client.get("key", GetOptions::new()).await.unwrap();
    assert_eq!(resp.first_value(), Some(&b"v"[..]));
}

#[tokio::test]
async fn test_clones_share_the_store() {
    let (client, _store) = setup();
    let other = client.clone();
    let writer = tokio::spawn(async move {
        for i in 0..20 {
            other
                .put(format!("key_{:02}", i), "v", PutOptions::new())
                .await
                .unwrap();
        }
    });
    writer.await.unwrap();

    let resp = client
        .get("key", GetOptions::new().with_prefix().with_count_only())
        .await
        .unwrap();
    assert_eq!(resp.count, 20);
}
