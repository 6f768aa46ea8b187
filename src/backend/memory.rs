//! In-process MVCC store
//!
//! Keeps the full history of every key, a lease table and the open watches
//! behind one mutex. Mutations bump a global revision and feed watchers
//! while still holding the lock, so each watcher sees events in revision
//! order. Lease deadlines use the tokio clock: they are checked on every
//! request and by a background reaper so watchers see expiry deletes.
//!
//! Used by the test suite and by `coordkv --in-memory`. It has no
//! persistence and no compaction.

use crate::backend::{KvBackend, WatchHandle};
use crate::common::{key_in_range, Error, Result, FROM_KEY_END};
use crate::proto::{self, event::EventType, range_request, watch_create_request::FilterType};
use futures_util::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How often the reaper looks for expired leases
const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// One entry in a key's history
#[derive(Debug, Clone)]
enum Version {
    Live(proto::KeyValue),
    Tombstone { mod_revision: i64 },
}

impl Version {
    fn mod_revision(&self) -> i64 {
        match self {
            Version::Live(kv) => kv.mod_revision,
            Version::Tombstone { mod_revision } => *mod_revision,
        }
    }
}

#[derive(Debug)]
struct Lease {
    granted_ttl: i64,
    deadline: Instant,
    keys: BTreeSet<Vec<u8>>,
}

struct Watcher {
    id: i64,
    key: Vec<u8>,
    range_end: Vec<u8>,
    /// Events below this revision are never delivered
    start_revision: i64,
    prev_kv: bool,
    no_put: bool,
    no_delete: bool,
    tx: mpsc::UnboundedSender<proto::WatchResponse>,
}

impl Watcher {
    /// Events this watcher should see, shaped by its options
    fn select(&self, events: &[proto::Event]) -> Vec<proto::Event> {
        events
            .iter()
            .filter(|ev| {
                ev.kv
                    .as_ref()
                    .is_some_and(|kv| kv.mod_revision >= self.start_revision)
            })
            .filter(|ev| {
                let key = ev.kv.as_ref().map(|kv| kv.key.as_slice()).unwrap_or_default();
                key_in_range(key, &self.key, &self.range_end)
            })
            .filter(|ev| match EventType::try_from(ev.r#type) {
                Ok(EventType::Put) => !self.no_put,
                Ok(EventType::Delete) => !self.no_delete,
                Err(_) => false,
            })
            .map(|ev| {
                let mut ev = ev.clone();
                if !self.prev_kv {
                    ev.prev_kv = None;
                }
                ev
            })
            .collect()
    }
}

#[derive(Default)]
struct Store {
    revision: i64,
    history: BTreeMap<Vec<u8>, Vec<Version>>,
    leases: HashMap<i64, Lease>,
    watchers: Vec<Watcher>,
    next_watch_id: i64,
    closed: bool,
    latency: Duration,
}

impl Store {
    fn header(&self) -> Option<proto::ResponseHeader> {
        Some(proto::ResponseHeader {
            revision: self.revision,
            ..Default::default()
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Unavailable("in-memory store is disconnected".into()));
        }
        Ok(())
    }

    /// Latest live value of `key` at or before `revision`
    fn live_at(&self, key: &[u8], revision: i64) -> Option<&proto::KeyValue> {
        let versions = self.history.get(key)?;
        match versions.iter().rev().find(|v| v.mod_revision() <= revision) {
            Some(Version::Live(kv)) => Some(kv),
            _ => None,
        }
    }

    /// Keys in `[key, range_end)` that have any history
    fn keys_in_range<'a>(
        &'a self,
        key: &'a [u8],
        range_end: &'a [u8],
    ) -> impl Iterator<Item = &'a Vec<u8>> + 'a {
        let bounded = !range_end.is_empty() && range_end != FROM_KEY_END;
        self.history
            .range(key.to_vec()..)
            .map(|(k, _)| k)
            .take_while(move |k| {
                if range_end.is_empty() {
                    k.as_slice() == key
                } else if bounded {
                    k.as_slice() < range_end
                } else {
                    true
                }
            })
    }

    fn expire_leases(&mut self, now: Instant) {
        let mut expired: Vec<i64> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in expired {
            if let Some(lease) = self.leases.remove(&id) {
                tracing::debug!("Lease {:x} expired, deleting {} keys", id, lease.keys.len());
                self.delete_keys(lease.keys.into_iter().collect());
            }
        }
    }

    /// Delete live keys at one new revision, returning their last values
    fn delete_keys(&mut self, keys: Vec<Vec<u8>>) -> Vec<proto::KeyValue> {
        let current = self.revision;
        let doomed: Vec<proto::KeyValue> = keys
            .iter()
            .filter_map(|k| self.live_at(k, current).cloned())
            .collect();
        if doomed.is_empty() {
            return doomed;
        }

        self.revision += 1;
        let revision = self.revision;
        let mut events = Vec::with_capacity(doomed.len());
        for prev in &doomed {
            if prev.lease != 0 {
                if let Some(lease) = self.leases.get_mut(&prev.lease) {
                    lease.keys.remove(&prev.key);
                }
            }
            self.history
                .entry(prev.key.clone())
                .or_default()
                .push(Version::Tombstone {
                    mod_revision: revision,
                });
            events.push(proto::Event {
                r#type: EventType::Delete as i32,
                kv: Some(proto::KeyValue {
                    key: prev.key.clone(),
                    mod_revision: revision,
                    ..Default::default()
                }),
                prev_kv: Some(prev.clone()),
            });
        }
        self.notify(&events);
        doomed
    }

    /// Deliver one revision's events to every interested watcher
    fn notify(&mut self, events: &[proto::Event]) {
        let header = self.header();
        self.watchers.retain(|watcher| {
            let selected = watcher.select(events);
            if selected.is_empty() {
                return !watcher.tx.is_closed();
            }
            watcher
                .tx
                .send(proto::WatchResponse {
                    header: header.clone(),
                    watch_id: watcher.id,
                    events: selected,
                    ..Default::default()
                })
                .is_ok()
        });
    }

    /// Historical events in `[key, range_end)` from `start_revision`,
    /// grouped per revision in ascending order
    fn replay(&self, key: &[u8], range_end: &[u8], start_revision: i64) -> Vec<Vec<proto::Event>> {
        let mut by_revision: BTreeMap<i64, Vec<proto::Event>> = BTreeMap::new();
        for k in self.keys_in_range(key, range_end) {
            let Some(versions) = self.history.get(k) else {
                continue;
            };
            for (idx, version) in versions.iter().enumerate() {
                if version.mod_revision() < start_revision {
                    continue;
                }
                let prev_kv = idx
                    .checked_sub(1)
                    .and_then(|i| match &versions[i] {
                        Version::Live(kv) => Some(kv.clone()),
                        Version::Tombstone { .. } => None,
                    });
                let event = match version {
                    Version::Live(kv) => proto::Event {
                        r#type: EventType::Put as i32,
                        kv: Some(kv.clone()),
                        prev_kv,
                    },
                    Version::Tombstone { mod_revision } => proto::Event {
                        r#type: EventType::Delete as i32,
                        kv: Some(proto::KeyValue {
                            key: k.clone(),
                            mod_revision: *mod_revision,
                            ..Default::default()
                        }),
                        prev_kv,
                    },
                };
                by_revision
                    .entry(version.mod_revision())
                    .or_default()
                    .push(event);
            }
        }
        by_revision.into_values().collect()
    }
}

struct Shared {
    store: Mutex<Store>,
}

/// In-process store speaking the etcd v3 request model
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty store. Inside a tokio runtime this also starts the
    /// lease reaper, which stops once the last handle is dropped.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            store: Mutex::new(Store::default()),
        });
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(reap_leases(Arc::downgrade(&shared)));
        }
        Self { shared }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.shared
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait out the injected latency, then lock with expired leases applied
    async fn enter(&self) -> Result<MutexGuard<'_, Store>> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut store = self.lock();
        store.check_open()?;
        store.expire_leases(Instant::now());
        Ok(store)
    }

    /// Current store revision
    pub fn revision(&self) -> i64 {
        self.lock().revision
    }

    /// Number of watches still attached
    pub fn watcher_count(&self) -> usize {
        let mut store = self.lock();
        store.watchers.retain(|w| !w.tx.is_closed());
        store.watchers.len()
    }

    /// Number of live leases
    pub fn lease_count(&self) -> usize {
        let mut store = self.lock();
        store.expire_leases(Instant::now());
        store.leases.len()
    }

    /// Simulate losing the store: later requests fail `Unavailable` and
    /// every open watch stream ends.
    pub fn disconnect(&self) {
        let mut store = self.lock();
        store.closed = true;
        store.watchers.clear();
    }

    /// Undo [`disconnect`](Self::disconnect)
    pub fn reconnect(&self) {
        self.lock().closed = false;
    }

    /// Delay every request by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }
}

async fn reap_leases(shared: Weak<Shared>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut store = shared.store.lock().unwrap_or_else(PoisonError::into_inner);
        if !store.closed {
            store.expire_leases(Instant::now());
        }
    }
}

#[tonic::async_trait]
impl KvBackend for MemoryBackend {
    async fn range(&self, req: proto::RangeRequest) -> Result<proto::RangeResponse> {
        let store = self.enter().await?;

        let revision = if req.revision > 0 {
            if req.revision > store.revision {
                return Err(Error::RevisionOutOfRange(format!(
                    "mvcc: required revision {} is a future revision (current {})",
                    req.revision, store.revision
                )));
            }
            req.revision
        } else {
            store.revision
        };

        let mut kvs: Vec<proto::KeyValue> = store
            .keys_in_range(&req.key, &req.range_end)
            .filter_map(|k| store.live_at(k, revision).cloned())
            .collect();

        let target = range_request::SortTarget::try_from(req.sort_target)
            .unwrap_or(range_request::SortTarget::Key);
        let order = match range_request::SortOrder::try_from(req.sort_order)
            .unwrap_or(range_request::SortOrder::None)
        {
            // Keys already come out ascending
            range_request::SortOrder::None if target == range_request::SortTarget::Key => None,
            range_request::SortOrder::None => Some(range_request::SortOrder::Ascend),
            order => Some(order),
        };
        if let Some(order) = order {
            kvs.sort_by(|a, b| {
                let ordering = match target {
                    range_request::SortTarget::Key => a.key.cmp(&b.key),
                    range_request::SortTarget::Version => a.version.cmp(&b.version),
                    range_request::SortTarget::Create => a.create_revision.cmp(&b.create_revision),
                    range_request::SortTarget::Mod => a.mod_revision.cmp(&b.mod_revision),
                    range_request::SortTarget::Value => a.value.cmp(&b.value),
                };
                if order == range_request::SortOrder::Descend {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let count = kvs.len() as i64;
        let mut more = false;
        if req.limit > 0 && kvs.len() > req.limit as usize {
            kvs.truncate(req.limit as usize);
            more = true;
        }
        if req.count_only {
            kvs.clear();
        } else if req.keys_only {
            for kv in &mut kvs {
                kv.value.clear();
            }
        }

        Ok(proto::RangeResponse {
            header: store.header(),
            kvs,
            more,
            count,
        })
    }

    async fn put(&self, req: proto::PutRequest) -> Result<proto::PutResponse> {
        let mut store = self.enter().await?;
        if req.key.is_empty() {
            return Err(Error::InvalidArgument("key is not provided".into()));
        }
        if req.lease != 0 && !store.leases.contains_key(&req.lease) {
            return Err(Error::LeaseNotFound(req.lease));
        }

        let prev = store.live_at(&req.key, store.revision).cloned();
        store.revision += 1;
        let revision = store.revision;

        if let Some(prev) = &prev {
            if prev.lease != 0 && prev.lease != req.lease {
                if let Some(lease) = store.leases.get_mut(&prev.lease) {
                    lease.keys.remove(&req.key);
                }
            }
        }
        if let Some(lease) = store.leases.get_mut(&req.lease) {
            lease.keys.insert(req.key.clone());
        }

        let kv = proto::KeyValue {
            key: req.key.clone(),
            value: req.value,
            create_revision: prev.as_ref().map_or(revision, |p| p.create_revision),
            mod_revision: revision,
            version: prev.as_ref().map_or(1, |p| p.version + 1),
            lease: req.lease,
        };
        store
            .history
            .entry(req.key)
            .or_default()
            .push(Version::Live(kv.clone()));
        store.notify(&[proto::Event {
            r#type: EventType::Put as i32,
            kv: Some(kv),
            prev_kv: prev.clone(),
        }]);

        Ok(proto::PutResponse {
            header: store.header(),
            prev_kv: if req.prev_kv { prev } else { None },
        })
    }

    async fn delete_range(
        &self,
        req: proto::DeleteRangeRequest,
    ) -> Result<proto::DeleteRangeResponse> {
        let mut store = self.enter().await?;
        if req.key.is_empty() {
            return Err(Error::InvalidArgument("key is not provided".into()));
        }

        let keys: Vec<Vec<u8>> = store
            .keys_in_range(&req.key, &req.range_end)
            .cloned()
            .collect();
        let deleted = store.delete_keys(keys);

        Ok(proto::DeleteRangeResponse {
            header: store.header(),
            deleted: deleted.len() as i64,
            prev_kvs: if req.prev_kv { deleted } else { Vec::new() },
        })
    }

    async fn watch(&self, req: proto::WatchCreateRequest) -> Result<WatchHandle> {
        let mut store = self.enter().await?;
        if req.key.is_empty() {
            return Err(Error::InvalidArgument("key is not provided".into()));
        }

        store.next_watch_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Watcher {
            id: store.next_watch_id,
            key: req.key,
            range_end: req.range_end,
            start_revision: req.start_revision,
            prev_kv: req.prev_kv,
            no_put: req.filters.contains(&(FilterType::Noput as i32)),
            no_delete: req.filters.contains(&(FilterType::Nodelete as i32)),
            tx,
        };

        // Replayed history goes out before any live event
        if req.start_revision > 0 {
            let header = store.header();
            for events in store.replay(&watcher.key, &watcher.range_end, req.start_revision) {
                let selected = watcher.select(&events);
                if selected.is_empty() {
                    continue;
                }
                let _ = watcher.tx.send(proto::WatchResponse {
                    header: header.clone(),
                    watch_id: watcher.id,
                    events: selected,
                    ..Default::default()
                });
            }
        }

        let watch_id = watcher.id;
        store.watchers.push(watcher);
        tracing::debug!("Watch {} registered", watch_id);

        Ok(WatchHandle {
            watch_id,
            responses: Box::pin(UnboundedReceiverStream::new(rx).map(Ok::<_, Error>)),
        })
    }

    async fn lease_grant(&self, req: proto::LeaseGrantRequest) -> Result<proto::LeaseGrantResponse> {
        let mut store = self.enter().await?;
        if req.ttl <= 0 {
            return Err(Error::InvalidArgument(format!(
                "lease TTL must be positive, got {}",
                req.ttl
            )));
        }

        let deadline = u64::try_from(req.ttl)
            .ok()
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)))
            .ok_or_else(|| Error::InvalidArgument(format!("too large lease TTL: {}s", req.ttl)))?;

        let id = if req.id != 0 {
            if store.leases.contains_key(&req.id) {
                return Err(Error::InvalidArgument(format!("lease {:x} already exists", req.id)));
            }
            req.id
        } else {
            loop {
                let candidate = rand::random::<i64>() & i64::MAX;
                if candidate != 0 && !store.leases.contains_key(&candidate) {
                    break candidate;
                }
            }
        };

        store.leases.insert(
            id,
            Lease {
                granted_ttl: req.ttl,
                deadline,
                keys: BTreeSet::new(),
            },
        );
        tracing::debug!("Granted lease {:x} with TTL {}s", id, req.ttl);

        Ok(proto::LeaseGrantResponse {
            header: store.header(),
            id,
            ttl: req.ttl,
            error: String::new(),
        })
    }

    async fn lease_revoke(
        &self,
        req: proto::LeaseRevokeRequest,
    ) -> Result<proto::LeaseRevokeResponse> {
        let mut store = self.enter().await?;
        let lease = store
            .leases
            .remove(&req.id)
            .ok_or(Error::LeaseNotFound(req.id))?;
        store.delete_keys(lease.keys.into_iter().collect());

        Ok(proto::LeaseRevokeResponse {
            header: store.header(),
        })
    }

    async fn lease_time_to_live(
        &self,
        req: proto::LeaseTimeToLiveRequest,
    ) -> Result<proto::LeaseTimeToLiveResponse> {
        let store = self.enter().await?;
        let resp = match store.leases.get(&req.id) {
            Some(lease) => proto::LeaseTimeToLiveResponse {
                header: store.header(),
                id: req.id,
                ttl: lease
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs() as i64,
                granted_ttl: lease.granted_ttl,
                keys: if req.keys {
                    lease.keys.iter().cloned().collect()
                } else {
                    Vec::new()
                },
            },
            None => proto::LeaseTimeToLiveResponse {
                header: store.header(),
                id: req.id,
                ttl: -1,
                ..Default::default()
            },
        };
        Ok(resp)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
