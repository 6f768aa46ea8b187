//! Coordination client
//!
//! [`Client`] is the typed entry point over a [`KvBackend`]: it validates
//! requests, applies the request deadline, and converts wire responses into
//! the types in [`types`]. It keeps no state of its own beyond the backend
//! handle, so clones are cheap and can be passed to any task.
//!
//! The client never retries. Every failure comes back as an [`Error`] for
//! the caller to act on.

pub mod options;
pub mod pager;
pub mod types;
pub mod watch;

pub use options::{DeleteOptions, GetOptions, KeyRange, PutOptions, SortOrder, SortTarget, WatchOptions};
pub use pager::Pager;
pub use types::{
    DeleteResponse, EventKind, GetResponse, KeyValue, LeaseGrant, LeaseId, LeaseTtl, PutResponse,
    Revision, WatchEvent,
};
pub use watch::WatchStream;

use crate::backend::{GrpcBackend, KvBackend, MemoryBackend};
use crate::common::{display_bytes, validate_key, ClientConfig, Error, Result};
use crate::proto::{self, watch_create_request::FilterType};
use options::validate_revision;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Longest lease TTL a store accepts, in seconds
pub const MAX_LEASE_TTL: i64 = 9_000_000_000;

#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn KvBackend>,
    request_timeout: Duration,
    watch_buffer: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend.name())
            .field("request_timeout", &self.request_timeout)
            .field("watch_buffer", &self.watch_buffer)
            .finish()
    }
}

impl Client {
    /// Connect to the store endpoints in `config`
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let backend = GrpcBackend::connect(config).await?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Client over a fresh in-process store
    pub fn in_memory(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_backend(Arc::new(MemoryBackend::new()), config))
    }

    pub fn with_backend(backend: Arc<dyn KvBackend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            request_timeout: config.request_timeout(),
            watch_buffer: config.watch_buffer.max(1),
        }
    }

    /// Same client, with a different deadline for each request
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            request_timeout: timeout,
            ..self.clone()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run `fut` under the request deadline. Dropping the future on expiry
    /// cancels the in-flight call.
    async fn deadline<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::DeadlineExceeded(format!(
                "{} did not complete within {:?}",
                op, self.request_timeout
            ))),
        }
    }

    /// Create or overwrite `key`
    pub async fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        options: PutOptions,
    ) -> Result<PutResponse> {
        let key = key.into();
        let value = value.into();
        validate_key(&key)?;
        tracing::debug!("put {} ({} bytes)", display_bytes(&key), value.len());

        let req = proto::PutRequest {
            key,
            value,
            lease: options.lease.map(|l| l.get()).unwrap_or_default(),
            prev_kv: options.prev_kv,
        };
        let resp = self.deadline("put", self.backend.put(req)).await?;
        Ok(PutResponse {
            revision: proto::header_revision(&resp.header),
            prev_kv: resp.prev_kv.map(Into::into),
        })
    }

    /// Read a key or a range. Nothing matching is an empty result, not an
    /// error.
    pub async fn get(&self, key: impl Into<Vec<u8>>, options: GetOptions) -> Result<GetResponse> {
        let key = key.into();
        let (key, range_end) = options.range.resolve(key)?;
        let revision = validate_revision(options.revision)?;
        let limit = i64::try_from(options.limit)
            .map_err(|_| Error::InvalidArgument(format!("limit {} too large", options.limit)))?;
        tracing::debug!(
            "get {} (range end {:?}, limit {}, revision {})",
            display_bytes(&key),
            display_bytes(&range_end),
            limit,
            revision
        );

        let req = proto::RangeRequest {
            key,
            range_end,
            limit,
            revision,
            sort_order: proto::range_request::SortOrder::from(options.sort_order) as i32,
            sort_target: proto::range_request::SortTarget::from(options.sort_target) as i32,
            serializable: options.serializable,
            keys_only: options.keys_only,
            count_only: options.count_only,
        };
        let resp = self.range(req).await?;
        Ok(GetResponse {
            revision: proto::header_revision(&resp.header),
            kvs: resp.kvs.into_iter().map(Into::into).collect(),
            more: resp.more,
            count: resp.count,
        })
    }

    pub(crate) async fn range(&self, req: proto::RangeRequest) -> Result<proto::RangeResponse> {
        self.deadline("get", self.backend.range(req)).await
    }

    /// Page through a range in key order; see [`Pager`]
    pub fn paginate(&self, key: impl Into<Vec<u8>>, options: GetOptions) -> Result<Pager> {
        Pager::new(self.clone(), key.into(), options)
    }

    /// Delete a key or a range
    pub async fn delete(
        &self,
        key: impl Into<Vec<u8>>,
        options: DeleteOptions,
    ) -> Result<DeleteResponse> {
        let (key, range_end) = options.range.resolve(key.into())?;
        tracing::debug!(
            "delete {} (range end {:?})",
            display_bytes(&key),
            display_bytes(&range_end)
        );

        let req = proto::DeleteRangeRequest {
            key,
            range_end,
            prev_kv: options.prev_kv,
        };
        let resp = self.deadline("delete", self.backend.delete_range(req)).await?;
        Ok(DeleteResponse {
            deleted: resp.deleted,
            revision: proto::header_revision(&resp.header),
            prev_kvs: resp.prev_kvs.into_iter().map(Into::into).collect(),
        })
    }

    /// Subscribe to changes of a key or a range
    ///
    /// Returns once the store has confirmed the watch: every mutation
    /// applied after this call returns is delivered on the stream.
    pub async fn watch(
        &self,
        key: impl Into<Vec<u8>>,
        options: WatchOptions,
    ) -> Result<WatchStream> {
        let (key, range_end) = options.range.resolve(key.into())?;
        let start_revision = validate_revision(options.start_revision)?;

        let mut filters = Vec::new();
        if options.no_put {
            filters.push(FilterType::Noput as i32);
        }
        if options.no_delete {
            filters.push(FilterType::Nodelete as i32);
        }
        tracing::debug!(
            "watch {} (range end {:?}, start revision {})",
            display_bytes(&key),
            display_bytes(&range_end),
            start_revision
        );

        let req = proto::WatchCreateRequest {
            key,
            range_end,
            start_revision,
            filters,
            prev_kv: options.prev_kv,
            ..Default::default()
        };
        let handle = self.deadline("watch", self.backend.watch(req)).await?;
        Ok(WatchStream::spawn(handle, self.watch_buffer))
    }

    /// Grant a lease that expires `ttl_secs` seconds from now unless
    /// refreshed
    pub async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseGrant> {
        if ttl_secs <= 0 {
            return Err(Error::InvalidArgument(format!(
                "lease TTL must be positive, got {}",
                ttl_secs
            )));
        }
        if ttl_secs > MAX_LEASE_TTL {
            return Err(Error::InvalidArgument(format!(
                "too large lease TTL: {}s (max {}s)",
                ttl_secs, MAX_LEASE_TTL
            )));
        }
        let req = proto::LeaseGrantRequest {
            ttl: ttl_secs,
            id: 0,
        };
        let resp = self.deadline("lease grant", self.backend.lease_grant(req)).await?;
        tracing::debug!("granted lease {:x} (ttl {}s)", resp.id, resp.ttl);
        Ok(LeaseGrant {
            id: LeaseId::new(resp.id),
            ttl: resp.ttl,
        })
    }

    /// Revoke a lease, deleting every key attached to it
    pub async fn revoke_lease(&self, id: LeaseId) -> Result<Revision> {
        let req = proto::LeaseRevokeRequest { id: id.get() };
        let resp = self
            .deadline("lease revoke", self.backend.lease_revoke(req))
            .await?;
        Ok(proto::header_revision(&resp.header))
    }

    /// Remaining lifetime of a lease, optionally with its attached keys
    pub async fn lease_time_to_live(&self, id: LeaseId, with_keys: bool) -> Result<LeaseTtl> {
        let req = proto::LeaseTimeToLiveRequest {
            id: id.get(),
            keys: with_keys,
        };
        let resp = self
            .deadline("lease time-to-live", self.backend.lease_time_to_live(req))
            .await?;
        Ok(LeaseTtl {
            id,
            ttl: resp.ttl,
            granted_ttl: resp.granted_ttl,
            keys: resp.keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (Client, MemoryBackend) {
        let store = MemoryBackend::new();
        let client = Client::with_backend(Arc::new(store.clone()), &ClientConfig::default());
        (client, store)
    }

    #[tokio::test]
    async fn test_empty_key_rejected_before_the_store() {
        let (client, store) = client();
        assert!(matches!(
            client.put("", "v", PutOptions::new()).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get("", GetOptions::new()).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.delete("", DeleteOptions::new()).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let (client, _store) = client();
        assert!(matches!(
            client.get("key", GetOptions::new().with_revision(0)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get("key", GetOptions::new().with_limit(u64::MAX)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.grant_lease(0).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client
                .watch("key", WatchOptions::new().with_start_revision(-1))
                .await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_prefix_covers_everything() {
        let (client, _store) = client();
        client.put("a", "1", PutOptions::new()).await.unwrap();
        client.put("z", "2", PutOptions::new()).await.unwrap();
        let resp = client.get("", GetOptions::new().with_prefix()).await.unwrap();
        assert_eq!(resp.kvs.len(), 2);
    }

    #[tokio::test]
    async fn test_prev_kv() {
        let (client, _store) = client();
        client.put("key", "old", PutOptions::new()).await.unwrap();
        let resp = client
            .put("key", "new", PutOptions::new().with_prev_kv())
            .await
            .unwrap();
        assert_eq!(resp.prev_kv.unwrap().value, b"old");

        let resp = client
            .delete("key", DeleteOptions::new().with_prev_kv())
            .await
            .unwrap();
        assert_eq!(resp.deleted, 1);
        assert_eq!(resp.prev_kvs[0].value, b"new");
    }

    #[tokio::test]
    async fn test_debug_names_backend() {
        let (client, _store) = client();
        assert!(format!("{:?}", client).contains("memory"));
        assert_eq!(
            client.with_timeout(Duration::from_millis(5)).request_timeout(),
            Duration::from_millis(5)
        );
    }
}
