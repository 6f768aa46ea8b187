//! Store backends
//!
//! A backend carries etcd v3 requests to a store and hands back the raw
//! responses. Validation, deadlines and conversion into typed results live
//! in the client; backends only move messages.
//!
//! - [`grpc`] - a remote store over the etcd v3 gRPC API
//! - [`memory`] - an in-process MVCC store with the same semantics

pub mod grpc;
pub mod memory;

pub use grpc::GrpcBackend;
pub use memory::MemoryBackend;

use crate::common::Result;
use crate::proto;
use futures_util::Stream;
use std::pin::Pin;

/// Responses of one watch, in the order the store produced them
pub type WatchResponseStream = Pin<Box<dyn Stream<Item = Result<proto::WatchResponse>> + Send>>;

/// An established watch
pub struct WatchHandle {
    pub watch_id: i64,
    /// Ends when the store drops the watch; dropping it releases the
    /// subscription
    pub responses: WatchResponseStream,
}

/// Transport to a key-value coordination store
#[tonic::async_trait]
pub trait KvBackend: Send + Sync {
    async fn range(&self, req: proto::RangeRequest) -> Result<proto::RangeResponse>;

    async fn put(&self, req: proto::PutRequest) -> Result<proto::PutResponse>;

    async fn delete_range(&self, req: proto::DeleteRangeRequest)
        -> Result<proto::DeleteRangeResponse>;

    /// Open a watch; returns once the store has confirmed it, so every
    /// mutation applied afterwards is observed.
    async fn watch(&self, req: proto::WatchCreateRequest) -> Result<WatchHandle>;

    async fn lease_grant(&self, req: proto::LeaseGrantRequest) -> Result<proto::LeaseGrantResponse>;

    async fn lease_revoke(
        &self,
        req: proto::LeaseRevokeRequest,
    ) -> Result<proto::LeaseRevokeResponse>;

    async fn lease_time_to_live(
        &self,
        req: proto::LeaseTimeToLiveRequest,
    ) -> Result<proto::LeaseTimeToLiveResponse>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Error for a watch the store canceled
pub(crate) fn watch_canceled(resp: &proto::WatchResponse) -> crate::Error {
    if resp.compact_revision > 0 {
        crate::Error::RevisionOutOfRange(format!(
            "watch history compacted up to revision {}",
            resp.compact_revision
        ))
    } else if resp.cancel_reason.is_empty() {
        crate::Error::WatchCanceled(format!("watch {} canceled by the store", resp.watch_id))
    } else {
        crate::Error::WatchCanceled(resp.cancel_reason.clone())
    }
}
