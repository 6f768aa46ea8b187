//! etcd v3 gRPC backend
//!
//! Requests are encoded with prost and sent over a tonic [`Channel`] to the
//! first endpoint that accepts a connection within the dial deadline.

use crate::backend::{watch_canceled, KvBackend, WatchHandle};
use crate::common::{ClientConfig, Error, Result};
use crate::proto::{self, paths, watch_request::RequestUnion};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GrpcBackend {
    channel: Channel,
    endpoint: String,
}

impl GrpcBackend {
    /// Connect to the first reachable endpoint in `config.endpoints`
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let dial_timeout = config.dial_timeout();
        let mut failures = Vec::new();

        for raw in &config.endpoints {
            let url = endpoint_url(raw);
            let endpoint = Endpoint::from_shared(url.clone())
                .map_err(|e| Error::InvalidConfig(format!("invalid endpoint {}: {}", raw, e)))?
                .connect_timeout(dial_timeout)
                .tcp_nodelay(true)
                .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
                .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
                .keep_alive_while_idle(true);

            match tokio::time::timeout(dial_timeout, endpoint.connect()).await {
                Ok(Ok(channel)) => {
                    tracing::info!("Connected to {}", url);
                    return Ok(Self {
                        channel,
                        endpoint: url,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!("Endpoint {} unreachable: {}", url, e);
                    failures.push(format!("{}: {}", url, e));
                }
                Err(_) => {
                    tracing::warn!("Endpoint {} did not answer within {:?}", url, dial_timeout);
                    failures.push(format!("{}: dial timeout after {:?}", url, dial_timeout));
                }
            }
        }

        Err(Error::Unavailable(format!(
            "no reachable endpoint ({})",
            failures.join("; ")
        )))
    }

    /// URL of the connected endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn grpc(&self) -> Result<Grpc<Channel>> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Error::Unavailable(format!("{}: {}", self.endpoint, e)))?;
        Ok(grpc)
    }

    async fn unary<Req, Resp>(&self, req: Req, path: &'static str) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc().await?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(req),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }
}

#[tonic::async_trait]
impl KvBackend for GrpcBackend {
    async fn range(&self, req: proto::RangeRequest) -> Result<proto::RangeResponse> {
        self.unary(req, paths::KV_RANGE).await
    }

    async fn put(&self, req: proto::PutRequest) -> Result<proto::PutResponse> {
        self.unary(req, paths::KV_PUT).await
    }

    async fn delete_range(
        &self,
        req: proto::DeleteRangeRequest,
    ) -> Result<proto::DeleteRangeResponse> {
        self.unary(req, paths::KV_DELETE_RANGE).await
    }

    async fn watch(&self, req: proto::WatchCreateRequest) -> Result<WatchHandle> {
        let (requests, outbound) = mpsc::channel(4);
        requests
            .send(proto::WatchRequest {
                request_union: Some(RequestUnion::CreateRequest(req)),
            })
            .await
            .map_err(|_| Error::Internal("watch request channel closed".into()))?;

        let mut grpc = self.grpc().await?;
        let codec: ProstCodec<proto::WatchRequest, proto::WatchResponse> = ProstCodec::default();
        let response = grpc
            .streaming(
                tonic::Request::new(ReceiverStream::new(outbound)),
                PathAndQuery::from_static(paths::WATCH),
                codec,
            )
            .await?;
        let mut inbound = response.into_inner();

        let watch_id = loop {
            match inbound.message().await? {
                Some(resp) if resp.canceled => return Err(watch_canceled(&resp)),
                Some(resp) if resp.created => break resp.watch_id,
                Some(_) => continue,
                None => {
                    return Err(Error::Unavailable(
                        "watch stream closed before creation".into(),
                    ))
                }
            }
        };
        tracing::debug!("Watch {} created on {}", watch_id, self.endpoint);

        let responses = async_stream::stream! {
            // The request half stays open for as long as the stream lives
            let requests = requests;
            loop {
                match inbound.message().await {
                    Ok(Some(resp)) => yield Ok(resp),
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(Error::from(status));
                        break;
                    }
                }
            }
            drop(requests);
        };

        Ok(WatchHandle {
            watch_id,
            responses: Box::pin(responses),
        })
    }

    async fn lease_grant(&self, req: proto::LeaseGrantRequest) -> Result<proto::LeaseGrantResponse> {
        let resp: proto::LeaseGrantResponse = self.unary(req, paths::LEASE_GRANT).await?;
        if !resp.error.is_empty() {
            return Err(Error::InvalidArgument(resp.error));
        }
        Ok(resp)
    }

    async fn lease_revoke(
        &self,
        req: proto::LeaseRevokeRequest,
    ) -> Result<proto::LeaseRevokeResponse> {
        let id = req.id;
        self.unary(req, paths::LEASE_REVOKE)
            .await
            .map_err(|e| match e {
                Error::LeaseNotFound(0) => Error::LeaseNotFound(id),
                other => other,
            })
    }

    async fn lease_time_to_live(
        &self,
        req: proto::LeaseTimeToLiveRequest,
    ) -> Result<proto::LeaseTimeToLiveResponse> {
        self.unary(req, paths::LEASE_TIME_TO_LIVE).await
    }

    fn name(&self) -> &'static str {
        "grpc"
    }
}

/// Endpoints may be given as bare `host:port`
fn endpoint_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    }
}
