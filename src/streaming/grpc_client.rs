use crate::error::ChannelError;
use crate::streaming::channel::FrameSink;
use anyhow::{Context, Result};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

pub const SERVICE_NAME: &str = "perception.v1.PerceptionStream";
const ANALYZE_PATH: &str = "/perception.v1.PerceptionStream/Analyze";

/// Wire messages of `perception.v1`, declared in source so the build needs no protoc.
pub mod proto {
    /// One compressed still. No envelope beyond the bytes.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VideoFrame {
        #[prost(bytes = "vec", tag = "1")]
        pub frame_data: ::prost::alloc::vec::Vec<u8>,
    }

    /// A partial state update; `document` is a JSON object with optional
    /// `metrics`, `skin_tone`, `landmarks` and `skin_roi` keys.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AnalysisUpdate {
        #[prost(string, tag = "1")]
        pub document: ::prost::alloc::string::String,
    }
}

pub struct PerceptionClient {
    // Kept so health checks can open their own connection
    url: String,
    inner: tonic::client::Grpc<Channel>,
}

impl PerceptionClient {
    pub async fn connect(url: String) -> Result<Self, ChannelError> {
        // TCP_NODELAY: frames are small and latency matters more than batching
        let channel = Endpoint::from_shared(url.clone())?
            .tcp_nodelay(true)
            .connect()
            .await?;

        Ok(Self {
            url,
            inner: tonic::client::Grpc::new(channel),
        })
    }

    /// Opens the bidirectional analysis stream. Returns the outbound frame sink
    /// and the inbound stream of JSON documents.
    pub async fn open_stream(
        &mut self,
    ) -> Result<(FrameSink, impl Stream<Item = Result<String, ChannelError>> + Send + 'static), ChannelError> {
        let (sink, rx) = FrameSink::pair();
        let outbound = ReceiverStream::new(rx).map(|frame| proto::VideoFrame { frame_data: frame.jpeg });

        self.inner.ready().await?;
        let codec: ProstCodec<proto::VideoFrame, proto::AnalysisUpdate> = ProstCodec::default();
        let path = PathAndQuery::from_static(ANALYZE_PATH);
        let response = self
            .inner
            .streaming(tonic::Request::new(outbound), path, codec)
            .await?;

        let inbound = response
            .into_inner()
            .map(|item| item.map(|update| update.document).map_err(ChannelError::from));
        Ok((sink, inbound))
    }

    /// Check health of the remote service using the standard gRPC Health Checking Protocol
    pub async fn check_health(&self) -> Result<bool> {
        let endpoint = Endpoint::from_shared(self.url.clone()).context("Invalid URL for health check")?;
        let channel = endpoint.connect().await.context("Failed to connect for health check")?;
        let mut health_client = tonic_health::pb::health_client::HealthClient::new(channel);

        let serving = tonic_health::pb::health_check_response::ServingStatus::Serving as i32;
        let request = tonic::Request::new(tonic_health::pb::HealthCheckRequest {
            service: SERVICE_NAME.to_string(),
        });

        match health_client.check(request).await {
            Ok(response) => Ok(response.into_inner().status == serving),
            Err(e) => {
                // Fall back to overall server health (empty service name)
                let request_all = tonic::Request::new(tonic_health::pb::HealthCheckRequest {
                    service: String::new(),
                });
                if let Ok(resp) = health_client.check(request_all).await {
                    return Ok(resp.into_inner().status == serving);
                }
                Err(anyhow::anyhow!("Health check failed: {}", e))
            }
        }
    }
}
