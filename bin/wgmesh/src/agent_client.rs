//! HTTP client for the local agent socket.
//!
//! Drives a plain HTTP/1 connection over the agent's Unix domain socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Method, Request};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::UnixStream;

use wgmesh_service::rpc::agent::{
    MemberInfo, MeshInfo, RttInfo, TagPair, TagRequest, TagResult, WaitRequest, WaitResponse,
};

/// Client for one agent socket.
pub struct AgentClient {
    socket_path: PathBuf,
}

impl AgentClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn request<Resp: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Resp> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("cannot connect to {}", self.socket_path.display()))?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
            .await
            .context("agent handshake failed")?;
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "wgmesh-agent");
        let request = match body {
            Some(bytes) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                builder.body(Full::new(Bytes::from(bytes)))?
            }
            None => builder.body(Full::new(Bytes::new()))?,
        };

        let response = sender
            .send_request(request)
            .await
            .context("agent request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("agent returned {}", response.status());
        }

        let bytes = response.into_body().collect().await?.to_bytes();
        serde_json::from_slice(&bytes).context("unable to decode agent response")
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).context("unable to encode request")
    }

    pub async fn info(&self) -> Result<MeshInfo> {
        self.request(Method::GET, "/v1/info", None).await
    }

    pub async fn nodes(&self) -> Result<Vec<MemberInfo>> {
        self.request(Method::GET, "/v1/nodes", None).await
    }

    pub async fn wait_for_change(&self, timeout_secs: u64) -> Result<WaitResponse> {
        self.request(
            Method::POST,
            "/v1/wait",
            Some(Self::encode(&WaitRequest { timeout_secs })?),
        )
        .await
    }

    pub async fn tag(&self, key: &str, value: &str) -> Result<TagResult> {
        self.request(
            Method::POST,
            "/v1/tags",
            Some(Self::encode(&TagRequest {
                key: key.into(),
                value: value.into(),
            })?),
        )
        .await
    }

    pub async fn untag(&self, key: &str) -> Result<TagResult> {
        self.request(Method::DELETE, &format!("/v1/tags/{}", key), None)
            .await
    }

    pub async fn tags(&self) -> Result<Vec<TagPair>> {
        self.request(Method::GET, "/v1/tags", None).await
    }

    pub async fn rtt(&self) -> Result<Vec<RttInfo>> {
        self.request(Method::GET, "/v1/rtt", None).await
    }
}
