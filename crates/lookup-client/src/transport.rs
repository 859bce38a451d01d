//! # transport 模块说明
//!
//! 分发算法只依赖“把 JSON 字节 POST 到 URL，取回状态码与应答体”这一窄接口。
//! 明文或加密由 URL 的 scheme 决定；传输层失败时自动重试一次后才向上报告。

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::TransportError;

/// 一次 POST 的结果。`body` 在调用方不要求读取时为空。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// 发送 JSON 负载的传输接口。
///
/// # 契约说明（What）
/// - `body` 已是序列化好的 JSON；
/// - 实现需在传输层失败（连接、超时）时自行重试一次，仍失败才返回 `Err`；
/// - 非 200 状态码不是 `Err`，由调用方判定。
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn post(
        &self,
        url: &str,
        body: Bytes,
        read_body: bool,
    ) -> Result<TransportResponse, TransportError>;
}

/// HTTP 传输的构造参数。
#[derive(Clone, Debug)]
pub struct TransportSettings {
    /// 单次请求超时。
    pub timeout: Duration,
    /// 舰队内部 TLS 通常使用自签证书，默认不校验。
    pub accept_invalid_certs: bool,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
            pool_max_idle_per_host: 500,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// 基于 `reqwest` 的默认传输实现，`https` URL 上可协商 HTTP/2。
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self { client })
    }

    async fn send_once(&self, url: &str, body: Bytes) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        body: Bytes,
        read_body: bool,
    ) -> Result<TransportResponse, TransportError> {
        let response = match self.send_once(url, body.clone()).await {
            Ok(response) => response,
            Err(first) => {
                debug!(%url, error = %first, "request failed, retrying once");
                self.send_once(url, body)
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_owned(),
                        source,
                    })?
            }
        };

        let status = response.status().as_u16();
        if !read_body {
            return Ok(TransportResponse::new(status, Bytes::new()));
        }
        let body = response.bytes().await.map_err(|source| TransportError::Body {
            url: url.to_owned(),
            source,
        })?;
        Ok(TransportResponse::new(status, body))
    }
}
