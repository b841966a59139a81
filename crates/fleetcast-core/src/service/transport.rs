// Outbound transport used to talk to sibling nodes
// Selects plain or TLS HTTP from the node address and bounds every call with a timeout

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, header::CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{error::TransportError, model::DispatchConfig};

/// Response of a forwarded request
#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Contract over the HTTP client used to reach sibling nodes
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Send `body` as JSON to `address` with the given method
    async fn send(
        &self,
        address: &str,
        method: Method,
        body: &Value,
    ) -> Result<TransportResponse, TransportError>;

    /// GET `address` and return the response body
    async fn fetch(&self, address: &str) -> Result<String, TransportError>;
}

/// Parse a node address, accepting only `http` and `https`
pub fn parse_node_url(address: &str) -> Result<Url, TransportError> {
    let url = Url::parse(address).map_err(|e| TransportError::InvalidAddress {
        address: address.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(TransportError::BadScheme {
            address: address.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// reqwest-backed transport
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &DispatchConfig) -> reqwest::Result<Self> {
        Self::new(config.request_timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl NodeTransport for HttpTransport {
    async fn send(
        &self,
        address: &str,
        method: Method,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let url = parse_node_url(address)?;
        debug!(
            address,
            %method,
            secure = url.scheme() == "https",
            "Requesting node"
        );

        let response = self
            .client
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(address, self.timeout, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(address, self.timeout, e))?;

        Ok(TransportResponse { status, body })
    }

    async fn fetch(&self, address: &str) -> Result<String, TransportError> {
        let url = parse_node_url(address)?;
        debug!(address, secure = url.scheme() == "https", "Requesting a GET");

        let response = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(address, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(address, self.timeout, e))
    }
}

/// `send` bounded by `timeout` regardless of the transport implementation
pub async fn bounded_send(
    transport: &dyn NodeTransport,
    timeout: Duration,
    address: &str,
    method: Method,
    body: &Value,
) -> Result<TransportResponse, TransportError> {
    tokio::time::timeout(timeout, transport.send(address, method, body))
        .await
        .unwrap_or_else(|_| Err(TransportError::timeout(address, timeout)))
}

/// `fetch` bounded by `timeout` regardless of the transport implementation
pub async fn bounded_fetch(
    transport: &dyn NodeTransport,
    timeout: Duration,
    address: &str,
) -> Result<String, TransportError> {
    tokio::time::timeout(timeout, transport.fetch(address))
        .await
        .unwrap_or_else(|_| Err(TransportError::timeout(address, timeout)))
}
