//! Consul HTTP client.
//!
//! # Rust Learning Note
//!
//! Same shape as any hyper client: build a `Request`, send it through a
//! pooled `Client`, collect the body, decode JSON with serde.
//!
//! ```rust,ignore
//! let resp = self.client.request(req).await?;
//! let bytes = resp.into_body().collect().await?.to_bytes();
//! let entries: Vec<KvEntry> = serde_json::from_slice(&bytes)?;
//! ```
//!
//! The only Consul specific parts are the blocking-query parameters
//! (`index`, `wait`) and the `X-Consul-Index` response header.
//!
//! ## Error mapping
//!
//! - connection failures and 5xx answers become [`Error::TransientRegistry`]
//! - other non-success answers become [`Error::Registry`]
//! - a 404 on a KV listing is not an error: the prefix is simply empty

use crate::client::{RegistryClient, RegistryConnector};
use crate::types::{KvPair, ListResponse, QueryOptions, ServiceRegistration, WriteMeta};
use crate::wire::{AgentServiceRegistration, KvEntry, INDEX_HEADER, TOKEN_HEADER};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use sable_common::serde_ext::format_duration;
use sable_common::{Error, InstanceId, Result};
use std::time::Instant;
use tracing::debug;
use url::Url;

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8500";

/// Consul agent client.
pub struct ConsulClient {
    /// Agent base URL (e.g. "http://127.0.0.1:8500").
    base_url: Url,

    /// ACL token, sent as `X-Consul-Token` when present.
    token: Option<String>,

    /// Hyper HTTP client (reusable, pooled connections).
    client: Client<HttpConnector, Full<Bytes>>,
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ConsulClient {
    pub fn new(base_url: Url) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();

        Self {
            base_url,
            token: None,
            client,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/v1/{segments...}`, each segment percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::validation(format!("Registry address cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn kv_url(&self, prefix: &str, options: &QueryOptions) -> Result<Url> {
        let mut segments = vec!["kv"];
        segments.extend(prefix.trim_start_matches('/').split('/'));
        let mut url = self.endpoint(segments)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("recurse", "true");
            if let Some(index) = options.wait_index {
                query.append_pair("index", &index.to_string());
            }
            if let Some(wait) = options.wait_time {
                query.append_pair("wait", &format_duration(wait));
            }
        }

        Ok(url)
    }

    async fn send(&self, operation: &str, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<RawResponse> {
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| Error::Protocol(format!("Invalid URI: {}", e)))?;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(Full::new(body.map(Bytes::from).unwrap_or_default()))
            .map_err(|e| Error::Protocol(format!("Failed to build request: {}", e)))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::transient(operation, e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::transient(operation, format!("Failed to read response: {}", e)))?
            .to_bytes();

        Ok(RawResponse { status, headers, body })
    }
}

/// Maps a non-success answer to an error.
fn status_error(operation: &str, status: StatusCode, body: &[u8]) -> Error {
    let detail = String::from_utf8_lossy(body);
    let reason = if detail.trim().is_empty() {
        format!("Registry returned status: {}", status)
    } else {
        format!("Registry returned status: {} ({})", status, detail.trim())
    };

    if status.is_server_error() {
        Error::transient(operation, reason)
    } else {
        Error::Registry(format!("{}: {}", operation, reason))
    }
}

fn parse_index(headers: &HeaderMap) -> Result<u64> {
    let value = headers
        .get(INDEX_HEADER)
        .ok_or_else(|| Error::Protocol(format!("Missing {} header", INDEX_HEADER)))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| Error::Protocol(format!("Invalid {} header: {:?}", INDEX_HEADER, value)))
}

#[async_trait]
impl RegistryClient for ConsulClient {
    async fn list(&self, prefix: &str, options: &QueryOptions) -> Result<ListResponse> {
        let url = self.kv_url(prefix, options)?;
        debug!("Listing prefix '{}' (index={:?})", prefix, options.wait_index);

        let started = Instant::now();
        let resp = self.send("list", Method::GET, url, None).await?;

        let entries = match resp.status {
            StatusCode::NOT_FOUND => Vec::new(),
            status if status.is_success() => {
                let wire: Vec<KvEntry> = serde_json::from_slice(&resp.body)
                    .map_err(|e| Error::Protocol(format!("Failed to parse JSON: {}", e)))?;
                wire.into_iter().map(KvEntry::decode).collect::<Result<Vec<KvPair>>>()?
            }
            status => return Err(status_error("list", status, &resp.body)),
        };
        let last_index = parse_index(&resp.headers)?;

        debug!("Listed {} keys under '{}' at index {}", entries.len(), prefix, last_index);

        Ok(ListResponse {
            last_index,
            entries,
            request_time: started.elapsed(),
        })
    }

    async fn service_register(&self, registration: &ServiceRegistration) -> Result<WriteMeta> {
        let url = self.endpoint(["agent", "service", "register"])?;
        debug!("Registering service instance {}", registration.id);

        let body = serde_json::to_vec(&AgentServiceRegistration::from(registration))
            .map_err(|e| Error::Protocol(format!("Failed to serialize request: {}", e)))?;

        let started = Instant::now();
        let resp = self.send("register", Method::PUT, url, Some(body)).await?;
        if !resp.status.is_success() {
            return Err(status_error("register", resp.status, &resp.body));
        }

        debug!("Successfully registered {}", registration.id);
        Ok(WriteMeta {
            request_time: started.elapsed(),
        })
    }

    async fn service_deregister(&self, instance_id: &InstanceId) -> Result<WriteMeta> {
        let url = self.endpoint(["agent", "service", "deregister", instance_id.as_str()])?;
        debug!("Deregistering service instance {}", instance_id);

        let started = Instant::now();
        let resp = self.send("deregister", Method::PUT, url, None).await?;
        if !resp.status.is_success() {
            return Err(status_error("deregister", resp.status, &resp.body));
        }

        debug!("Successfully deregistered {}", instance_id);
        Ok(WriteMeta {
            request_time: started.elapsed(),
        })
    }
}

/// Connects [`ConsulClient`]s.
#[derive(Debug, Clone, Default)]
pub struct ConsulConnector {
    token: Option<String>,
}

impl ConsulConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Option<String>) -> Self {
        Self { token }
    }
}

impl RegistryConnector for ConsulConnector {
    fn connect(&self, address: Option<&Url>) -> Result<Box<dyn RegistryClient>> {
        let url = match address {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_ADDRESS)
                .map_err(|e| Error::Internal(format!("Invalid default registry address: {}", e)))?,
        };
        debug!("Connecting registry client to {}", url);
        Ok(Box::new(ConsulClient::new(url).with_token(self.token.clone())))
    }
}
