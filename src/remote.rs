//! Remote Transformation Service client.
//!
//! One operation: `GET {base}/html-graphs/{command}/?url={target}` plus the
//! optional rating and model parameters, authenticated with a configured
//! header pair. Transport failures never escape as errors; they become a
//! non-success [`RemoteCommandResult`] the pipeline treats exactly like a
//! legitimate non-2xx response.

use crate::command::{ContentKind, RemoteCommandRequest};
use crate::config::RemoteConfig;
use crate::constants::REMOTE_GRAPH_PATH;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Outcome of one remote command call (or a synthetic cache hit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCommandResult {
    pub status_code: u16,
    pub content_type: ContentKind,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl RemoteCommandResult {
    /// A call that never produced an HTTP response: timeout, refused
    /// connection, unresolvable host.
    pub fn transport_failure(status_code: u16, message: String) -> Self {
        Self {
            status_code,
            content_type: ContentKind::Unknown,
            body: String::new(),
            headers: Vec::new(),
            success: false,
            error_message: Some(message),
        }
    }

    /// A synthetic 200 built from cached content.
    pub fn from_cache(body: String, content_type: ContentKind) -> Self {
        Self {
            status_code: 200,
            content_type,
            body,
            headers: Vec::new(),
            success: true,
            error_message: None,
        }
    }
}

/// Seam between the cache-aside integrator and the wire. Production uses
/// [`HttpTransport`]; tests count calls through a mock.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn fetch(&self, request: &RemoteCommandRequest) -> RemoteCommandResult;
}

pub struct HttpTransport {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    fn build_url(&self, request: &RemoteCommandRequest) -> std::result::Result<Url, String> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| format!("invalid remote base URL {:?}: {}", self.config.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("remote base URL {:?} cannot be a base", self.config.base_url))?
            .pop_if_empty()
            .extend([REMOTE_GRAPH_PATH, request.command.spelling(), ""]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("url", &request.target_url);
            if let Some(rating) = request.rating {
                pairs.append_pair("rating", &rating.to_string());
            }
            if let Some(model) = &request.model_override {
                pairs.append_pair("model_to_use", model);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn fetch(&self, request: &RemoteCommandRequest) -> RemoteCommandResult {
        let url = match self.build_url(request) {
            Ok(u) => u,
            Err(e) => {
                tracing::error!("[REMOTE] Could not build request URL: {}", e);
                return RemoteCommandResult::transport_failure(502, e);
            }
        };

        tracing::info!(
            "[⚙️  -> ☁️ ] GET {} for {}",
            request.command.spelling(),
            request.target_url
        );

        let response = match self
            .client
            .get(url)
            .header(&self.config.auth_header, &self.config.auth_secret)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let status = if e.is_timeout() { 504 } else { 502 };
                tracing::warn!("[☁️  -> ⚙️ ] Transport error: {}", e);
                return RemoteCommandResult::transport_failure(status, e.to_string());
            }
        };

        let status_code = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let header_kind = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ContentKind::from_mime);
        // The command table is the fallback when the remote omits or sends
        // an unrecognized Content-Type.
        let content_type = match header_kind {
            Some(ContentKind::Unknown) | None => request.command.content_type(),
            Some(kind) => kind,
        };

        let raw_body = match response.bytes().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!("[☁️  -> ⚙️ ] Failed to read body: {}", e);
                return RemoteCommandResult::transport_failure(502, e.to_string());
            }
        };

        let body = if content_type == ContentKind::Json {
            pretty_print_json(&raw_body)
        } else {
            raw_body
        };

        let success = status_code == 200;
        tracing::info!(
            "[☁️  -> ⚙️ ] Status: {} | Body: {} chars",
            status_code,
            body.len()
        );

        RemoteCommandResult {
            status_code,
            content_type,
            body,
            headers,
            success,
            error_message: if success {
                None
            } else {
                Some(format!("remote service returned status {}", status_code))
            },
        }
    }
}

/// JSON bodies are normalized to pretty-printed form before caching and
/// serving; anything that does not parse is passed through untouched.
pub fn pretty_print_json(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(e) => {
            tracing::debug!("[REMOTE] JSON body did not parse ({}), passing through", e);
            raw.to_string()
        }
    }
}
