//! Flow object boundary.
//!
//! The intercepting-proxy host owns the real exchange; the engine only sees
//! it through [`FlowExchange`]: readable request/response snapshots and a
//! mutable response to write back. The bundled [`SerializedFlow`] is the
//! JSON shape the hook shims post to the control plane.

use crate::types::FlowId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Readable request half of one intercepted exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub scheme: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub query_string: String,
}

impl RequestSnapshot {
    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reconstructs the target URL of the exchange. Default ports are
    /// elided so the cache key stays stable across equivalent spellings.
    pub fn target_url(&self) -> String {
        let default_port = match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        };
        if self.port == default_port {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
        }
    }
}

/// Response half: what the host currently plans to send downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

/// The engine's only window onto the host's exchange object. Accessors
/// return `Err` with a message instead of panicking so the pipeline can
/// contain a misbehaving host object.
pub trait FlowExchange: Send {
    fn flow_id(&self) -> FlowId;
    fn extract_request(&self) -> std::result::Result<RequestSnapshot, String>;
    fn extract_response(&self) -> std::result::Result<ResponseSnapshot, String>;
    fn apply_status(&mut self, status: u16) -> std::result::Result<(), String>;
    fn apply_headers(&mut self, headers: &[(String, String)]) -> std::result::Result<(), String>;
    fn apply_body(&mut self, body: &str) -> std::result::Result<(), String>;
}

fn generated_flow_id() -> String {
    Uuid::new_v4().to_string()
}

/// JSON-serialized exchange as posted by the hook shims. Applying writes
/// back into the same structure, which the handler returns to the shim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedFlow {
    #[serde(default = "generated_flow_id")]
    pub flow_id: String,
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
}

impl FlowExchange for SerializedFlow {
    fn flow_id(&self) -> FlowId {
        FlowId(self.flow_id.clone())
    }

    fn extract_request(&self) -> std::result::Result<RequestSnapshot, String> {
        Ok(self.request.clone())
    }

    fn extract_response(&self) -> std::result::Result<ResponseSnapshot, String> {
        Ok(self.response.clone())
    }

    fn apply_status(&mut self, status: u16) -> std::result::Result<(), String> {
        self.response.status = status;
        Ok(())
    }

    fn apply_headers(&mut self, headers: &[(String, String)]) -> std::result::Result<(), String> {
        self.response.headers = headers.to_vec();
        Ok(())
    }

    fn apply_body(&mut self, body: &str) -> std::result::Result<(), String> {
        self.response.body = body.to_string();
        Ok(())
    }
}

/// Outcome of the Extract stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub error: Option<String>,
    pub flow_id: FlowId,
}

impl ExtractionResult {
    pub fn ok(flow_id: FlowId) -> Self {
        Self {
            success: true,
            error: None,
            flow_id,
        }
    }

    pub fn failed(flow_id: FlowId, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            flow_id,
        }
    }
}

/// Outcome of the Apply stage: which parts landed and what was changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub success: bool,
    pub error: Option<String>,
    pub flow_id: FlowId,
    pub status_applied: bool,
    pub headers_applied: usize,
    pub body_applied: bool,
    pub body_bytes: usize,
    /// Human-readable log of what the pipeline changed, for observability
    /// and tests.
    pub modifications: Vec<String>,
}

impl ApplicationResult {
    pub fn new(flow_id: FlowId) -> Self {
        Self {
            success: true,
            error: None,
            flow_id,
            status_applied: false,
            headers_applied: 0,
            body_applied: false,
            body_bytes: 0,
            modifications: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestSnapshot {
        RequestSnapshot {
            method: "GET".into(),
            host: "example.com".into(),
            port: 80,
            path: "/page".into(),
            scheme: "http".into(),
            headers: vec![("Cookie".into(), "a=1".into())],
            query_string: String::new(),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = request();
        assert_eq!(req.header("cookie"), Some("a=1"));
        assert_eq!(req.header("COOKIE"), Some("a=1"));
        assert_eq!(req.header("referer"), None);
    }

    #[test]
    fn test_target_url_elides_default_port() {
        let mut req = request();
        assert_eq!(req.target_url(), "http://example.com/page");

        req.port = 8080;
        assert_eq!(req.target_url(), "http://example.com:8080/page");

        req.scheme = "https".into();
        req.port = 443;
        assert_eq!(req.target_url(), "https://example.com/page");
    }

    #[test]
    fn test_serialized_flow_generates_missing_id() {
        let json = r#"{
            "request": {"method":"GET","host":"h","port":80,"path":"/","scheme":"http"},
            "response": {"status":200}
        }"#;
        let flow: SerializedFlow = serde_json::from_str(json).unwrap();
        assert!(!flow.flow_id.is_empty());
        assert_eq!(flow.response.status, 200);
        assert!(flow.response.headers.is_empty());
    }

    #[test]
    fn test_serialized_flow_apply_mutates_response() {
        let mut flow = SerializedFlow {
            flow_id: "f1".into(),
            request: request(),
            response: ResponseSnapshot {
                status: 200,
                headers: Vec::new(),
                body: "orig".into(),
            },
        };
        flow.apply_status(500).unwrap();
        flow.apply_body("replaced").unwrap();
        flow.apply_headers(&[("X".into(), "1".into())]).unwrap();
        assert_eq!(flow.response.status, 500);
        assert_eq!(flow.response.body, "replaced");
        assert_eq!(flow.response.headers.len(), 1);
    }
}
