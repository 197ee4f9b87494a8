//! Flow Adapter Pipeline.
//!
//! Extract → Process → Apply, terminal on success or error. Extraction
//! failures skip processing entirely; processing failures (including panics)
//! degrade to a uniform 500 response with the `X-Proxy-Error` marker. The
//! host never sees an unhandled error from this engine.

use crate::command::{parse_show_value, ContentKind};
use crate::constants::{
    HEADER_COOKIE_SUMMARY, HEADER_DEBUG, HEADER_ERROR, HEADER_PROCESSED,
    SHOW_LITERAL_RESPONSE_DATA,
};
use crate::cookie::tokenize;
use crate::directive::{classify_show, validate_show_value, DirectiveSet, ShowKind};
use crate::flow::{
    ApplicationResult, ExtractionResult, FlowExchange, RequestSnapshot, ResponseSnapshot,
};
use crate::metrics::EngineCounters;
use crate::resolver::CommandResolver;
use futures_util::FutureExt;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

lazy_static! {
    static ref BODY_CLOSE_RE: Regex = Regex::new(r"(?i)</body\s*>").unwrap();
}

/// What one pipeline run produced, echoed back to the hook shim.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub extraction: ExtractionResult,
    pub application: ApplicationResult,
    pub directives: DirectiveSet,
}

/// The fully-composed response Process hands to Apply.
#[derive(Debug, Clone)]
struct ProcessedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    modifications: Vec<String>,
}

pub struct FlowAdapter {
    resolver: CommandResolver,
    counters: Arc<EngineCounters>,
}

impl FlowAdapter {
    pub fn new(resolver: CommandResolver, counters: Arc<EngineCounters>) -> Self {
        Self { resolver, counters }
    }

    /// Runs the three-stage pipeline on one exchange. Never returns an
    /// error: every failure mode ends in a well-formed applied response.
    pub async fn handle(&self, flow: &mut dyn FlowExchange) -> PipelineOutcome {
        let flow_id = flow.flow_id();
        self.counters.record_request();

        // Extract
        let extracted = flow
            .extract_request()
            .and_then(|request| flow.extract_response().map(|response| (request, response)));

        let (extraction, directives, processed) = match extracted {
            Ok((request, response)) => {
                let extraction = ExtractionResult::ok(flow_id.clone());
                let directives = resolve_directives(&request);

                // Process, with panic containment at the orchestrator
                // boundary.
                let processed = match AssertUnwindSafe(
                    self.transform(&request, &response, &directives),
                )
                .catch_unwind()
                .await
                {
                    Ok(Ok(processed)) => processed,
                    Ok(Err(message)) => {
                        self.counters.record_error();
                        tracing::error!("[FLOW] {} processing failed: {}", flow_id.short(), message);
                        error_response(&message)
                    }
                    Err(panic) => {
                        let message = panic_message(panic);
                        self.counters.record_error();
                        tracing::error!("[FLOW] {} processing panicked: {}", flow_id.short(), message);
                        error_response(&message)
                    }
                };
                (extraction, directives, processed)
            }
            Err(message) => {
                self.counters.record_error();
                tracing::error!("[FLOW] {} extraction failed: {}", flow_id.short(), message);
                (
                    ExtractionResult::failed(flow_id.clone(), message.clone()),
                    DirectiveSet::default(),
                    error_response(&message),
                )
            }
        };

        // Apply
        let application = apply(flow, flow_id, &processed);
        if !application.success {
            self.counters.record_error();
        }

        PipelineOutcome {
            extraction,
            application,
            directives,
        }
    }

    /// Process stage: run the resolved directives against the extracted
    /// exchange and compose the final status/headers/body.
    async fn transform(
        &self,
        request: &RequestSnapshot,
        response: &ResponseSnapshot,
        directives: &DirectiveSet,
    ) -> std::result::Result<ProcessedResponse, String> {
        let mut status = response.status;
        let mut headers = response.headers.clone();
        let mut body = response.body.clone();
        let mut modifications = Vec::new();
        let mut body_changed = false;

        if let Some(show) = &directives.show {
            match classify_show(show) {
                ShowKind::RemoteCommand => {
                    match parse_show_value(show, &request.target_url(), directives) {
                        Some(command_request) => {
                            let result = self
                                .resolver
                                .resolve(&command_request, show, directives.cache_enabled)
                                .await;
                            if result.success {
                                status = 200;
                                body = result.body;
                                body_changed = true;
                                set_header(
                                    &mut headers,
                                    "Content-Type",
                                    result.content_type.as_mime(),
                                );
                                modifications
                                    .push(format!("show: {} rendition ({} chars)", show, body.len()));
                            } else {
                                // A failed remote call is a legitimate
                                // response, not an engine error.
                                status = result.status_code;
                                body = if result.body.is_empty() {
                                    result
                                        .error_message
                                        .clone()
                                        .unwrap_or_else(|| "remote call failed".to_string())
                                } else {
                                    result.body
                                };
                                body_changed = true;
                                set_header(
                                    &mut headers,
                                    "Content-Type",
                                    ContentKind::PlainText.as_mime(),
                                );
                                modifications.push(format!(
                                    "show: {} failed with status {}",
                                    show, result.status_code
                                ));
                            }
                        }
                        None => {
                            let validation = validate_show_value(show);
                            let reason = validation
                                .error
                                .unwrap_or_else(|| "unparseable show value".to_string());
                            tracing::warn!("[DIRECTIVE] {}", reason);
                            modifications.push(format!("show: skipped ({})", reason));
                        }
                    }
                }
                ShowKind::Literal if show == SHOW_LITERAL_RESPONSE_DATA => {
                    body = render_response_data(request, response)?;
                    status = 200;
                    body_changed = true;
                    set_header(&mut headers, "Content-Type", ContentKind::Json.as_mime());
                    modifications.push("show: response-data rendition".to_string());
                }
                ShowKind::Literal => {
                    let validation = validate_show_value(show);
                    if let Some(reason) = validation.error {
                        tracing::warn!("[DIRECTIVE] {}", reason);
                        modifications.push(format!("show: skipped ({})", reason));
                    }
                }
            }
        }

        if let Some(replace) = &directives.replace {
            let (needle, replacement) = split_replace(replace);
            if !needle.is_empty() {
                let count = body.matches(needle).count();
                if count > 0 {
                    body = body.replace(needle, replacement);
                    body_changed = true;
                    modifications
                        .push(format!("replace: {} occurrence(s) of {:?}", count, needle));
                }
            }
        }

        if let Some(snippet) = injection_snippet(directives, request) {
            body = inject_snippet(&body, &snippet);
            body_changed = true;
            modifications.push(format!("inject: {} chars", snippet.len()));
        }

        set_header(&mut headers, HEADER_PROCESSED, "true");
        if directives.is_debug_mode() {
            set_header(&mut headers, HEADER_DEBUG, "true");
            set_header(&mut headers, HEADER_COOKIE_SUMMARY, &cookie_summary(directives));
        }
        if body_changed {
            set_header(&mut headers, "Content-Length", &body.len().to_string());
        }

        Ok(ProcessedResponse {
            status,
            headers,
            body,
            modifications,
        })
    }
}

/// Builds the two directive sets from the extracted request and merges them,
/// cookie values winning. Never fails; bad input degrades to fewer
/// directives.
fn resolve_directives(request: &RequestSnapshot) -> DirectiveSet {
    let query_pairs: Vec<(String, String)> =
        url::form_urlencoded::parse(request.query_string.as_bytes())
            .into_owned()
            .collect();
    let query_directives =
        DirectiveSet::from_query_params(query_pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let cookie_directives = match request.header("cookie") {
        Some(raw) => {
            let outcome = tokenize(raw);
            if !outcome.malformed_tokens.is_empty() {
                tracing::debug!(
                    "[TOKENIZE] {} malformed token(s) in cookie header",
                    outcome.malformed_tokens.len()
                );
            }
            DirectiveSet::from_cookie_map(&outcome.cookies)
        }
        None => DirectiveSet::default(),
    };

    DirectiveSet::resolve(&query_directives, &cookie_directives)
}

/// Apply stage: write the composed response back onto the flow object,
/// recording which parts landed. No retries.
fn apply(
    flow: &mut dyn FlowExchange,
    flow_id: crate::types::FlowId,
    processed: &ProcessedResponse,
) -> ApplicationResult {
    let mut result = ApplicationResult::new(flow_id);
    result.modifications = processed.modifications.clone();

    match flow.apply_status(processed.status) {
        Ok(()) => result.status_applied = true,
        Err(e) => {
            result.success = false;
            result.error.get_or_insert(format!("status: {}", e));
        }
    }

    match flow.apply_headers(&processed.headers) {
        Ok(()) => result.headers_applied = processed.headers.len(),
        Err(e) => {
            result.success = false;
            result.error.get_or_insert(format!("headers: {}", e));
        }
    }

    match flow.apply_body(&processed.body) {
        Ok(()) => {
            result.body_applied = true;
            result.body_bytes = processed.body.len();
        }
        Err(e) => {
            result.success = false;
            result.error.get_or_insert(format!("body: {}", e));
        }
    }

    result
}

/// The uniform 500 every contained failure collapses into.
fn error_response(message: &str) -> ProcessedResponse {
    ProcessedResponse {
        status: 500,
        headers: vec![
            ("Content-Type".to_string(), ContentKind::PlainText.as_mime().to_string()),
            (HEADER_ERROR.to_string(), "true".to_string()),
        ],
        body: format!("proxy control engine error: {}", message),
        modifications: vec![format!("error: {}", message)],
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// `replace` directive value: needle and replacement split on the first
/// colon; no colon means delete the needle.
fn split_replace(value: &str) -> (&str, &str) {
    match value.split_once(':') {
        Some((needle, replacement)) => (needle, replacement),
        None => (value, ""),
    }
}

/// The snippet to inject, if any. Truthy inject values (and the legacy
/// `inject_debug` alias) request the standard banner; any other non-empty
/// value is injected verbatim.
fn injection_snippet(directives: &DirectiveSet, request: &RequestSnapshot) -> Option<String> {
    let wants_banner = directives.inject_debug.unwrap_or(false);
    match &directives.inject {
        Some(value) => {
            let lower = value.to_ascii_lowercase();
            if crate::constants::TRUTHY_VALUES.contains(&lower.as_str()) || wants_banner {
                Some(debug_banner(directives, request))
            } else {
                Some(value.clone())
            }
        }
        None if wants_banner => Some(debug_banner(directives, request)),
        None => None,
    }
}

fn debug_banner(directives: &DirectiveSet, request: &RequestSnapshot) -> String {
    format!(
        "<div id=\"proxy-debug-banner\" style=\"position:fixed;top:0;left:0;right:0;\
         background:#222;color:#0f0;font:12px monospace;padding:4px;z-index:99999\">\
         [proxy] target={} show={} debug={}</div>",
        request.target_url(),
        directives.show.as_deref().unwrap_or("-"),
        directives.is_debug_mode()
    )
}

/// Injects immediately before `</body>` when present, else appends.
fn inject_snippet(body: &str, snippet: &str) -> String {
    match BODY_CLOSE_RE.find(body) {
        Some(m) => {
            let mut out = String::with_capacity(body.len() + snippet.len());
            out.push_str(&body[..m.start()]);
            out.push_str(snippet);
            out.push_str(&body[m.start()..]);
            out
        }
        None => {
            let mut out = body.to_string();
            out.push_str(snippet);
            out
        }
    }
}

/// Single-line JSON summary of the resolved directives, carried in the
/// debug header family.
fn cookie_summary(directives: &DirectiveSet) -> String {
    serde_json::json!({
        "show_command": directives.show,
        "debug_enabled": directives.is_debug_mode(),
        "cache_enabled": directives.cache_enabled,
        "rating": directives.rating,
        "model_override": directives.model_override,
    })
    .to_string()
}

/// The `response-data` literal: a JSON dump of the extracted exchange.
fn render_response_data(
    request: &RequestSnapshot,
    response: &ResponseSnapshot,
) -> std::result::Result<String, String> {
    let dump = serde_json::json!({
        "request": {
            "method": request.method,
            "host": request.host,
            "port": request.port,
            "path": request.path,
            "scheme": request.scheme,
            "target_url": request.target_url(),
            "query_string": request.query_string,
            "header_count": request.headers.len(),
        },
        "response": {
            "status": response.status,
            "header_count": response.headers.len(),
            "body_bytes": response.body.len(),
        },
    });
    serde_json::to_string_pretty(&dump).map_err(|e| e.to_string())
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers
        .iter_mut()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
    {
        Some((_, v)) => *v = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}
