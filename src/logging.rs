use crate::pipeline::PipelineOutcome;
use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use colored::*;
use std::panic;
use tracing::{error, info, warn};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const SHIM_FLOW_ID_HEADER: &str = "x-refract-flow-id";

/// Sets up a global panic hook that logs panics through tracing before
/// delegating to the original hook.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Tags every control-plane request with a generated flow id and wraps it in
/// an exchange span so everything the pipeline logs carries the id.
pub async fn flow_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let flow_id = Uuid::new_v4().to_string();
    if let Ok(val) = flow_id.parse() {
        req.headers_mut().insert(SHIM_FLOW_ID_HEADER, val);
    }

    let span = info_span!("exchange", flow_id = %flow_id);
    next.run(req).instrument(span).await
}

/// One-line summary per processed exchange, in the transit log.
pub fn log_outcome_summary(outcome: &PipelineOutcome) {
    let show = outcome.directives.show.as_deref().unwrap_or("-");
    info!(
        target: "transit_log",
        "[FLOW] {} | Extract: {} | Apply: {} | show: {} | debug: {} | {} modification(s)",
        outcome.extraction.flow_id.short(),
        if outcome.extraction.success { "ok" } else { "FAILED" },
        if outcome.application.success { "ok" } else { "FAILED" },
        show,
        outcome.directives.is_debug_mode(),
        outcome.application.modifications.len()
    );

    if let Some(err) = &outcome.extraction.error {
        warn!(
            target: "transit_log",
            "{}", format!("[FLOW] {} extraction error: {}", outcome.extraction.flow_id.short(), err).bold().red()
        );
    }
    if let Some(err) = &outcome.application.error {
        warn!(
            target: "transit_log",
            "{}", format!("[FLOW] {} application error: {}", outcome.application.flow_id.short(), err).bold().red()
        );
    }
}
