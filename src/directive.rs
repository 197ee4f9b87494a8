//! Control-Directive Parsing & Resolution
//!
//! Directives arrive from two sources: the query string of the intercepted
//! request and the `mitm-` cookie family. Each source is parsed into a
//! [`DirectiveSet`] independently, then the two sets are merged with cookie
//! values winning every conflict. Cookies represent a session-scoped debug
//! mode and must beat transient query strings a shared link might carry.

use crate::constants::{
    COOKIE_DIRECTIVE_PREFIX, FALSY_VALUES, REMOTE_COMMAND_PREFIX, SHOW_LITERAL_RESPONSE_DATA,
    TRUTHY_VALUES,
};
use crate::cookie::CookieMap;
use serde::{Deserialize, Serialize};

/// The canonical, per-exchange record of every recognized directive.
///
/// `None` always means "not specified": resolution only overrides a field the
/// source actually set, so unset must stay distinguishable from false/empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectiveSet {
    pub show: Option<String>,
    pub inject: Option<String>,
    pub replace: Option<String>,
    pub debug_enabled: Option<bool>,
    pub cache_enabled: Option<bool>,
    pub rating: Option<f64>,
    pub model_override: Option<String>,
    /// Legacy query alias; folded into inject handling at the command level,
    /// kept separate here so merge semantics stay field-for-field.
    pub inject_debug: Option<bool>,
}

impl DirectiveSet {
    /// Extracts directives from decoded query parameters. Recognized keys:
    /// `show`, `inject`, `replace`, `debug`, `inject_debug`. Unknown keys are
    /// silently ignored; this never fails.
    pub fn from_query_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut set = Self::default();
        for (key, value) in params {
            match key {
                "show" => set.show = non_empty(value),
                "inject" => set.inject = non_empty(value),
                "replace" => set.replace = non_empty(value),
                "debug" => set.debug_enabled = parse_flag(value),
                "inject_debug" => set.inject_debug = parse_flag(value),
                _ => {}
            }
        }
        set
    }

    /// Extracts directives from a tokenized cookie map, filtering to the
    /// fixed `mitm-` family. Unknown cookies are silently ignored.
    pub fn from_cookie_map(cookies: &CookieMap) -> Self {
        let mut set = Self::default();
        for (name, value) in cookies.iter() {
            let Some(directive) = name.strip_prefix(COOKIE_DIRECTIVE_PREFIX) else {
                continue;
            };
            match directive {
                "show" => set.show = non_empty(value),
                "inject" => set.inject = non_empty(value),
                "replace" => set.replace = non_empty(value),
                "debug" => set.debug_enabled = parse_flag(value),
                "cache" => set.cache_enabled = parse_flag(value),
                "rating" => set.rating = parse_rating(value),
                "model" => set.model_override = non_empty(value),
                _ => {}
            }
        }
        set
    }

    /// Merges the two sources into one canonical set. For every field, a
    /// cookie-sourced value overrides a query-sourced one; a field only one
    /// source set is taken as-is.
    pub fn resolve(query: &DirectiveSet, cookie: &DirectiveSet) -> DirectiveSet {
        DirectiveSet {
            show: cookie.show.clone().or_else(|| query.show.clone()),
            inject: cookie.inject.clone().or_else(|| query.inject.clone()),
            replace: cookie.replace.clone().or_else(|| query.replace.clone()),
            debug_enabled: cookie.debug_enabled.or(query.debug_enabled),
            cache_enabled: cookie.cache_enabled.or(query.cache_enabled),
            rating: cookie.rating.or(query.rating),
            model_override: cookie
                .model_override
                .clone()
                .or_else(|| query.model_override.clone()),
            inject_debug: cookie.inject_debug.or(query.inject_debug),
        }
    }

    /// Debug mode is on when `debug` was set, or via the legacy
    /// `inject_debug` alias.
    pub fn is_debug_mode(&self) -> bool {
        self.debug_enabled.unwrap_or(false) || self.inject_debug.unwrap_or(false)
    }

    /// True when no source specified anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// How a resolved `show` value should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    /// References one of the fixed `url-to-*` remote commands.
    RemoteCommand,
    /// An opaque literal such as `response-data`, served locally.
    Literal,
}

pub fn classify_show(value: &str) -> ShowKind {
    if value.starts_with(REMOTE_COMMAND_PREFIX) {
        ShowKind::RemoteCommand
    } else {
        ShowKind::Literal
    }
}

/// Boolean-plus-message validation result for a show value. Directive errors
/// are reported, never thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowValidation {
    pub valid: bool,
    pub error: Option<String>,
}

impl ShowValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(error: String) -> Self {
        Self {
            valid: false,
            error: Some(error),
        }
    }
}

pub fn validate_show_value(value: &str) -> ShowValidation {
    if value.is_empty() {
        return ShowValidation::ok();
    }
    match classify_show(value) {
        ShowKind::RemoteCommand => {
            if crate::command::RemoteCommand::from_show_value(value).is_some() {
                ShowValidation::ok()
            } else {
                ShowValidation::invalid(format!("unrecognized remote command: {:?}", value))
            }
        }
        ShowKind::Literal => {
            if value == SHOW_LITERAL_RESPONSE_DATA {
                ShowValidation::ok()
            } else {
                ShowValidation::invalid(format!("unknown show value: {:?}", value))
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    let lower = value.to_ascii_lowercase();
    if TRUTHY_VALUES.contains(&lower.as_str()) {
        Some(true)
    } else if FALSY_VALUES.contains(&lower.as_str()) {
        Some(false)
    } else {
        if !value.is_empty() {
            tracing::debug!("[DIRECTIVE] Unparseable flag value {:?}, leaving unset", value);
        }
        None
    }
}

fn parse_rating(value: &str) -> Option<f64> {
    match value.parse::<f64>() {
        Ok(r) => Some(r.clamp(0.0, 1.0)),
        Err(_) => {
            if !value.is_empty() {
                tracing::debug!("[DIRECTIVE] Unparseable rating {:?}, leaving unset", value);
            }
            None
        }
    }
}
