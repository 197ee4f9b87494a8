//! Remote-Command Resolution
//!
//! Maps a `show` directive value onto the fixed vocabulary of `url-to-*`
//! commands the remote transformation service executes, together with the
//! per-command parameters: the min-rating threshold, the forced model for the
//! ratings command, and the content type of the response body.

use crate::constants::{DEFAULT_MIN_RATING, RATINGS_MODEL, REMOTE_COMMAND_PREFIX};
use crate::directive::DirectiveSet;
use serde::{Deserialize, Serialize};

/// The closed set of operations the remote service knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteCommand {
    Html,
    HtmlAsDict,
    HtmlMasked,
    HtmlWithHashMapping,
    HtmlMinRating,
    Ratings,
    TextNodes,
    Lines,
    PlainText,
}

/// Exact show-value spelling for each command. `url-to-html-min-rating` is
/// additionally matched by prefix so a `:threshold` suffix still resolves.
const COMMAND_TABLE: &[(&str, RemoteCommand)] = &[
    ("url-to-html", RemoteCommand::Html),
    ("url-to-html-as-dict", RemoteCommand::HtmlAsDict),
    ("url-to-html-masked", RemoteCommand::HtmlMasked),
    ("url-to-html-with-hash-mapping", RemoteCommand::HtmlWithHashMapping),
    ("url-to-html-min-rating", RemoteCommand::HtmlMinRating),
    ("url-to-ratings", RemoteCommand::Ratings),
    ("url-to-text-nodes", RemoteCommand::TextNodes),
    ("url-to-lines", RemoteCommand::Lines),
    ("url-to-plain-text", RemoteCommand::PlainText),
];

/// Body kind of a transformation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Html,
    PlainText,
    Json,
    Unknown,
}

impl ContentKind {
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentKind::Html => "text/html; charset=utf-8",
            ContentKind::PlainText => "text/plain; charset=utf-8",
            ContentKind::Json => "application/json",
            ContentKind::Unknown => "application/octet-stream",
        }
    }

    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence {
            "text/html" => ContentKind::Html,
            "text/plain" => ContentKind::PlainText,
            "application/json" => ContentKind::Json,
            _ => ContentKind::Unknown,
        }
    }
}

impl RemoteCommand {
    /// Resolves a show value to a command, or `None` when it names nothing
    /// the remote service knows.
    pub fn from_show_value(show: &str) -> Option<Self> {
        if show.starts_with("url-to-html-min-rating") {
            return Some(RemoteCommand::HtmlMinRating);
        }
        COMMAND_TABLE
            .iter()
            .find(|(spelling, _)| *spelling == show)
            .map(|(_, command)| *command)
    }

    /// Canonical spelling, used as the remote path segment.
    pub fn spelling(&self) -> &'static str {
        COMMAND_TABLE
            .iter()
            .find(|(_, command)| command == self)
            .map(|(spelling, _)| *spelling)
            .unwrap_or("url-to-html")
    }

    /// The explicit command → content-type contract. Kept as one table so
    /// tests can pin it down.
    pub fn content_type(&self) -> ContentKind {
        match self {
            RemoteCommand::Html
            | RemoteCommand::HtmlMasked
            | RemoteCommand::HtmlWithHashMapping
            | RemoteCommand::HtmlMinRating => ContentKind::Html,
            RemoteCommand::HtmlAsDict | RemoteCommand::Ratings => ContentKind::Json,
            RemoteCommand::TextNodes | RemoteCommand::Lines | RemoteCommand::PlainText => {
                ContentKind::PlainText
            }
        }
    }
}

/// One fully-resolved remote call: immutable once built, used both for the
/// outbound request and for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommandRequest {
    pub command: RemoteCommand,
    pub target_url: String,
    pub rating: Option<f64>,
    pub model_override: Option<String>,
    /// Raw query suffix the rating contributes, e.g. `&rating=0.7`.
    pub url_suffix: String,
}

/// Parses a show value into a concrete remote request, or `None` when the
/// value does not reference a remote command.
pub fn parse_show_value(
    show: &str,
    target_url: &str,
    directives: &DirectiveSet,
) -> Option<RemoteCommandRequest> {
    if !show.starts_with(REMOTE_COMMAND_PREFIX) {
        return None;
    }
    let command = RemoteCommand::from_show_value(show)?;

    let (rating, url_suffix) = if command == RemoteCommand::HtmlMinRating {
        let threshold = show
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(DEFAULT_MIN_RATING);
        (Some(threshold), format!("&rating={}", threshold))
    } else {
        let rating = directives.rating;
        let suffix = rating
            .map(|r| format!("&rating={}", r))
            .unwrap_or_default();
        (rating, suffix)
    };

    let model_override = if command == RemoteCommand::Ratings {
        // The ratings command always runs on the default classification
        // model, whatever the caller asked for.
        Some(RATINGS_MODEL.to_string())
    } else {
        directives.model_override.clone()
    };

    Some(RemoteCommandRequest {
        command,
        target_url: target_url.to_string(),
        rating,
        model_override,
        url_suffix,
    })
}
