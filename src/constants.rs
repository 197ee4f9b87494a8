/// Prefix shared by every control cookie the engine recognizes.
pub const COOKIE_DIRECTIVE_PREFIX: &str = "mitm-";

/// The full cookie-sourced directive vocabulary. Anything else in the cookie
/// header is ignored by the directive parser.
pub const COOKIE_DIRECTIVE_NAMES: &[&str] = &[
    "mitm-show",
    "mitm-inject",
    "mitm-replace",
    "mitm-debug",
    "mitm-rating",
    "mitm-model",
    "mitm-cache",
];

/// Query-string directive vocabulary. `inject_debug` is a legacy alias that
/// behaves like `inject=true` and also flips debug mode on.
pub const QUERY_DIRECTIVE_KEYS: &[&str] = &["show", "inject", "replace", "debug", "inject_debug"];

/// Sanitization limits for cookie tokens.
pub const MAX_COOKIE_NAME_LEN: usize = 256;
pub const MAX_COOKIE_VALUE_LEN: usize = 4096;

/// Textual prefix that marks a show directive as a remote command reference.
pub const REMOTE_COMMAND_PREFIX: &str = "url-to";

/// Literal show value served locally from the extracted exchange.
pub const SHOW_LITERAL_RESPONSE_DATA: &str = "response-data";

/// Threshold used by the min-rating command when the show value carries no
/// `:threshold` suffix or the suffix does not parse.
pub const DEFAULT_MIN_RATING: f64 = 0.5;

/// Classification model forced for the ratings command regardless of any
/// caller-supplied override.
pub const RATINGS_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";

/// Path segment of the remote transformation service, as in
/// `GET {base}/html-graphs/{command}/?url=...`.
pub const REMOTE_GRAPH_PATH: &str = "html-graphs";

/// Response headers stamped by the pipeline.
pub const HEADER_PROCESSED: &str = "X-Proxy-Processed";
pub const HEADER_DEBUG: &str = "X-Proxy-Debug";
pub const HEADER_COOKIE_SUMMARY: &str = "X-Proxy-Cookie-Summary";
pub const HEADER_ERROR: &str = "X-Proxy-Error";

/// Values accepted as "true" for flag directives (case-insensitive).
pub const TRUTHY_VALUES: &[&str] = &["true", "1", "yes", "on"];
pub const FALSY_VALUES: &[&str] = &["false", "0", "no", "off"];

/// Environment variables for the remote transformation service.
pub const ENV_REMOTE_BASE_URL: &str = "REFRACT_REMOTE_BASE_URL";
pub const ENV_AUTH_HEADER: &str = "REFRACT_AUTH_HEADER";
pub const ENV_AUTH_SECRET: &str = "REFRACT_AUTH_SECRET";

/// Cache store defaults.
pub const CACHE_RETENTION_DAYS: i64 = 7;
pub const CACHE_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
];
