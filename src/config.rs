use crate::cache::CachePool;
use crate::constants::{ENV_AUTH_HEADER, ENV_AUTH_SECRET, ENV_REMOTE_BASE_URL};
use crate::metrics::EngineCounters;
use crate::pipeline::FlowAdapter;
use crate::types::{RefractError, Result};
use clap::Parser;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = 8089)]
    pub port: u16,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value = "refract-cache.db")]
    pub cache_db: String,
    #[arg(long, default_value_t = false)]
    pub disable_cache: bool,
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_body_size: usize,
}

/// Where and how to reach the remote transformation service. The secret
/// never appears in logs; keep it out of Debug output too.
#[derive(Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_header: String,
    pub auth_secret: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("auth_header", &self.auth_header)
            .field("auth_secret", &"<redacted>")
            .finish()
    }
}

impl RemoteConfig {
    /// Missing remote configuration is a startup error, not a per-request
    /// surprise.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: required_env(ENV_REMOTE_BASE_URL)?,
            auth_header: std::env::var(ENV_AUTH_HEADER)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "X-Api-Key".to_string()),
            auth_secret: required_env(ENV_AUTH_SECRET)?,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            RefractError::Config(format!(
                "{} environment variable is missing or empty",
                name
            ))
            .into()
        })
}

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<FlowAdapter>,
    pub counters: Arc<EngineCounters>,
    /// Present when the bundled sqlite cache is active; used by readiness.
    pub cache_pool: Option<CachePool>,
    pub args: Arc<Args>,
}
