//! Cache-Aside Integrator.
//!
//! Wraps the remote command call in the cache discipline: look up first,
//! call on miss, store only successful results, and never let the cache take
//! the exchange down with it.

use crate::cache::{CacheMetadata, ContentCache};
use crate::command::RemoteCommandRequest;
use crate::metrics::EngineCounters;
use crate::remote::{RemoteCommandResult, RemoteTransport};
use crate::types::LatencyMs;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

pub struct CommandResolver {
    transport: Arc<dyn RemoteTransport>,
    cache: Option<Arc<dyn ContentCache>>,
    counters: Arc<EngineCounters>,
    cache_enabled: bool,
}

impl CommandResolver {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        cache: Option<Arc<dyn ContentCache>>,
        counters: Arc<EngineCounters>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            transport,
            cache,
            counters,
            cache_enabled,
        }
    }

    /// Resolves one remote command, consulting the cache when enabled.
    ///
    /// `cache_override` is the per-exchange `cache` directive; when set it
    /// beats the configured default. The cache lookup key uses the raw
    /// `show_value`, not the parsed command.
    pub async fn resolve(
        &self,
        request: &RemoteCommandRequest,
        show_value: &str,
        cache_override: Option<bool>,
    ) -> RemoteCommandResult {
        let caching = cache_override.unwrap_or(self.cache_enabled);
        let cache = if caching { self.cache.as_deref() } else { None };

        if let Some(cache) = cache {
            match cache.get(&request.target_url, show_value).await {
                Ok(Some(entry)) => {
                    self.counters.record_cache_hit();
                    tracing::info!(
                        "[CACHE] Hit for {} ({}), {} chars",
                        request.target_url,
                        show_value,
                        entry.body.len()
                    );
                    // Content type on a hit comes from the command table,
                    // the stored value is metadata only.
                    return RemoteCommandResult::from_cache(
                        entry.body,
                        request.command.content_type(),
                    );
                }
                Ok(None) => {
                    self.counters.record_cache_miss();
                }
                Err(e) => {
                    self.counters.record_cache_miss();
                    tracing::warn!("[CACHE] Read failed, treating as miss: {}", e.inner);
                }
            }
        }

        self.counters.record_remote_call();
        let started = Instant::now();
        let result = self.transport.fetch(request).await;
        let elapsed = LatencyMs(started.elapsed().as_millis());

        if !result.success {
            self.counters.record_remote_failure();
            tracing::warn!(
                "[REMOTE] {} failed for {} (status {}): {}",
                request.command.spelling(),
                request.target_url,
                result.status_code,
                result.error_message.as_deref().unwrap_or("no message")
            );
            return result;
        }

        if let Some(cache) = cache {
            let metadata = CacheMetadata {
                status_code: result.status_code,
                content_type: result.content_type,
                elapsed,
                stored_at: Utc::now(),
                show_value: show_value.to_string(),
            };
            match cache
                .put(&request.target_url, show_value, &result.body, &metadata)
                .await
            {
                Ok(()) => tracing::debug!(
                    "[CACHE] Stored {} chars for {} ({} ms)",
                    result.body.len(),
                    request.target_url,
                    elapsed
                ),
                // A transformation already computed must still reach the
                // caller even if caching breaks.
                Err(e) => tracing::warn!("[CACHE] Store failed (non-fatal): {}", e.inner),
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedEntry;
    use crate::command::{parse_show_value, ContentKind};
    use crate::directive::DirectiveSet;
    use crate::types::{RefractError, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    struct CountingTransport {
        calls: AtomicUsize,
        result: RemoteCommandResult,
    }

    impl CountingTransport {
        fn returning(result: RemoteCommandResult) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result,
            }
        }

        fn ok(body: &str) -> Self {
            Self::returning(RemoteCommandResult {
                status_code: 200,
                content_type: ContentKind::Html,
                body: body.to_string(),
                headers: Vec::new(),
                success: true,
                error_message: None,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteTransport for CountingTransport {
        async fn fetch(&self, _request: &RemoteCommandRequest) -> RemoteCommandResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: RwLock<HashMap<(String, String), CachedEntry>>,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl ContentCache for MemoryCache {
        async fn get(&self, target_url: &str, show_value: &str) -> Result<Option<CachedEntry>> {
            Ok(self
                .entries
                .read()
                .await
                .get(&(target_url.to_string(), show_value.to_string()))
                .cloned())
        }

        async fn put(
            &self,
            target_url: &str,
            show_value: &str,
            body: &str,
            metadata: &CacheMetadata,
        ) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.entries.write().await.insert(
                (target_url.to_string(), show_value.to_string()),
                CachedEntry {
                    body: body.to_string(),
                    metadata: metadata.clone(),
                },
            );
            Ok(())
        }
    }

    struct BrokenCache {
        fail_get: bool,
    }

    #[async_trait]
    impl ContentCache for BrokenCache {
        async fn get(&self, _t: &str, _s: &str) -> Result<Option<CachedEntry>> {
            if self.fail_get {
                Err(RefractError::Config("cache read exploded".into()).into())
            } else {
                Ok(None)
            }
        }

        async fn put(&self, _t: &str, _s: &str, _b: &str, _m: &CacheMetadata) -> Result<()> {
            Err(RefractError::Config("cache write exploded".into()).into())
        }
    }

    fn request(show: &str) -> RemoteCommandRequest {
        parse_show_value(show, "http://example.com/", &DirectiveSet::default()).unwrap()
    }

    fn resolver(
        transport: Arc<CountingTransport>,
        cache: Option<Arc<dyn ContentCache>>,
        counters: Arc<EngineCounters>,
        enabled: bool,
    ) -> CommandResolver {
        CommandResolver::new(transport, cache, counters, enabled)
    }

    #[tokio::test]
    async fn test_miss_then_hit_calls_remote_once() {
        let transport = Arc::new(CountingTransport::ok("<html>t</html>"));
        let cache = Arc::new(MemoryCache::default());
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport.clone(),
            Some(cache.clone()),
            counters.clone(),
            true,
        );

        let req = request("url-to-html");
        let first = resolver.resolve(&req, "url-to-html", None).await;
        assert!(first.success);

        let second = resolver.resolve(&req, "url-to-html", None).await;
        assert!(second.success);
        assert_eq!(second.body, first.body);

        assert_eq!(transport.call_count(), 1);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
        let s = counters.snapshot();
        assert_eq!(s.cache_misses, 1);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.remote_calls, 1);
    }

    #[tokio::test]
    async fn test_hit_content_type_comes_from_command_table() {
        let transport = Arc::new(CountingTransport::ok("{\"a\": 1}"));
        let cache = Arc::new(MemoryCache::default());
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(transport, Some(cache), counters, true);

        let req = request("url-to-ratings");
        resolver.resolve(&req, "url-to-ratings", None).await;
        let hit = resolver.resolve(&req, "url-to-ratings", None).await;
        assert_eq!(hit.content_type, ContentKind::Json);
        assert_eq!(hit.status_code, 200);
    }

    #[tokio::test]
    async fn test_failed_call_not_cached() {
        let transport = Arc::new(CountingTransport::returning(
            RemoteCommandResult::transport_failure(504, "timed out".into()),
        ));
        let cache = Arc::new(MemoryCache::default());
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport.clone(),
            Some(cache.clone()),
            counters.clone(),
            true,
        );

        let req = request("url-to-html");
        let result = resolver.resolve(&req, "url-to-html", None).await;
        assert!(!result.success);
        assert_eq!(result.status_code, 504);
        assert_eq!(result.error_message.as_deref(), Some("timed out"));

        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
        assert_eq!(counters.snapshot().remote_failures, 1);

        // A retry goes to the remote again: nothing poisoned the cache.
        resolver.resolve(&req, "url-to-html", None).await;
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_put_failure_is_non_fatal() {
        let transport = Arc::new(CountingTransport::ok("<html>t</html>"));
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport,
            Some(Arc::new(BrokenCache { fail_get: false })),
            counters,
            true,
        );

        let req = request("url-to-html");
        let result = resolver.resolve(&req, "url-to-html", None).await;
        assert!(result.success);
        assert_eq!(result.body, "<html>t</html>");
    }

    #[tokio::test]
    async fn test_get_failure_treated_as_miss() {
        let transport = Arc::new(CountingTransport::ok("<html>t</html>"));
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport.clone(),
            Some(Arc::new(BrokenCache { fail_get: true })),
            counters.clone(),
            true,
        );

        let req = request("url-to-html");
        let result = resolver.resolve(&req, "url-to-html", None).await;
        assert!(result.success);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(counters.snapshot().cache_misses, 1);
    }

    #[tokio::test]
    async fn test_caching_disabled_skips_lookup() {
        let transport = Arc::new(CountingTransport::ok("<html>t</html>"));
        let cache = Arc::new(MemoryCache::default());
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport.clone(),
            Some(cache.clone()),
            counters.clone(),
            false,
        );

        let req = request("url-to-html");
        resolver.resolve(&req, "url-to-html", None).await;
        resolver.resolve(&req, "url-to-html", None).await;

        assert_eq!(transport.call_count(), 2);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
        let s = counters.snapshot();
        assert_eq!(s.cache_hits, 0);
        assert_eq!(s.cache_misses, 0);
    }

    #[tokio::test]
    async fn test_cache_directive_overrides_disabled_default() {
        let transport = Arc::new(CountingTransport::ok("<html>t</html>"));
        let cache = Arc::new(MemoryCache::default());
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport.clone(),
            Some(cache.clone()),
            counters.clone(),
            false,
        );

        let req = request("url-to-html");
        resolver.resolve(&req, "url-to-html", Some(true)).await;
        resolver.resolve(&req, "url-to-html", Some(true)).await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(counters.snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_textual_variants_cache_independently() {
        let transport = Arc::new(CountingTransport::ok("<html>t</html>"));
        let cache = Arc::new(MemoryCache::default());
        let counters = Arc::new(EngineCounters::new());
        let resolver = resolver(
            transport.clone(),
            Some(cache.clone()),
            counters.clone(),
            true,
        );

        let bare = request("url-to-html-min-rating");
        let suffixed = request("url-to-html-min-rating:0.5");
        resolver.resolve(&bare, "url-to-html-min-rating", None).await;
        resolver
            .resolve(&suffixed, "url-to-html-min-rating:0.5", None)
            .await;

        // Same parsed command, different raw text: two remote calls.
        assert_eq!(transport.call_count(), 2);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
    }
}
