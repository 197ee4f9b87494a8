use refract::cache::{ContentCache, SqliteContentCache};
use refract::config::{AppState, Args, RemoteConfig};
use refract::flow::SerializedFlow;
use refract::health;
use refract::logging::{flow_id_middleware, log_outcome_summary, setup_panic_hook};
use refract::metrics::EngineCounters;
use refract::pipeline::{FlowAdapter, PipelineOutcome};
use refract::remote::HttpTransport;
use refract::resolver::CommandResolver;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// What the hook shim gets back: the mutated exchange plus the stage
/// outcome records.
#[derive(Serialize)]
struct FlowProcessResponse {
    flow: SerializedFlow,
    outcome: PipelineOutcome,
}

async fn process_flow(
    State(state): State<Arc<AppState>>,
    Json(mut flow): Json<SerializedFlow>,
) -> Json<FlowProcessResponse> {
    let outcome = state.adapter.handle(&mut flow).await;
    log_outcome_summary(&outcome);
    Json(FlowProcessResponse { flow, outcome })
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    use tracing_subscriber::prelude::*;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => "refract=debug".into(),
    };

    let file_appender = tracing_appender::rolling::daily(".", "refract.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    setup_panic_hook();

    let args = Arc::new(Args::parse());

    let remote_config = match RemoteConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e.inner);
            eprintln!(
                "Set REFRACT_REMOTE_BASE_URL and REFRACT_AUTH_SECRET in your .env file or environment."
            );
            std::process::exit(1);
        }
    };

    let cache = if args.disable_cache {
        None
    } else {
        match SqliteContentCache::init(&args.cache_db).await {
            Ok(c) => Some(c),
            Err(e) => {
                // The cache is a side channel; a broken store must not block
                // the transit path.
                tracing::warn!(
                    "Cache store unavailable, continuing without cache: {}",
                    e.inner
                );
                None
            }
        }
    };

    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(args.request_timeout_secs))
        .connect_timeout(std::time::Duration::from_secs(args.connect_timeout_secs))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let counters = Arc::new(EngineCounters::new());
    let cache_pool = cache.as_ref().map(|c| c.pool().clone());
    let cache: Option<Arc<dyn ContentCache>> =
        cache.map(|c| Arc::new(c) as Arc<dyn ContentCache>);

    let transport = Arc::new(HttpTransport::new(client, remote_config));
    let resolver = CommandResolver::new(transport, cache, counters.clone(), !args.disable_cache);
    let adapter = Arc::new(FlowAdapter::new(resolver, counters.clone()));

    let state = Arc::new(AppState {
        adapter,
        counters: counters.clone(),
        cache_pool,
        args: args.clone(),
    });

    // Periodic counters summary in the log.
    {
        let counters = counters.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
            interval.tick().await;
            loop {
                interval.tick().await;
                counters.log_summary();
            }
        });
    }

    let app = Router::new()
        .route("/flow", post(process_flow))
        .route("/health", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .route("/admin/counters", get(health::admin_counters))
        .layer(axum::extract::DefaultBodyLimit::max(args.max_body_size))
        .layer(middleware::from_fn(flow_id_middleware))
        .with_state(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Refract listening on {}", addr);
    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = serve.await {
        tracing::error!("Server error: {}", e);
    }
    counters.log_summary();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
