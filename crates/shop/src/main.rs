//! Voucher Store - digital goods shop service.
//!
//! Serves payment webhooks and the customer purchase API, and runs the
//! periodic replenishment and cleanup sweeps.
//!
//! # Architecture
//!
//! - Axum web framework
//! - `PostgreSQL` (or process memory for local demos) for purchases and stock
//! - BTCPay Server webhooks and manual bank transfer confirmation
//! - Email and ntfy notifications
//!
//! Migrations are not run on startup. Run them explicitly via
//! `vs-cli migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::Router;
use sentry::integrations::tracing as sentry_tracing;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voucher_store_shop::config::{LogFormat, ShopConfig, StoreBackend};
use voucher_store_shop::db::{self, MemoryStore, PgStore, Store};
use voucher_store_shop::payment::{BtcPay, PaymentMethods, Sepa};
use voucher_store_shop::routes;
use voucher_store_shop::services::{
    EmailService, FulfilmentEngine, Notifier, NtfyClient, RandomIds, SystemClock, load_catalog,
    spawn_cleanup_task,
};
use voucher_store_shop::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ShopConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            // Purchases carry customer email addresses
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn payment_methods(config: &ShopConfig) -> PaymentMethods {
    let mut methods = PaymentMethods::new();
    if let Some(btcpay) = &config.btcpay {
        methods = methods.with(BtcPay::new(btcpay));
    }
    if let Some(sepa) = &config.sepa {
        methods = methods.with(Sepa::new(sepa.account.clone()));
    }
    methods
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ShopConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voucher_store_shop=info,voucher_store=info,tower_http=debug".into());

    let is_json = config.log_format == LogFormat::Json;
    let json_layer = is_json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let catalog = load_catalog(&config.catalog_path)
        .await
        .expect("Failed to load catalog");
    tracing::info!(
        variants = catalog.variants().count(),
        "Catalog loaded"
    );

    let store: Arc<dyn Store> = match &config.backend {
        StoreBackend::Postgres(url) => {
            let pool = db::create_pool(url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, all data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let email = config
        .email
        .as_ref()
        .map(EmailService::new)
        .transpose()
        .expect("Failed to configure SMTP");
    let ntfy = NtfyClient::new(config.ntfy_base_url.clone()).expect("Failed to create ntfy client");

    let engine = FulfilmentEngine::new(
        store,
        Arc::new(catalog),
        Arc::new(SystemClock),
        Arc::new(RandomIds),
        Arc::new(Notifier::new(email, ntfy)),
    );
    let methods = payment_methods(&config);
    tracing::info!(methods = ?methods, "Payment methods configured");

    let _cleanup = spawn_cleanup_task(engine.clone(), config.cleanup_interval);

    let state = AppState::new(engine, methods);

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("voucher store listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
