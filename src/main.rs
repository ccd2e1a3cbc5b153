use ringr_gate::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    membership::{MembershipState, PostgresMembershipStore},
    proxy::UpstreamProxy,
    session::{SessionState, SupabaseSessionProvider},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the membership directory, the session
/// provider and the upstream, then serves the gateway.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise verbose defaults for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ringr_gate=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Gateway starting in {:?} mode", config.env);

    // 3. Membership directory (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
    let memberships = Arc::new(PostgresMembershipStore::new(pool)) as MembershipState;

    // 4. Session provider (Supabase Auth cookies)
    let provider = SupabaseSessionProvider::new(&config);
    tracing::info!(cookie = provider.cookie_name(), "Session provider ready");
    let sessions = Arc::new(provider) as SessionState;

    // 5. Upstream page application
    let upstream = config.upstream_url.as_deref().map(|url| {
        tracing::info!(upstream = url, "Forwarding allowed requests");
        Arc::new(UpstreamProxy::new(url))
    });
    if upstream.is_none() {
        tracing::warn!("APP_UPSTREAM_URL not set; unmatched routes will return 404");
    }

    let listen_addr = config.listen_addr.clone();
    let app_state = AppState {
        sessions,
        memberships,
        upstream,
        config,
    };

    // 6. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&listen_addr)
        .await
        .expect("FATAL: Failed to bind LISTEN_ADDR.");

    tracing::info!("Listening on {}", listen_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
