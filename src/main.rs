//! Memloop server
//!
//! Hosts the memory orchestration core behind a small HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memloop::config::Config;
use memloop::core::{Collaborators, InstanceHost, SystemClock};
use memloop::providers::{Provider, Retrying};
use memloop::routes::{self, AppState};
use memloop::storage::{db, SqliteCheckpointStore, SqliteMemoryStore, SqliteSessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memloop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let pool = db::open(&config.db_path()).await?;
    let long_term = Arc::new(SqliteMemoryStore::new(pool.clone()));
    let sessions = Arc::new(SqliteSessionStore::new(pool.clone()));
    let checkpoints = Arc::new(SqliteCheckpointStore::new(pool));

    let provider = Provider::from_name(&config.provider, &config)?;
    if config.provider.eq_ignore_ascii_case("openai") && config.openai_api_key.is_none() {
        tracing::error!("OPENAI_API_KEY is not set; completions will be refused");
    }
    let completion = Arc::new(Retrying::new(provider, config.retry));

    let host = Arc::new(InstanceHost::new(
        config.policy,
        config.completion,
        Collaborators {
            completion,
            long_term: long_term.clone(),
            checkpoints,
        },
        Arc::new(SystemClock),
    ));

    tracing::info!(
        "Consolidating every {} inputs or {} minutes via {}",
        config.policy.size_threshold,
        config.policy.time_threshold_minutes,
        config.provider
    );

    let state = AppState {
        host: host.clone(),
        long_term,
        sessions,
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Memloop API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    host.shutdown().await;
    tracing::info!("All instances stopped");

    Ok(())
}
