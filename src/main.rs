//! Leaderboard Back binary entrypoint wiring the REST API, the cache and the recalculation scheduler.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use leaderboard_back::{
    config::AppConfig,
    dao::{
        cache::MemoryCache,
        leaderboard_store::{LeaderboardStore, MemoryLeaderboardStore},
    },
    routes,
    services::{scheduler::RecalculationScheduler, storage_supervisor},
    state::{AppState, SharedState},
};
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = connect_store().await?;

    let cache = MemoryCache::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let purge_task = cache.spawn_purge_task(config.cache_purge_interval, shutdown_rx.clone());

    let interval = config.recalculation_interval;
    let app_state = AppState::new(store, Arc::new(cache), config);

    let supervisor_task = tokio::spawn(storage_supervisor::run(app_state.clone(), shutdown_rx));
    let scheduler = RecalculationScheduler::from_state(&app_state).spawn(interval);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    let served = axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum");

    info!("stopping background tasks");
    scheduler.shutdown().await;
    let _ = shutdown_tx.send(true);
    for (name, task) in [("cache purge", purge_task), ("storage supervisor", supervisor_task)] {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "background task ended abnormally");
        }
    }

    served
}

/// Open the store selected by `STORE_BACKEND`. Failing to reach it is fatal.
async fn connect_store() -> anyhow::Result<Arc<dyn LeaderboardStore>> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "mongo".into());
    match backend.as_str() {
        "memory" => {
            warn!("using in-memory store; scores are lost on restart");
            Ok(Arc::new(MemoryLeaderboardStore::new()))
        }
        "mongo" => connect_mongo().await,
        other => bail!("unknown STORE_BACKEND `{other}` (expected `mongo` or `memory`)"),
    }
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> anyhow::Result<Arc<dyn LeaderboardStore>> {
    use leaderboard_back::dao::leaderboard_store::mongodb::{MongoConfig, MongoLeaderboardStore};

    let config = MongoConfig::from_env()
        .await
        .context("parsing MongoDB configuration")?;
    let store = MongoLeaderboardStore::connect(config)
        .await
        .context("connecting to MongoDB")?;
    info!("connected to MongoDB");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongo-store"))]
async fn connect_mongo() -> anyhow::Result<Arc<dyn LeaderboardStore>> {
    bail!("STORE_BACKEND=mongo requires the `mongo-store` feature")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
