use std::net::SocketAddr;
use std::sync::Arc;

use xp_ledger_backend::cache::RedisCache;
use xp_ledger_backend::config::Config;
use xp_ledger_backend::db::DatabaseProxy;
use xp_ledger_backend::state::AppState;
use xp_ledger_backend::workers::WorkerManager;
use xp_ledger_backend::{create_app, logging, seed};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set, every authenticated route will answer 401");
    }

    let db_proxy = match DatabaseProxy::from_env().await {
        Ok(proxy) => Some(proxy),
        Err(err) => {
            tracing::warn!(error = %err, "database proxy not initialized");
            None
        }
    };

    if let (Some(proxy), true) = (&db_proxy, config.seed_demo_course) {
        if let Err(err) = seed::seed_demo_course(proxy).await {
            tracing::warn!(error = %err, "failed to seed demo course");
        }
    }

    let cache = match config.redis_url.as_deref() {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => {
                tracing::info!("redis connected, rate limits shared across instances");
                Some(Arc::new(cache))
            }
            Err(err) => {
                tracing::warn!(error = %err, "redis unavailable, using in-process rate limits");
                None
            }
        },
        None => None,
    };

    let worker_manager = if let Some(ref proxy) = db_proxy {
        match WorkerManager::new(Arc::clone(proxy)).await {
            Ok(manager) => {
                if let Err(e) = manager.start().await {
                    tracing::error!(error = %e, "failed to start workers");
                }
                Some(manager)
            }
            Err(e) => {
                tracing::warn!(error = %e, "worker manager not initialized");
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(db_proxy.clone(), cache, &config);
    let app = create_app(state);

    let addr = config.bind_addr();
    tracing::info!(%addr, "xp ledger listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "bind listener failed");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }
    if let Some(ref proxy) = db_proxy {
        proxy.close().await;
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
