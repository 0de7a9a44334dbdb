use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use shop_checkout as app;
use shop_checkout::session::{InMemorySessionStore, RedisSessionStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = app::config::load_config().context("loading configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("connecting to database")?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let sessions: Arc<dyn SessionStore> = if cfg.uses_redis_sessions() {
        // Construction only; connections are opened per lookup
        let client = redis::Client::open(cfg.redis_url.clone()).context("opening redis client")?;
        info!("Using redis session store at {}", cfg.redis_url);
        Arc::new(RedisSessionStore::new(
            Arc::new(client),
            cfg.session_namespace.clone(),
            cfg.session_ttl(),
        ))
    } else {
        if cfg.is_production() {
            warn!("In-memory session store in production; sessions are not shared between instances");
        }
        Arc::new(InMemorySessionStore::new())
    };

    let gateway = app::services::StripeGateway::new(cfg.stripe.clone())
        .context("building Stripe client")?;
    let checkout = app::services::CheckoutService::new(
        app::repositories::OrderRepository::new(db.clone()),
        Arc::new(gateway),
        cfg.stripe.currency.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;

    let state = app::AppState {
        db,
        config: cfg,
        sessions,
        checkout,
    };
    let router = app::app_router(state);

    info!("shop-checkout listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
