use std::sync::Arc;

use signout_kiosk::auth::AdminGate;
use signout_kiosk::config::Config;
use signout_kiosk::store::{KioskStore, MemoryStore, PgStore};
use signout_kiosk::{app, db, AppState};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let store: Arc<dyn KioskStore> = match &config.database_url {
        Some(url) => {
            let pg = db::connect(url, config.max_connections).await?;
            if config.run_migrations {
                db::migrate(&pg).await?;
            }
            Arc::new(PgStore::new(pg))
        }
        None => {
            log::warn!("DATABASE_URL not set, records are kept in memory and lost on exit");
            Arc::new(MemoryStore::default())
        }
    };
    let gate = AdminGate::new(&config.admin_password, config.session_ttl)
        .map_err(|err| anyhow::anyhow!("could not set up the admin gate: {:?}", err))?;

    let app = app(AppState {
        store,
        gate: Arc::new(gate),
    });

    log::info!("Starting sign-out kiosk server on http://{}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {}", err);
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
}
