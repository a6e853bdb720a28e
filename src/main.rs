//! Process entry point: parse configuration, restore persisted rooms, bind
//! the HTTP/WebSocket listener, and run until a shutdown signal, snapshotting
//! every live room on the way out (spec §6 exit codes, §4.5).

use std::sync::Arc;

use collabpad::config::Settings;
use collabpad::net::{self, AppState};
use collabpad::registry::Registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = Settings::parse()?;
    tracing::info!(?settings, "starting collabpad");

    let registry = Registry::new(Arc::new(settings.clone()));
    registry.restore().await;

    let state = Arc::new(AppState {
        registry,
        settings: Arc::new(settings.clone()),
    });

    spawn_sweeper(state.clone());

    let listener = tokio::net::TcpListener::bind(&settings.listen_address).await?;
    tracing::info!(address = %settings.listen_address, "listening");

    let app = net::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, persisting all rooms");
    state.registry.persist_all().await;

    Ok(())
}

fn spawn_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            state.registry.sweep().await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
