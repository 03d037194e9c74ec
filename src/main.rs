use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::signal;

use roomhost::auth::FileCredentialStore;
use roomhost::bridge::{bridge_routes, BridgeConnections};
use roomhost::config::Config;
use roomhost::devserver::{self, DevState};
use roomhost::logging;
use roomhost::session::{SessionDriver, SessionEvent, SessionHandle, SessionStateMachine};
use roomhost::surface::LoggingSurface;
use roomhost::{AppState, ContentBridge, RoomApiClient};

/// Room session host
#[derive(Parser, Debug)]
#[command(name = "roomhost")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the in-memory development room API
    DevServer,
    /// Run the session host with a headless surface, driven from stdin
    Host,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let args = Args::parse();
    let config = Config::from_env()?;
    tracing::info!(api_base = %config.api_base, trusted_origin = %config.trusted_origin, "Configuration loaded");

    match args.command {
        Command::DevServer => run_dev_server(config).await,
        Command::Host => run_host(config).await,
    }
}

async fn run_dev_server(config: Config) -> anyhow::Result<()> {
    let app = devserver::create_router(DevState::from_config(&config));

    let addr: SocketAddr = config.dev_server_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Development room server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Development room server stopped");
    Ok(())
}

async fn run_host(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(FileCredentialStore::new(config.credentials_path.clone()));
    let machine = SessionStateMachine::restore(store);
    let api = RoomApiClient::new(&config)?;
    let bridge = ContentBridge::new(&config)?;
    let connections = Arc::new(BridgeConnections::new());

    let (driver, handle, mut events) = SessionDriver::new(
        machine,
        api,
        bridge,
        Box::new(LoggingSurface),
        connections.clone(),
    );
    let driver_task = tokio::spawn(driver.run());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.bridge_port));
    let state = AppState::new(handle.clone(), connections);
    let app = Router::new().merge(bridge_routes().with_state(state));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Bridge socket listening");

    tokio::spawn(read_controls(handle.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.shutdown().await.ok();
    driver_task.await?;
    tracing::info!("Host stopped");
    Ok(())
}

/// Native controls for a headless host: one command per stdin line.
async fn read_controls(handle: SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        let result = match (parts.next(), parts.next()) {
            (Some("create"), code) => handle.create_room(code.unwrap_or("")).await,
            (Some("join"), code) => handle.join_room(code.unwrap_or("")).await,
            (Some("leave"), _) => handle.leave_room().await,
            (Some("logout"), _) => handle.logout().await,
            (Some("nav"), Some(url)) => handle.request_navigation(url).await.map(|allowed| {
                tracing::info!(url = %url, allowed, "Navigation decision");
            }),
            (Some("loaded"), Some(url)) => handle.page_finished(url).await,
            (None, _) => Ok(()),
            (Some(other), _) => {
                tracing::warn!(command = %other, "Unknown command");
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Session is no longer running");
            break;
        }
    }
}

fn log_event(event: &SessionEvent) {
    match serde_json::to_string(event) {
        Ok(json) => tracing::info!(event = %json, "Session event"),
        Err(e) => tracing::warn!(error = %e, "Unserializable session event"),
    }
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
