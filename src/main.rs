#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use sketchparty_server::config;
use sketchparty_server::db::InMemoryGateway;
use sketchparty_server::engine::RoomEngine;
use sketchparty_server::fabric::BroadcastFabric;
use sketchparty_server::kv::InMemoryKv;
use sketchparty_server::logging;
use sketchparty_server::state::RoomStateStore;
use sketchparty_server::websocket::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;

/// Sketch Party -- real-time drawing-and-guessing room server
#[derive(Parser, Debug)]
#[command(name = "sketchparty-server")]
#[command(about = "Real-time multiplayer drawing-and-guessing room server over WebSockets")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json and the environment; defaults
    // otherwise.
    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    if cli.validate_config {
        println!("Configuration validation passed");
        println!();
        println!("Configuration summary:");
        println!("  Port: {}", cfg.port);
        println!("  Round seconds: {}", cfg.game.round_seconds);
        println!("  Rounds per game: {}", cfg.game.max_rounds);
        println!("  Max players per room: {}", cfg.game.max_players);
        println!("  Disconnect grace: {}s", cfg.game.disconnect_grace_seconds);
        println!(
            "  Token secret configured: {}",
            !cfg.auth.token_secret.is_empty()
        );
        return Ok(());
    }

    // Initialize logging from config.
    logging::init_with_config(&cfg.logging);

    if cfg.auth.token_secret.is_empty() {
        tracing::warn!("auth.token_secret is empty; every socket handshake will be rejected");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Sketch Party server");

    // Composition root. The in-memory KV and gateway serve a single-instance
    // deployment; multi-instance deployments plug networked implementations
    // of the same traits in here.
    let kv = Arc::new(InMemoryKv::new());
    let gateway = Arc::new(InMemoryGateway::new());
    let store = Arc::new(RoomStateStore::new(
        kv,
        cfg.game.clone(),
        cfg.storage.clone(),
    ));
    let fabric = Arc::new(BroadcastFabric::new());
    let engine = RoomEngine::new(store, gateway, fabric);

    let app_state = Arc::new(AppState {
        engine,
        config: Arc::clone(&cfg),
    });

    let router = websocket::create_router(&cfg.cors_origins).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.cors_origins,
        "Server started - rooms: /ws/rooms/{{CODE}}/, lobby: /ws/lobby/"
    );

    axum::serve(listener, router).await?;

    Ok(())
}
