use axum::routing::get;
use axum::Router;
use pong_server::config::{GameConfig, ServerConfig};
use pong_server::game_loop::{run_game_loop, GameCommand};
use pong_server::ws::{ws_handler, AppState};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::default();
    let game_config = GameConfig::default();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = game_config.validate() {
        eprintln!("Invalid game configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);

    // Spawn game loop
    let loop_tx = game_tx.clone();
    tokio::spawn(async move {
        run_game_loop(loop_tx, game_rx, config, game_config).await;
    });

    // Axum app
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { game_tx });

    tracing::info!("Starting pong server on {}", listen_addr);
    println!("Pong server listening on {}", listen_addr);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
