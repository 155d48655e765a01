use clap::Parser;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use dropline::{
    cli::{self, Cli, Commands},
    config::Config,
    relay::ProgressSettings,
    routes::build_router,
    websocket::SignalingState,
};

#[tokio::main]
async fn main() {
    // Default to INFO level if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Cli::parse();

    // Check if running as a debug client
    if let Some(command) = args.command {
        let result = match command {
            Commands::Listen { url, user_id } => cli::run_listen_client(url, user_id).await,
            Commands::Send {
                url,
                user_id,
                to,
                files,
            } => cli::run_send_client(url, user_id, to, files).await,
        };
        if let Err(e) = result {
            error!("client error: {e}");
            std::process::exit(1);
        }
        return;
    }

    // Otherwise, run as server
    let config = Config::from_env();
    info!("starting dropline relay on port {}", config.port);
    info!(
        "progress cadence: step {} every {:?}",
        config.progress_step, config.progress_interval
    );

    let state = SignalingState::new(ProgressSettings {
        step: config.progress_step,
        tick: config.progress_interval,
    });

    let app = build_router(state)
        .fallback_service(ServeDir::new(&config.public_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("dropline listening on {}", addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
