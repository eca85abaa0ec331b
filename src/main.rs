use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use stratify::app::AppState;
use stratify::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use stratify::config::AppConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting Stratify chat server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let host = config.server.host.clone();
    let port = config.server.port;
    let allowed_origins = config.server.allowed_origins.clone();

    let state = match AppState::open(config) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };
    let client = web::Data::new(reqwest::Client::new());

    info!("{} assistant ready", state.service.product().display_name());
    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(client.clone())
            .route("/health", web::get().to(health))
            .configure(|cfg| stratify::api::configure(cfg, &allowed_origins))
    })
    .bind((host, port))?
    .run()
    .await
}
