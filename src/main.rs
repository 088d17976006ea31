mod config;
mod model;
mod relay;
mod web;

use actix_files as fs;
use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::info;

use config::RelayConfig;
use relay::ChatRelay;
use web::routes;

// App state structure
pub struct AppState {
    relay: ChatRelay,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Appu chat relay");

    let config = RelayConfig::from_env();
    let relay = ChatRelay::from_config(&config);
    info!(
        "Chat relay ready ({})",
        if relay.is_online() { "online" } else { "offline" }
    );

    let app_state = Data::new(AppState { relay });
    let static_dir = config.static_dir.clone();
    if let Some(dir) = &static_dir {
        info!("Serving site files from {}", dir.display());
    }

    info!("Listening on {}:{}", config.host, config.port);

    // Start web server
    HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(routes::configure);

        match &static_dir {
            Some(dir) => app.service(fs::Files::new("/", dir.clone()).index_file("index.html")),
            None => app,
        }
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("HTTP server terminated with an error")
}
