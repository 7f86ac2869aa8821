mod config;
mod db;
mod error;
mod handlers;
mod ids;
mod models;
mod server;
mod voting;

use config::Config;
use db::Database;
use log::{error, info};
use server::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load .env before the logger so RUST_LOG can come from it
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            env_logger::init();
            error!("Invalid configuration: {}", e);
            return;
        }
    };
    env_logger::init();

    // Initialize database
    let database = match Database::new(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    info!("Connected to {}", config.database_url);

    let state = AppState::new(Arc::clone(&database), &config);
    if let Err(why) = server::run(state, &config).await {
        error!("Server error: {:?}", why);
    }

    database.close().await;
    info!("Database connections closed");
}
