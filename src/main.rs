mod analyzer;
mod config;
mod fetcher;
mod market_data;
mod model;
mod normalizer;
mod parser;
mod pipeline;
mod plot;
mod storage;
mod utils;

use config::{AppConfig, load_config};
use fetcher::YahooClient;
use market_data::MarketData;
use pipeline::process_ticker;
use storage::{DiskStore, SqliteStorage};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Panic occurred: {:?}", panic_info);
    }));

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config: Arc<AppConfig> = match load_config(&config_path) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error ({}): {}", config_path, e);
            return;
        }
    };

    let client = match YahooClient::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };
    let market = MarketData::new(Arc::new(client));

    let cache = match DiskStore::new(&config.cache_dir) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open cache folder {}: {}", config.cache_dir, e);
            return;
        }
    };

    let today = chrono::Local::now().date_naive();
    info!("Tickers to process: {}", config.tickers.len());

    let mut failures = 0;
    for ticker in &config.tickers {
        for frequency in &ticker.frequencies {
            match process_ticker(&market, &cache, &config, &ticker.symbol, *frequency, today).await {
                Ok(report) => info!(
                    "{} ({}): {} of {} dates analyzed, {} significant",
                    report.ticker, report.frequency, report.analyzed, report.candidates, report.significant
                ),
                Err(e) => {
                    failures += 1;
                    warn!("Ticker {} ({}) failed: {}", ticker.symbol, frequency, e);
                }
            }
        }
    }

    if config.upload_to_database {
        info!("Importing figures into {}...", config.database_path);
        match SqliteStorage::new(&config.database_path) {
            Ok(db) => {
                if let Err(e) = db.import_from_disk(&cache) {
                    warn!("Figure import failed: {}", e);
                }
            }
            Err(e) => warn!("Failed to open database: {}", e),
        }
    }

    info!("Done, {} failed runs", failures);
}
