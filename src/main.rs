mod config;
mod error;
mod extract;
mod fetch;
mod monitor;
mod notify;
mod seen;
mod stock;
mod text;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::fetch::HttpFetcher;
use crate::monitor::Monitor;
use crate::notify::DiscordWebhook;
use crate::seen::SeenDatabase;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(if cfg!(debug_assertions) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = Config::from_env()?;
    let client = reqwest::Client::builder().build()?;
    let fetcher = Arc::new(HttpFetcher::new(client.clone()));
    let notifier = Arc::new(DiscordWebhook::new(
        client,
        config.webhook_url.clone(),
        config.notify_delay,
    ));

    let mut db = SeenDatabase::load(&config.database_path).await;
    info!(
        "Loaded {} seen products, checking {} sites",
        db.len(),
        config.sites.len()
    );

    let report = Monitor::new(fetcher, notifier, &config)
        .run(&config.sites, &mut db)
        .await;
    for (site, e) in report.failed_sites() {
        error!("{} was skipped this run: {}", site, e);
    }
    info!(
        "Run finished: {} new products, {} failed deliveries",
        report.new_products(),
        report.failed_deliveries()
    );

    db.save(&config.database_path).await?;
    Ok(())
}
