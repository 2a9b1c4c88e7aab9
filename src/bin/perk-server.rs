use std::sync::Arc;

use tracing::info;

use perk::config::PerkConfig;
use perk::dispenser::Dispenser;
use perk::error::logging;
use perk::http::{self, AppState};
use perk::store::{MemoryStore, TokenStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_from_env().map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;

    info!("Starting perk token dispenser");

    dotenvy::dotenv().ok();

    let mut config = match std::env::var("PERK_CONFIG") {
        Ok(path) => PerkConfig::from_file(path)?,
        Err(_) => PerkConfig::default(),
    };
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.store.database_url = Some(url);
    }
    config.validate()?;

    let store = build_store(&config).await?;
    let dispenser = Dispenser::new(store, &config)?;

    // Opt-in bootstrap so a fresh deployment has tokens to hand out
    let bootstrap = std::env::var("PERK_GENERATE_BATCH")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    if bootstrap {
        let summary = dispenser.generate_default_batch().await?;
        info!(
            batch_number = summary.batch_number,
            size = summary.size,
            winners = summary.winners,
            "bootstrap batch generated"
        );
    }

    let state = Arc::new(AppState {
        dispenser,
        server: config.server.clone(),
    });

    http::run(state).await?;
    Ok(())
}

async fn build_store(config: &PerkConfig) -> anyhow::Result<Arc<dyn TokenStore>> {
    #[cfg(feature = "postgres")]
    if config.store.database_url.is_some() {
        let store = perk::store::PgStore::connect(&config.store).await?;
        store.ensure_schema().await?;
        info!("Using PostgreSQL store");
        return Ok(Arc::new(store));
    }

    if config.store.database_url.is_some() {
        tracing::warn!(
            "database_url is set but the postgres feature is not compiled in; using in-memory store"
        );
    }
    info!("Using in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}
