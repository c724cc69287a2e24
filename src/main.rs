// plantpulse-ingest-core/src/main.rs
// Service entry point

use std::sync::Arc;

use plantpulse_ingest_core::config::IngestConfig;
use plantpulse_ingest_core::runtime::Runtime;
use plantpulse_ingest_core::web::server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = IngestConfig::from_env();
    log::info!(
        "starting {} v{} environment={} region={}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.environment,
        config.object_store.region
    );

    let runtime = Arc::new(Runtime::bootstrap(config).await?);
    server::run(runtime).await?;
    log::info!("shutdown complete");
    Ok(())
}
