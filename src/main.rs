use bracelet_link_lib::config::{AppConfig, CONFIG_PATH_ENV};
use bracelet_link_lib::logging;
use log::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        AppConfig::resolve_path(std::env::args().nth(1), std::env::var(CONFIG_PATH_ENV).ok());
    let config = AppConfig::load(&config_path).await?;

    if let Err(e) = logging::init(logging::parse_level(&config.log_level)) {
        eprintln!("Failed to initialize logger: {}", e);
    }
    info!("Using config {:?}", config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path).await {
            warn!("Could not write default config: {}", e);
        }
    }

    if let Err(e) = bracelet_link_lib::run(config).await {
        error!("Bracelet link failed: {}", e);
        return Err(e);
    }
    Ok(())
}
