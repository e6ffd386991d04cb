use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ginx::config::Config;
use ginx::proxy::backend::BackendPool;
use ginx::server::Server;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting ginx proxy server");

    let config = Config::load()?;
    tracing::info!(
        port = config.server.port,
        async_method = %config.server.async_method,
        load_balancer = %config.server.load_balancer,
        upstream_servers = ?config.server.upstream_servers,
        "Config loaded successfully"
    );

    let pool = BackendPool::from_config(&config)?;
    let mut server = Server::bind(&config, pool)?;
    server.run()
}
