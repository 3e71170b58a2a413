use redlite::config::ServerConfig;
use redlite::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse(std::env::args().skip(1)).map_err(anyhow::Error::msg)?;
    let (_addr, accept_loop) = server::start(config).await?;
    accept_loop.await?;
    Ok(())
}
