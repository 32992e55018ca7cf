use anyhow::Context;
use clap::Parser;
use netty_pack::limiter::SequentialRateLimiter;
use netty_pack::server::{self, AppState};
use netty_pack::utils::{logger, validation::Validate};
use netty_pack::ServerConfig;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    logger::init_json_logger(config.verbose);

    tracing::info!("Starting server");
    if config.verbose {
        tracing::debug!("Server config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code().max(1));
    }

    let limiter = SequentialRateLimiter::new(config.rate_limit_config());
    let state = AppState::new(limiter, config.queue);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    server::serve(listener, state, server::shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}
