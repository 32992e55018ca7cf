pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::limiter::RateLimitConfig;
#[cfg(feature = "cli")]
use clap::Parser;

/// Command line of the `server` binary.
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "server")]
#[command(about = "Rate limited HTTP server")]
pub struct ServerConfig {
    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Requests allowed per bucket and window
    #[arg(long, default_value = "10")]
    pub limit: u32,

    #[arg(long, default_value = "1000")]
    pub window_ms: u64,

    /// Requests allowed per client across all routes and window
    #[arg(long, default_value = "50")]
    pub global_limit: u32,

    #[arg(long, default_value = "1000")]
    pub global_window_ms: u64,

    /// Emit X-RateLimit-Reset (epoch) instead of X-RateLimit-Reset-After
    #[arg(long)]
    pub absolute: bool,

    /// Hold rate limited requests until their bucket resets instead of answering 429
    #[arg(long)]
    pub queue: bool,

    /// Route prefix whose bucket is shared by all clients
    #[arg(long = "shared-route")]
    pub shared_routes: Vec<String>,

    /// Route prefix exempt from the per-client global limit
    #[arg(long = "interaction-route", default_value = "/interactions")]
    pub interaction_routes: Vec<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.limit, std::time::Duration::from_millis(self.window_ms))
            .with_global_limit(
                self.global_limit,
                std::time::Duration::from_millis(self.global_window_ms),
            )
            .relative(!self.absolute)
            .with_shared_routes(self.shared_routes.clone())
            .with_interaction_routes(self.interaction_routes.clone())
    }
}

#[cfg(feature = "cli")]
impl crate::utils::validation::Validate for ServerConfig {
    fn validate(&self) -> crate::utils::error::Result<()> {
        use crate::utils::validation::{validate_non_empty_string, validate_positive_number};

        validate_non_empty_string("host", &self.host)?;
        validate_positive_number("limit", self.limit as usize, 1)?;
        validate_positive_number("window_ms", self.window_ms as usize, 1)?;
        validate_positive_number("global_limit", self.global_limit as usize, 1)?;
        validate_positive_number("global_window_ms", self.global_window_ms as usize, 1)?;
        Ok(())
    }
}
