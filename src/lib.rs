pub mod config;
pub mod core;
pub mod domain;
pub mod limiter;
pub mod server;
pub mod utils;

pub use config::{cli::LocalStorage, toml_config::PackConfig};

#[cfg(feature = "cli")]
pub use config::ServerConfig;

pub use core::{engine::PackEngine, pipeline::JarPipeline, resolver::Resolver};
pub use utils::error::{PackError, Result};
