/// Inline citation marker parsing and linking.
pub mod markers;
/// TOML + environment configuration.
pub mod toml_config;

pub use toml_config::{ConfigError, SwarmConfig};
