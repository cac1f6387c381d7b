// Configuration management module
// TOML settings stored under the application home directory

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    CatalogConfig, Config, ConfigError, EmbeddingConfig, GenerationConfig, RetrievalConfig,
    ServerConfig, SessionConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
