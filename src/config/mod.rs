// Configuration management module
// TOML-backed settings passed explicitly into every component

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};

pub use settings::{
    BatchConfig, Config, ConfigError, GenerationConfig, IndexConfig, OllamaConfig,
    RetrievalConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
