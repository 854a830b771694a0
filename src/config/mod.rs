pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::{config_path, ConfigError, CONFIG_ENV_VAR};
pub use types::*;
