//! Persistent user preferences.

mod io;
mod types;

pub use io::{config_path, load_from, load_or_default, save, save_to};
pub use types::{AppConfig, ConfigError, NamingSettings};
