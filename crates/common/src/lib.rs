pub mod config;
pub mod db;
pub mod error;
pub mod settings;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use settings::{AlertThreshold, Settings, SettingsStore};
pub use source::{MarketDataSource, Notifier};
pub use types::*;
