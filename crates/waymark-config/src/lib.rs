//! Configuration for the waymark client.
//!
//! Settings persist to disk as a RON file, including the credential issued at
//! registration. CLI flags override loaded values, and serialization stays
//! forward/backward compatible through `#[serde(default)]`.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AccountConfig, Config, DebugConfig, DisplayConfig, NetworkConfig, SelectionConfig, SyncConfig,
    CONFIG_FILE_NAME,
};
pub use error::ConfigError;
