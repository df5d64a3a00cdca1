//! Command-line argument parsing for the waymark client.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Waymark command-line arguments.
///
/// Backend, sync and logging flags override settings loaded from
/// `config.ron`; the rest describe the simulated viewer.
#[derive(Parser, Debug)]
#[command(name = "waymark", about = "Location-pinned message client")]
pub struct CliArgs {
    /// Backend root URL.
    #[arg(long)]
    pub api_url: Option<String>,

    /// World the viewer is logged into.
    #[arg(long, default_value_t = 301)]
    pub world: i32,

    /// Viewer display name.
    #[arg(long, default_value = "Wanderer")]
    pub viewer: String,

    /// Starting tile x.
    #[arg(long, default_value_t = 3222)]
    pub start_x: i32,

    /// Starting tile y.
    #[arg(long, default_value_t = 3218)]
    pub start_y: i32,

    /// Starting plane.
    #[arg(long, default_value_t = 0)]
    pub plane: i32,

    /// Stop after this many ticks (runs until interrupted when absent).
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Keep placements local instead of syncing them.
    #[arg(long)]
    pub no_sync: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref url) = args.api_url {
            self.sync.api_url = url.clone();
        }
        if args.no_sync {
            self.sync.sync_messages = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from([
            "waymark",
            "--api-url",
            "http://127.0.0.1:8080",
            "--no-sync",
        ]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.sync.api_url, "http://127.0.0.1:8080");
        assert!(!config.sync.sync_messages);
        // Non-overridden fields retain defaults
        assert_eq!(config.debug.log_level, "info");
        assert_eq!(config.network.timeout_seconds, 10);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::parse_from(["waymark"]));
        assert_eq!(config, original);
    }

    #[test]
    fn test_viewer_flags() {
        let args = CliArgs::parse_from([
            "waymark",
            "--world",
            "420",
            "--viewer",
            "Zezima",
            "--start-x",
            "3100",
            "--ticks",
            "50",
        ]);
        assert_eq!(args.world, 420);
        assert_eq!(args.viewer, "Zezima");
        assert_eq!(args.start_x, 3100);
        assert_eq!(args.start_y, 3218);
        assert_eq!(args.ticks, Some(50));
        assert!(args.config.is_none());
    }
}
