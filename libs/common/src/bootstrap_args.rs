//! Command-line arguments for the gateway service

use std::path::PathBuf;

#[cfg(feature = "cli")]
use clap::Parser;

/// Service startup arguments
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Configuration file (YAML)
    #[cfg_attr(
        feature = "cli",
        clap(
            short = 'c',
            long,
            default_value = "config/regosrv.yaml",
            env = "REGOSRV_CONFIG"
        )
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[cfg_attr(feature = "cli", clap(short = 'l', long))]
    pub log_level: Option<String>,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config/regosrv.yaml"),
            log_level: None,
            no_color: false,
            validate: false,
        }
    }
}

impl ServiceArgs {
    /// Effective level: CLI flag first, then the config file value
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        self.log_level.as_deref().unwrap_or(configured)
    }
}
