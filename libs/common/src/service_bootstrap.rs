//! Service bootstrap utilities
//!
//! Startup banner and logging initialization for the gateway binary.

use crate::logging::{self, LogConfig, LoggingConfig};
use tracing::info;

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name, also the log file prefix
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

const BANNER: &str = r#"
██████╗ ███████╗ ██████╗  ██████╗ ███████╗██████╗ ██╗   ██╗
██╔══██╗██╔════╝██╔════╝ ██╔═══██╗██╔════╝██╔══██╗██║   ██║
██████╔╝█████╗  ██║  ███╗██║   ██║███████╗██████╔╝██║   ██║
██╔══██╗██╔══╝  ██║   ██║██║   ██║╚════██║██╔══██╗╚██╗ ██╔╝
██║  ██║███████╗╚██████╔╝╚██████╔╝███████║██║  ██║ ╚████╔╝
╚═╝  ╚═╝╚══════╝ ╚═════╝  ╚═════╝ ╚══════╝╚═╝  ╚═╝  ╚═══╝
"#;

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    info!("{}", BANNER);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Initialize logging from the config file section
///
/// Log root directory priority:
/// 1. REGOSRV_LOG_DIR environment variable
/// 2. `logging.dir` from the config file
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    settings: &LoggingConfig,
    level_override: Option<&str>,
    no_color: bool,
) -> anyhow::Result<()> {
    let mut log_config = LogConfig::from_settings(&service.name, settings);
    if let Some(level) = level_override {
        log_config.level = logging::parse_level(level);
    }
    log_config.ansi = !no_color;

    logging::init_with_config(log_config)
}
