//! Rego 600/635 heat pump gateway
//!
//! Serial register protocol in, MQTT out.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use common::service_bootstrap::{init_logging, print_startup_banner, ServiceInfo};
use common::shutdown::wait_for_shutdown;
use common::ServiceArgs;
use regosrv::{runtime, RegoConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServiceArgs::parse();

    // Configuration errors stop the process before anything is opened
    let config = RegoConfig::load(&args.config)?;
    let profile = config.validate()?;

    let service_info = ServiceInfo::new(
        "regosrv",
        env!("CARGO_PKG_VERSION"),
        "Rego 600/635 heat pump gateway",
    );
    init_logging(
        &service_info,
        &config.logging,
        args.log_level.as_deref(),
        args.no_color,
    )?;
    if !args.no_color {
        print_startup_banner(&service_info);
    }

    if args.validate {
        info!(
            "Configuration valid: {} kW pump, aux stages {:?} kW",
            profile.capacity_kw, profile.aux_stages_kw
        );
        return Ok(());
    }

    info!(
        "Pump profile: {} kW, aux stages {}/{} kW, serial {} @ {}",
        profile.capacity_kw,
        profile.aux_stages_kw[0],
        profile.aux_stages_kw[1],
        config.serial.port,
        config.serial.baud_rate
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = wait_for_shutdown().await;
        info!("{} received, stopping", signal);
        trigger.cancel();
    });

    if let Err(e) = runtime::run(config, profile, shutdown).await {
        error!("Gateway stopped with error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
