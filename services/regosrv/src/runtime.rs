//! Gateway runtime
//!
//! Wires the serial engine, poll loop, energy persistence, availability
//! service and MQTT driver together and stops them in order:
//!
//! 1. poll loop returns (between exchanges)
//! 2. final energy snapshot
//! 3. availability -> Disconnected, `offline`, clean MQTT disconnect
//! 4. serial port closed

use errors::{RegoError, RegoResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::mqtt::Backoff;
use crate::bus::{run_driver, LinkEvent, MqttBus, Publisher, SharedBus, Topics};
use crate::config::RegoConfig;
use crate::core::availability::{run_availability, AvailabilityMachine};
use crate::core::energy::{run_persistence, EnergyAccumulator, SnapshotStore};
use crate::core::poller::PollScheduler;
use crate::core::protocol::{Command, FrameCodec, RegoCodec, SerialProtocolEngine};
use crate::core::registers::PumpProfile;
use crate::core::transport::{shared, SerialTransport, SharedTransport, Transport};

/// Pending control commands
pub const COMMAND_QUEUE: usize = 16;
const LINK_QUEUE: usize = 16;
/// Grace period for each shutdown step that talks to the broker
const SHUTDOWN_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Running MQTT driver task
#[derive(Debug)]
pub struct DriverHandle {
    pub task: JoinHandle<()>,
    pub cancel: CancellationToken,
}

/// Assembled gateway, independent of the concrete serial port and broker
#[derive(Debug)]
pub struct Gateway {
    config: RegoConfig,
    profile: PumpProfile,
    transport: SharedTransport,
    codec: Arc<dyn FrameCodec>,
    bus: SharedBus,
    links: mpsc::Receiver<LinkEvent>,
    commands: mpsc::Receiver<Command>,
    driver: Option<DriverHandle>,
}

impl Gateway {
    pub fn new(
        config: RegoConfig,
        profile: PumpProfile,
        transport: SharedTransport,
        bus: SharedBus,
        links: mpsc::Receiver<LinkEvent>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            config,
            profile,
            transport,
            codec: Arc::new(RegoCodec),
            bus,
            links,
            commands,
            driver: None,
        }
    }

    pub fn with_driver(mut self, driver: DriverHandle) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Run until `shutdown` fires or the serial link becomes unusable
    pub async fn run(self, shutdown: CancellationToken) -> RegoResult<()> {
        let Gateway {
            config,
            profile,
            transport,
            codec,
            bus,
            links,
            commands,
            driver,
        } = self;
        let topics = Topics::new(&config.mqtt.topic_prefix);

        // Energy state survives restarts
        let store = SnapshotStore::new(&config.energy.snapshot_path);
        let energy = EnergyAccumulator::new(
            store.load(),
            config.energy.integration,
            Duration::from_secs(config.energy.max_gap_secs),
        );
        let energy_rx = energy.subscribe();
        let persist_cancel = CancellationToken::new();
        let persistence = tokio::spawn(run_persistence(
            store.clone(),
            energy_rx.clone(),
            Duration::from_secs(config.energy.persist_interval_secs),
            persist_cancel.clone(),
        ));

        // Availability
        let machine = AvailabilityMachine::new(Arc::clone(&bus), topics.availability());
        let availability_rx = machine.subscribe();
        let availability_cancel = CancellationToken::new();
        let availability = tokio::spawn(run_availability(
            machine,
            links,
            Duration::from_secs(config.availability.heartbeat_secs),
            availability_cancel.clone(),
        ));

        // Serial line
        {
            let mut line = transport.lock().await;
            if let Err(e) = line.connect().await {
                warn!("Serial port not ready: {} (retried on first exchange)", e);
            }
        }
        let engine = SerialProtocolEngine::new(
            Arc::clone(&transport),
            codec,
            config.protocol.engine_config(),
        );

        let publisher = Publisher::new(Arc::clone(&bus), topics, availability_rx);
        let scheduler = PollScheduler::new(
            engine,
            publisher,
            &profile,
            energy,
            commands,
            config.polling.clone(),
        );

        // 1. Poll loop
        let result = scheduler.run(shutdown).await;
        match &result {
            Ok(()) => info!("Shutting down"),
            Err(e) => error!("Gateway stopping on error [{}]", e.error_code()),
        }

        // 2. Final energy snapshot
        persist_cancel.cancel();
        if let Err(e) = persistence.await {
            warn!("Energy persistence task ended abnormally: {}", e);
        }
        let snapshot = energy_rx.borrow().clone();
        match store.save(&snapshot) {
            Ok(()) => info!("Energy total saved: {:.3} kWh", snapshot.accumulated_kwh),
            Err(e) => error!("Final energy snapshot failed: {}", e),
        }

        // 3. Offline, then a clean disconnect
        availability_cancel.cancel();
        let abort = availability.abort_handle();
        match tokio::time::timeout(SHUTDOWN_STEP_TIMEOUT, availability).await {
            Ok(Ok(state)) => debug!("Availability final state: {}", state),
            Ok(Err(e)) => warn!("Availability task ended abnormally: {}", e),
            Err(_) => {
                warn!("Availability did not stop in time");
                abort.abort();
            },
        }

        match tokio::time::timeout(SHUTDOWN_STEP_TIMEOUT, bus.disconnect()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!("MQTT disconnect failed: {}", e),
            Err(_) => warn!("MQTT disconnect timed out"),
        }

        if let Some(DriverHandle { task, cancel }) = driver {
            cancel.cancel();
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_STEP_TIMEOUT, task).await.is_err() {
                warn!("MQTT driver did not stop in time");
                abort.abort();
            }
        }

        // 4. Serial port
        let mut line = transport.lock().await;
        let stats = line.stats().await;
        info!("Closing {} line: {}", line.transport_type(), stats);
        if let Err(e) = line.close().await {
            warn!("Serial port close failed: {}", e);
        }
        drop(line);

        info!("Gateway stopped");
        result
    }
}

/// Build the production gateway (serial port + MQTT broker) and run it
pub async fn run(
    config: RegoConfig,
    profile: PumpProfile,
    shutdown: CancellationToken,
) -> RegoResult<()> {
    let serial = SerialTransport::new(config.serial.clone()).map_err(RegoError::from)?;
    let transport = shared(Box::new(serial));

    let topics = Topics::new(&config.mqtt.topic_prefix);
    let (bus, eventloop) = MqttBus::new(&config.mqtt, &topics);
    let (link_tx, link_rx) = mpsc::channel(LINK_QUEUE);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

    let driver_cancel = CancellationToken::new();
    let backoff = Backoff::new(
        Duration::from_millis(config.mqtt.reconnect_initial_ms),
        Duration::from_millis(config.mqtt.reconnect_max_ms),
    );
    let task = tokio::spawn(run_driver(
        eventloop,
        bus.client().clone(),
        topics,
        link_tx,
        command_tx,
        backoff,
        driver_cancel.clone(),
    ));
    info!(
        "MQTT broker {}:{} as {}",
        config.mqtt.host, config.mqtt.port, config.mqtt.client_id
    );

    Gateway::new(config, profile, transport, Arc::new(bus), link_rx, command_rx)
        .with_driver(DriverHandle {
            task,
            cancel: driver_cancel,
        })
        .run(shutdown)
        .await
}
