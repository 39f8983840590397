//! Poll scheduler
//!
//! Sole user of the protocol engine. Every cycle reads the every-cycle
//! registers and display rows, settings every Kth cycle, then derives power
//! and energy. When the cycle budget runs out the unread remainder is carried
//! over and read first in the next cycle, so a slow line never starves the
//! tail of the list.
//!
//! Between cycles the display rows are re-read every `display_interval_secs`
//! so front panel text follows the controller closely.
//!
//! Control commands and cancellation are only looked at between exchanges.

use chrono::Utc;
use errors::RegoResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::energy::{EnergyAccumulator, EnergyState, PowerModel};
use super::protocol::{Command, RegisterReading, SerialProtocolEngine};
use super::registers::{active_registers, Category, PumpProfile, Rate, RegisterDescriptor};
use crate::bus::Publisher;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub period_secs: u64,
    /// Settings are read every `slow_every` cycles
    pub slow_every: u32,
    /// Share of the period available for exchanges
    pub budget_ratio: f64,
    /// Display refresh while waiting for the next cycle
    pub display_interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period_secs: 15,
            slow_every: 4,
            budget_ratio: 0.8,
            display_interval_secs: 1,
        }
    }
}

impl PollConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn budget(&self) -> Duration {
        self.period().mul_f64(self.budget_ratio.clamp(0.0, 1.0))
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_secs(self.display_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollItem {
    Register(&'static RegisterDescriptor),
    Display(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { polled: usize, deferred: usize },
    Cancelled,
}

#[derive(Debug)]
pub struct PollScheduler {
    engine: SerialProtocolEngine,
    publisher: Publisher,
    config: PollConfig,
    registers: Vec<&'static RegisterDescriptor>,
    display_rows: Vec<u8>,
    power: PowerModel,
    energy: EnergyAccumulator,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    carry_over: VecDeque<PollItem>,
    /// Latest load-register readings by register id
    load_states: HashMap<u16, RegisterReading>,
    cycle: u64,
}

impl PollScheduler {
    pub fn new(
        engine: SerialProtocolEngine,
        publisher: Publisher,
        profile: &PumpProfile,
        energy: EnergyAccumulator,
        commands: mpsc::Receiver<Command>,
        config: PollConfig,
    ) -> Self {
        let active = active_registers(profile);
        let registers: Vec<_> = active.iter().copied().filter(|d| d.is_polled()).collect();
        let display_rows = active
            .iter()
            .filter(|d| d.category == Category::DisplayRow)
            .map(|d| d.id as u8)
            .collect();
        let power = PowerModel::new(profile.power, config.period() * 2);

        info!(
            "Polling {} registers every {}s (settings every {} cycles)",
            registers.len(),
            config.period_secs,
            config.slow_every
        );

        Self {
            engine,
            publisher,
            config,
            registers,
            display_rows,
            power,
            energy,
            commands,
            commands_open: true,
            carry_over: VecDeque::new(),
            load_states: HashMap::new(),
            cycle: 0,
        }
    }

    pub fn energy(&self) -> watch::Receiver<EnergyState> {
        self.energy.subscribe()
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn engine(&self) -> &SerialProtocolEngine {
        &self.engine
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn carried_over(&self) -> usize {
        self.carry_over.len()
    }

    /// Items due in the given cycle, in catalog order
    fn due_items(&self, cycle: u64) -> Vec<PollItem> {
        let slow_due = cycle % u64::from(self.config.slow_every.max(1)) == 0;
        self.registers
            .iter()
            .filter(|d| d.rate == Rate::EveryCycle || slow_due)
            .map(|d| PollItem::Register(*d))
            .chain(self.display_rows.iter().map(|row| PollItem::Display(*row)))
            .collect()
    }

    /// Run cycles until cancelled or a fatal error
    ///
    /// Engine counters are logged on the way out, whichever way that is.
    pub async fn run(mut self, cancel: CancellationToken) -> RegoResult<()> {
        let result = self.run_cycles(&cancel).await;
        let stats = self.engine.stats();
        match &result {
            Ok(()) => info!("Poll loop stopped after {} cycles: {}", self.cycle, stats),
            Err(e) => error!(
                "Poll loop aborted after {} cycles: {}, {} requests failing: {}",
                self.cycle,
                stats,
                self.engine.consecutive_failures(),
                e
            ),
        }
        result
    }

    async fn run_cycles(&mut self, cancel: &CancellationToken) -> RegoResult<()> {
        let period = self.config.period();
        let mut next_cycle = Instant::now();

        loop {
            if let CycleOutcome::Cancelled = self.poll_cycle(cancel).await? {
                break;
            }

            next_cycle += period;
            let now = Instant::now();
            if next_cycle < now {
                debug!("Cycle overran its period");
                next_cycle = now;
            }

            if !self.idle_until(next_cycle, cancel).await? {
                break;
            }
        }
        Ok(())
    }

    /// Wait for the next cycle, executing commands as they arrive and
    /// refreshing the display rows
    ///
    /// Returns `false` when cancelled.
    async fn idle_until(&mut self, deadline: Instant, cancel: &CancellationToken) -> RegoResult<bool> {
        let interval = self.config.display_interval();
        let mut next_refresh = Instant::now() + interval;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep_until(deadline) => return Ok(true),
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.execute(command).await?,
                    None => self.commands_open = false,
                },
                _ = tokio::time::sleep_until(next_refresh), if next_refresh < deadline => {
                    if !self.refresh_display(cancel).await? {
                        return Ok(false);
                    }
                    next_refresh = Instant::now() + interval;
                },
            }
        }
    }

    /// Re-read every display row; the publisher drops unchanged text
    async fn refresh_display(&mut self, cancel: &CancellationToken) -> RegoResult<bool> {
        for row in self.display_rows.clone() {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            match self.poll_item(PollItem::Display(row)).await {
                Ok(()) => {},
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Display refresh failed at row {}: {}", row, e);
                    break;
                },
            }
        }
        Ok(true)
    }

    /// One scheduling cycle
    pub async fn poll_cycle(&mut self, cancel: &CancellationToken) -> RegoResult<CycleOutcome> {
        let deadline = Instant::now() + self.config.budget();

        let mut queue = std::mem::take(&mut self.carry_over);
        for item in self.due_items(self.cycle) {
            if !queue.contains(&item) {
                queue.push_back(item);
            }
        }

        let mut polled = 0;
        while let Some(item) = queue.pop_front() {
            if cancel.is_cancelled() {
                queue.push_front(item);
                self.carry_over = queue;
                return Ok(CycleOutcome::Cancelled);
            }
            self.drain_commands().await?;

            if Instant::now() >= deadline {
                queue.push_front(item);
                warn!(
                    "Cycle {} budget exhausted, {} reads deferred",
                    self.cycle,
                    queue.len()
                );
                break;
            }

            match self.poll_item(item).await {
                Ok(()) => polled += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Poll of {:?} failed: {}", item, e),
            }
        }

        let deferred = queue.len();
        self.carry_over = queue;
        self.cycle += 1;
        self.derive_power().await;

        debug!("Cycle done: {} read, {} deferred", polled, deferred);
        Ok(CycleOutcome::Completed { polled, deferred })
    }

    async fn poll_item(&mut self, item: PollItem) -> RegoResult<()> {
        match item {
            PollItem::Register(descriptor) => {
                let reading = self.engine.read_register(descriptor).await?;
                if descriptor.load.is_some() {
                    self.load_states.insert(descriptor.id, reading.clone());
                }
                self.publisher.reading(descriptor, &reading).await;
            },
            PollItem::Display(row) => {
                let reading = self.engine.read_display_row(row).await?;
                self.publisher.display(&reading).await;
            },
        }
        Ok(())
    }

    async fn drain_commands(&mut self) -> RegoResult<()> {
        while self.commands_open {
            match self.commands.try_recv() {
                Ok(command) => self.execute(command).await?,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.commands_open = false,
            }
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> RegoResult<()> {
        match self.engine.execute(&command).await {
            Ok(true) => info!("Command done: {}", command),
            Ok(false) => {},
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Command failed: {}: {}", command, e),
        }
        Ok(())
    }

    /// Power from the load states, then one energy sample
    async fn derive_power(&mut self) {
        let now = Utc::now();
        let states = &self.load_states;
        let Some(power) = self
            .power
            .compute(|load| states.get(&load.register_id()), now)
        else {
            debug!("Load states incomplete, power skipped");
            return;
        };

        self.energy.sample(f64::from(power.total_w), now);
        self.publisher.power(&power).await;
        self.publisher.energy(self.energy.total_kwh()).await;
    }
}
