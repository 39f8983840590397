//! Energy accumulator
//!
//! Integrates instantaneous power into kWh. The accumulated value never
//! decreases: negative power is clamped, and gaps that cannot be trusted
//! (clock going backwards, long outages) reset the baseline instead of
//! being integrated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Integration rule between two samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    #[default]
    Trapezoidal,
    Rectangular,
}

/// Persisted accumulator state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyState {
    /// Older snapshots stored only `energy_total_kwh`
    #[serde(alias = "energy_total_kwh")]
    pub accumulated_kwh: f64,
    pub last_sample_timestamp: Option<DateTime<Utc>>,
    pub last_power_w: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Default for EnergyState {
    fn default() -> Self {
        Self {
            accumulated_kwh: 0.0,
            last_sample_timestamp: None,
            last_power_w: None,
            updated_at: Utc::now(),
        }
    }
}

impl EnergyState {
    /// Repair values no accumulator could have produced
    pub fn sanitized(mut self) -> Self {
        if !self.accumulated_kwh.is_finite() || self.accumulated_kwh < 0.0 {
            self.accumulated_kwh = 0.0;
        }
        if self.last_power_w.is_some_and(|p| !p.is_finite() || p < 0.0) {
            self.last_power_w = None;
        }
        self
    }
}

#[derive(Debug)]
pub struct EnergyAccumulator {
    state: EnergyState,
    method: Integration,
    max_gap: Duration,
    tx: watch::Sender<EnergyState>,
}

impl EnergyAccumulator {
    pub fn new(initial: EnergyState, method: Integration, max_gap: Duration) -> Self {
        let state = initial.sanitized();
        let (tx, _rx) = watch::channel(state.clone());
        info!(
            "Energy: {:.3} kWh ({:?}, max gap {}s)",
            state.accumulated_kwh,
            method,
            max_gap.as_secs()
        );
        Self {
            state,
            method,
            max_gap,
            tx,
        }
    }

    /// Readers get immutable snapshots
    pub fn subscribe(&self) -> watch::Receiver<EnergyState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> EnergyState {
        self.state.clone()
    }

    pub fn total_kwh(&self) -> f64 {
        self.state.accumulated_kwh
    }

    /// Add a power sample; returns the kWh added
    pub fn sample(&mut self, power_w: f64, timestamp: DateTime<Utc>) -> f64 {
        let power_w = if power_w.is_finite() { power_w.max(0.0) } else { 0.0 };

        let delta_kwh = match self.state.last_sample_timestamp {
            None => 0.0,
            Some(previous) => {
                let elapsed_s = (timestamp - previous).num_milliseconds() as f64 / 1000.0;
                if elapsed_s <= 0.0 || elapsed_s > self.max_gap.as_secs_f64() {
                    debug!("Energy baseline reset after {:.1}s gap", elapsed_s);
                    0.0
                } else {
                    let average_w = match (self.method, self.state.last_power_w) {
                        (Integration::Trapezoidal, Some(last)) => (last + power_w) / 2.0,
                        _ => power_w,
                    };
                    average_w * elapsed_s / 3_600_000.0
                }
            },
        };

        self.state.accumulated_kwh += delta_kwh;
        self.state.last_sample_timestamp = Some(timestamp);
        self.state.last_power_w = Some(power_w);
        self.state.updated_at = Utc::now();
        self.tx.send_replace(self.state.clone());

        delta_kwh
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn accumulator(method: Integration) -> EnergyAccumulator {
        EnergyAccumulator::new(EnergyState::default(), method, Duration::from_secs(600))
    }

    #[test]
    fn test_first_sample_sets_baseline() {
        let mut acc = accumulator(Integration::Trapezoidal);
        assert_eq!(acc.sample(2000.0, Utc::now()), 0.0);
        assert_eq!(acc.total_kwh(), 0.0);
    }

    #[test]
    fn test_trapezoid_between_two_powers() {
        let mut acc = accumulator(Integration::Trapezoidal);
        let t0 = Utc::now();
        acc.sample(1000.0, t0);
        let delta = acc.sample(3000.0, t0 + ChronoDuration::seconds(360));
        // mean 2000 W over 0.1 h
        assert!((delta - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_rectangular_uses_current_power() {
        let mut acc = accumulator(Integration::Rectangular);
        let t0 = Utc::now();
        acc.sample(1000.0, t0);
        let delta = acc.sample(3000.0, t0 + ChronoDuration::seconds(360));
        assert!((delta - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_recovered_timestamp_without_power_is_rectangular() {
        let t0 = Utc::now();
        let recovered = EnergyState {
            accumulated_kwh: 5.0,
            last_sample_timestamp: Some(t0),
            last_power_w: None,
            updated_at: t0,
        };
        let mut acc =
            EnergyAccumulator::new(recovered, Integration::Trapezoidal, Duration::from_secs(600));
        let delta = acc.sample(1200.0, t0 + ChronoDuration::seconds(300));
        assert!((delta - 0.1).abs() < 1e-9);
        assert!((acc.total_kwh() - 5.1).abs() < 1e-9);
    }

    #[test]
    fn test_gaps_and_clock_jumps_are_discarded() {
        let mut acc = accumulator(Integration::Trapezoidal);
        let t0 = Utc::now();
        acc.sample(2000.0, t0);

        assert_eq!(acc.sample(2000.0, t0 + ChronoDuration::seconds(601)), 0.0);
        // Baseline moved to the sample after the gap
        let t1 = t0 + ChronoDuration::seconds(601);
        assert_eq!(acc.sample(2000.0, t1 - ChronoDuration::seconds(5)), 0.0);
        assert_eq!(acc.sample(2000.0, t1 - ChronoDuration::seconds(5)), 0.0);
        assert_eq!(acc.total_kwh(), 0.0);
    }

    #[test]
    fn test_negative_power_is_clamped() {
        let mut acc = accumulator(Integration::Trapezoidal);
        let t0 = Utc::now();
        acc.sample(-500.0, t0);
        assert_eq!(acc.sample(-500.0, t0 + ChronoDuration::seconds(60)), 0.0);
        assert_eq!(acc.snapshot().last_power_w, Some(0.0));
    }

    #[test]
    fn test_snapshot_published_to_subscribers() {
        let mut acc = accumulator(Integration::Trapezoidal);
        let rx = acc.subscribe();
        let t0 = Utc::now();
        acc.sample(3600.0, t0);
        acc.sample(3600.0, t0 + ChronoDuration::seconds(60));
        assert!((rx.borrow().accumulated_kwh - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_legacy_snapshot_format() {
        let state: EnergyState = serde_json::from_str(r#"{"energy_total_kwh": 123.456}"#).unwrap();
        assert_eq!(state.accumulated_kwh, 123.456);
        assert!(state.last_sample_timestamp.is_none());
    }

    #[test]
    fn test_sanitize_rejects_negative_total() {
        let state = EnergyState {
            accumulated_kwh: -3.0,
            ..Default::default()
        };
        assert_eq!(state.sanitized().accumulated_kwh, 0.0);
    }
}
