//! Instantaneous power model
//!
//! Each electrical load draws its nominal power while its binary register
//! reads on. The model only answers when every load register has a fresh,
//! valid reading; a partial picture would under-report energy.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::core::protocol::RegisterReading;
use crate::core::registers::{Load, PowerTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerBreakdown {
    pub loads: Vec<(Load, u32)>,
    pub total_w: u32,
}

#[derive(Debug, Clone)]
pub struct PowerModel {
    table: PowerTable,
    max_age: ChronoDuration,
}

impl PowerModel {
    pub fn new(table: PowerTable, max_age: Duration) -> Self {
        Self {
            table,
            max_age: ChronoDuration::from_std(max_age).unwrap_or(ChronoDuration::MAX),
        }
    }

    pub fn table(&self) -> &PowerTable {
        &self.table
    }

    /// Power per load and total, or `None` if any load state is unknown
    pub fn compute<'a, F>(&self, reading_of: F, now: DateTime<Utc>) -> Option<PowerBreakdown>
    where
        F: Fn(Load) -> Option<&'a RegisterReading>,
    {
        let mut loads = Vec::with_capacity(Load::ALL.len());
        for load in Load::ALL {
            let reading = reading_of(load)?;
            if !reading.valid || now - reading.timestamp > self.max_age {
                return None;
            }
            let on = reading.raw_value.is_some_and(|raw| raw != 0);
            loads.push((load, if on { self.table.watts(load) } else { 0 }));
        }

        let total_w = loads.iter().map(|(_, watts)| watts).sum();
        Some(PowerBreakdown { loads, total_w })
    }
}
