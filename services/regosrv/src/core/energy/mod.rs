//! Derived metrics: instantaneous power and integrated energy

pub mod accumulator;
pub mod power;
pub mod store;

pub use accumulator::{EnergyAccumulator, EnergyState, Integration};
pub use power::{PowerBreakdown, PowerModel};
pub use store::{run_persistence, SnapshotStore};
