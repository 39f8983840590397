//! Core gateway components

pub mod availability;
pub mod energy;
pub mod poller;
pub mod protocol;
pub mod registers;
pub mod transport;
