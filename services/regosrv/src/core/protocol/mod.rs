//! Rego serial protocol: codec, exchange lifecycle, engine and commands

pub mod codec;
pub mod command;
pub mod engine;
pub mod exchange;

pub use codec::{FrameCodec, RegoCodec, Request, Response};
pub use command::{Command, WheelDirection};
pub use engine::{
    DisplayReading, EngineConfig, EngineStats, RegisterReading, SerialProtocolEngine,
};
pub use exchange::{Exchange, ExchangePhase};
