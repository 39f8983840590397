//! Transport Layer Module
//!
//! Separates the physical serial link from the Rego protocol logic.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │   SerialProtocolEngine (framing,     │
//! │   checksums, retries)                │
//! └──────────────────────────────────────┘
//!                  │
//!                  ▼
//! ┌──────────────────────────────────────┐
//! │   Transport trait                    │
//! │   send(), receive(), clear_input()   │
//! └──────────────────────────────────────┘
//!          │                    │
//!          ▼                    ▼
//!   ┌─────────────┐     ┌─────────────┐
//!   │   Serial    │     │    Mock     │
//!   └─────────────┘     └─────────────┘
//! ```

pub mod mock;
pub mod serial;
pub mod traits;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use mock::{MockReply, MockTransport};
pub use serial::{SerialTransport, SerialTransportConfig};
pub use traits::{Transport, TransportError, TransportStats};

/// Owner token for the serial link: whoever holds the lock owns the line
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport into the shared owner token
pub fn shared(transport: Box<dyn Transport>) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}
