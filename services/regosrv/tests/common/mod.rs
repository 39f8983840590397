//! Shared test fixtures: a simulated Rego controller behind the mock
//! transport, plus gateway wiring helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regosrv::core::protocol::codec::{
    encode_display_response, encode_register_response, CMD_READ_DISPLAY, CMD_READ_FRONT_PANEL,
    CMD_READ_SYSTEM, CMD_WRITE_FRONT_PANEL, CMD_WRITE_SYSTEM,
};
use regosrv::bus::{LinkEvent, MockBus};
use regosrv::core::protocol::Command;
use regosrv::core::transport::{shared, MockTransport};
use regosrv::{Gateway, RegoConfig};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// One decoded request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireRequest {
    pub command: u8,
    pub address: u16,
    pub value: i16,
}

pub fn parse_request(frame: &[u8]) -> Option<WireRequest> {
    if frame.len() != 9 || frame[0] != 0x81 {
        return None;
    }
    let join = |b: &[u8]| (u16::from(b[0]) << 14) | (u16::from(b[1]) << 7) | u16::from(b[2]);
    Some(WireRequest {
        command: frame[1],
        address: join(&frame[2..5]),
        value: join(&frame[5..8]) as i16,
    })
}

#[derive(Debug, Default)]
struct ControllerState {
    system: HashMap<u16, i32>,
    front_panel: HashMap<u16, i32>,
    display: HashMap<u16, String>,
    writes: Vec<WireRequest>,
    corrupt: bool,
}

/// Answers requests like a Rego 600 would
#[derive(Debug, Clone, Default)]
pub struct Controller {
    state: Arc<Mutex<ControllerState>>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_system(&self, register: u16, raw: i32) {
        self.state.lock().unwrap().system.insert(register, raw);
    }

    pub fn set_front_panel(&self, register: u16, raw: i32) {
        self.state.lock().unwrap().front_panel.insert(register, raw);
    }

    pub fn set_display(&self, row: u16, text: &str) {
        self.state
            .lock()
            .unwrap()
            .display
            .insert(row, text.to_string());
    }

    /// Flip the checksum of every register answer
    pub fn set_corrupt(&self, corrupt: bool) {
        self.state.lock().unwrap().corrupt = corrupt;
    }

    pub fn writes(&self) -> Vec<WireRequest> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn respond(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let request = parse_request(frame)?;
        let mut state = self.state.lock().unwrap();
        match request.command {
            CMD_READ_SYSTEM | CMD_READ_FRONT_PANEL => {
                let bank = if request.command == CMD_READ_SYSTEM {
                    &state.system
                } else {
                    &state.front_panel
                };
                let raw = bank.get(&request.address).copied().unwrap_or(0);
                let mut answer = encode_register_response(raw);
                if state.corrupt {
                    answer[4] ^= 0x01;
                }
                Some(answer)
            },
            CMD_READ_DISPLAY => {
                let text = state
                    .display
                    .get(&request.address)
                    .cloned()
                    .unwrap_or_default();
                Some(encode_display_response(&text))
            },
            CMD_WRITE_SYSTEM | CMD_WRITE_FRONT_PANEL => {
                state.writes.push(request);
                Some(vec![0x01])
            },
            _ => None,
        }
    }

    /// Serve every request of `mock` from this controller
    pub fn attach(&self, mock: &MockTransport) {
        let controller = self.clone();
        mock.set_responder(move |frame| controller.respond(frame));
    }
}

/// Binary load registers: compressor, aux 1, aux 2, P1, P2, P3
pub const LOAD_REGISTERS: [u16; 6] = [0x01FE, 0x01FF, 0x0200, 0x0203, 0x0204, 0x01FD];

/// Gateway wired to a simulated controller and a recording bus
pub struct Harness {
    pub mock: MockTransport,
    pub controller: Controller,
    pub bus: MockBus,
    pub links: mpsc::Sender<LinkEvent>,
    pub commands: mpsc::Sender<Command>,
    pub config: RegoConfig,
    pub dir: TempDir,
    pub gateway: Gateway,
}

pub fn harness(customize: impl FnOnce(&mut RegoConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = RegoConfig::default();
    config.energy.snapshot_path = dir.path().join("energy_total.json");
    config.logging.console_only = true;
    customize(&mut config);
    let profile = config.validate().unwrap();

    let mock = MockTransport::new();
    let controller = Controller::new();
    controller.attach(&mock);
    let bus = MockBus::new();
    let (links, link_rx) = mpsc::channel(16);
    let (commands, command_rx) = mpsc::channel(16);

    let gateway = Gateway::new(
        config.clone(),
        profile,
        shared(Box::new(mock.clone())),
        Arc::new(bus.clone()),
        link_rx,
        command_rx,
    );

    Harness {
        mock,
        controller,
        bus,
        links,
        commands,
        config,
        dir,
        gateway,
    }
}
