//! Scripted transport for exercising the ingestion path without sockets.
//!
//! Delivers a fixed schedule of byte chunks, one per poll step, then
//! reports the stream closed. In zero-copy mode every chunk carries a
//! token and releases are recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulse_stats::clock;

use crate::transport::{
    PacketRelease, PacketToken, PacketView, Transport, TransportError, TransportState,
};

/// Records released tokens in order.
#[derive(Clone, Default)]
pub struct RecordingRelease {
    log: Arc<Mutex<Vec<u64>>>,
}

impl RecordingRelease {
    pub fn released(&self) -> Vec<u64> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl PacketRelease for RecordingRelease {
    fn release(&self, token: PacketToken) {
        self.log.lock().unwrap().push(token.0);
    }
}

/// Transport that replays a scripted byte schedule.
pub struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    connected: bool,
    fail_connect: bool,
    zero_copy: bool,
    next_token: u64,
    releases: RecordingRelease,
}

impl ScriptedSource {
    /// Deliver `chunks` one per poll step, then close.
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            connected: false,
            fail_connect: false,
            zero_copy: false,
            next_token: 0,
            releases: RecordingRelease::default(),
        }
    }

    /// Tag every chunk with a token, simulating a zero-copy backend.
    pub fn with_zero_copy(mut self) -> Self {
        self.zero_copy = true;
        self
    }

    /// Make `connect` fail, simulating a transport-init failure.
    pub fn failing() -> Self {
        let mut source = Self::new(Vec::new());
        source.fail_connect = true;
        source
    }

    /// Handle to the release log for assertions.
    pub fn releases(&self) -> RecordingRelease {
        self.releases.clone()
    }
}

impl Transport for ScriptedSource {
    type Releaser = RecordingRelease;

    fn connect(&mut self) -> Result<(), TransportError> {
        if self.fail_connect {
            return Err(TransportError::Init("scripted connection failure".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll_step(
        &mut self,
        _timeout: Duration,
        on_packet: &mut dyn FnMut(PacketView<'_>),
    ) -> Result<TransportState, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let Some(chunk) = self.chunks.pop_front() else {
            return Ok(TransportState::Closed);
        };

        let token = self.zero_copy.then(|| {
            let token = PacketToken(self.next_token);
            self.next_token += 1;
            token
        });

        on_packet(PacketView {
            data: &chunk,
            rx_ts_ns: clock::now_ns(),
            token,
        });
        Ok(TransportState::Open)
    }

    fn releaser(&self) -> RecordingRelease {
        self.releases.clone()
    }
}
