//! Non-blocking TCP byte source using mio.

use std::io::Read;
use std::net::ToSocketAddrs;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use tracing::info;

use pulse_stats::clock;

use crate::transport::{NoopRelease, PacketView, Transport, TransportError, TransportState};

const STREAM: Token = Token(0);
const READ_BUFFER_SIZE: usize = 4096;

/// TCP feed source.
///
/// Kernel networking with a non-blocking poll loop; packets are delivered
/// out of a reused read buffer, so no token accompanies them and the
/// releaser is a no-op.
pub struct TcpSource {
    host: String,
    port: u16,
    poll: Poll,
    events: Events,
    stream: Option<TcpStream>,
    read_buffer: [u8; READ_BUFFER_SIZE],
}

impl TcpSource {
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        Ok(Self {
            host: host.to_string(),
            port,
            poll: Poll::new()?,
            events: Events::with_capacity(64),
            stream: None,
            read_buffer: [0; READ_BUFFER_SIZE],
        })
    }

    fn endpoint(&self) -> Result<std::net::SocketAddr, TransportError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Addr(format!("{}:{}", self.host, self.port)))
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = self.poll.registry().deregister(&mut stream);
        }
    }
}

impl Transport for TcpSource {
    type Releaser = NoopRelease;

    fn connect(&mut self) -> Result<(), TransportError> {
        let addr = self.endpoint()?;

        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        let mut stream = TcpStream::from_std(stream);
        self.poll
            .registry()
            .register(&mut stream, STREAM, Interest::READABLE)?;
        self.stream = Some(stream);

        info!("connected to {}:{}", self.host, self.port);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.close_stream();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn poll_step(
        &mut self,
        timeout: Duration,
        on_packet: &mut dyn FnMut(PacketView<'_>),
    ) -> Result<TransportState, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }

        self.poll.poll(&mut self.events, Some(timeout))?;
        if self.events.is_empty() {
            return Ok(TransportState::Open);
        }

        // Single registration; any event means the stream is readable or
        // closed. Read until drained.
        enum ReadOutcome {
            Drained,
            Closed,
            Failed(std::io::Error),
        }

        let outcome = loop {
            let stream = self.stream.as_mut().expect("checked above");
            match stream.read(&mut self.read_buffer) {
                Ok(0) => break ReadOutcome::Closed,
                Ok(n) => {
                    on_packet(PacketView {
                        data: &self.read_buffer[..n],
                        rx_ts_ns: clock::now_ns(),
                        token: None,
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    break ReadOutcome::Drained
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => break ReadOutcome::Failed(e),
            }
        };

        match outcome {
            ReadOutcome::Drained => Ok(TransportState::Open),
            ReadOutcome::Closed => {
                self.close_stream();
                Ok(TransportState::Closed)
            }
            ReadOutcome::Failed(e) => {
                self.close_stream();
                Err(e.into())
            }
        }
    }

    fn releaser(&self) -> NoopRelease {
        NoopRelease
    }
}
