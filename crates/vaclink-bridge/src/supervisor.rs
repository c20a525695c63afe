//! Connection supervisor.
//!
//! Owns the transport lifecycle as an explicit state machine:
//!
//! ```text
//! Disconnected → Connecting → Connected → (Closing) → Disconnected
//!                    ↑                                     │
//!                    └──────── fixed 5 s retry delay ──────┘
//! ```
//!
//! The read loop is the sole mutator of the state store, so observers never
//! need a lock on the read path. Retries are unbounded: device availability
//! is expected to be intermittent (robot charging, proxy restarting), and
//! the supervisor never gives up. A deliberate shutdown wins every race —
//! against a pending read, a pending dial, and the retry timer.
//!
//! Note that a successful TCP connect does **not** flip `robot_connected`:
//! the proxy accepts us before the robot itself is reachable, so
//! connectivity is signaled only by payload content.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vaclink_proto::read_frame;
use vaclink_types::{BridgeError, BridgeEventKind, Origin, Packet};

use crate::bootstrap;
use crate::bus::EventBus;
use crate::command::{CommandSender, WriterSlot};
use crate::state::StateStore;

/// Delay between losing a connection and the next attempt.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle states of the single connection this supervisor owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport factory, the seam that lets tests drive the supervisor with
/// in-memory pipes instead of sockets.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> io::Result<(BoxedReader, BoxedWriter)>;
}

/// Production dialer: one TCP connection to the proxy.
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> io::Result<(BoxedReader, BoxedWriter)> {
        let stream = TcpStream::connect(&self.addr).await?;
        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }
}

/// Why a session ended.
enum SessionEnd {
    /// Deliberate teardown; no reconnect follows.
    Shutdown,
    /// Transport failure (or failed dial); reconnect after the delay.
    Failed(BridgeError),
}

pub(crate) struct Supervisor {
    dialer: Box<dyn Dialer>,
    store: StateStore,
    bus: EventBus,
    commands: CommandSender,
    writer: WriterSlot,
    link: watch::Sender<LinkState>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub(crate) fn new(
        dialer: Box<dyn Dialer>,
        store: StateStore,
        bus: EventBus,
        commands: CommandSender,
        writer: WriterSlot,
        link: watch::Sender<LinkState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            dialer,
            store,
            bus,
            commands,
            writer,
            link,
            shutdown,
        }
    }

    /// Run until shutdown. Never returns early on transport errors.
    pub(crate) async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.link.send_replace(LinkState::Connecting);
            info!("connecting to proxy");

            let dialed = tokio::select! {
                _ = self.shutdown.changed() => break,
                dialed = self.dialer.dial() => dialed,
            };

            let end = match dialed {
                Ok((reader, writer)) => {
                    *self.writer.lock().await = Some(writer);
                    self.link.send_replace(LinkState::Connected);
                    info!("connected to proxy");
                    self.read_session(reader).await
                }
                Err(e) => SessionEnd::Failed(BridgeError::Transport(e)),
            };

            // Teardown: invalidate the writer, force the robot flag down,
            // notify listeners once.
            if *self.link.borrow() == LinkState::Connected {
                self.link.send_replace(LinkState::Closing);
            }
            self.writer.lock().await.take();
            self.store.set_connectivity(Some(false), None);
            self.bus.publish(BridgeEventKind::LinkChanged {
                robot: false,
                cloud: self.store.cloud_connected(),
            });
            self.link.send_replace(LinkState::Disconnected);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Failed(e) => warn!(error = %e, "connection lost, retrying"),
            }

            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        }

        self.link.send_replace(LinkState::Disconnected);
        debug!("supervisor stopped");
    }

    /// Read frames until the connection dies or shutdown is signaled.
    ///
    /// Cancelling a pending read on shutdown may lose a partial frame; that
    /// is fine, nothing reads from this connection again.
    async fn read_session(&mut self, mut reader: BoxedReader) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.changed() => return SessionEnd::Shutdown,
                frame = read_frame(&mut reader) => frame,
            };

            match frame {
                Ok(value) => self.dispatch(Packet::from_value(value)).await,
                Err(e) if e.is_frame_local() => {
                    warn!(error = %e, "dropping malformed frame");
                }
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    async fn dispatch(&self, packet: Packet) {
        match packet.origin {
            Origin::Robot => self.handle_robot(&packet).await,
            Origin::Local => self.handle_local(&packet),
            Origin::Server => info!(body = %packet.body, "server message"),
            _ => debug!(origin = %packet.origin, "dropping packet from unknown origin"),
        }
    }

    /// Robot-origin payloads carry identity, connectivity flags, and
    /// telemetry (as a `data.data` delta or a `cache` snapshot).
    async fn handle_robot(&self, packet: &Packet) {
        if let Some(sn) = packet.sn() {
            self.store.set_serial(sn);
        }

        if let Some(robot) = packet.robot_connected() {
            if robot != self.store.robot_connected() {
                self.store.set_connectivity(Some(robot), None);
                if robot {
                    info!("robot became reachable, requesting initial state");
                    bootstrap::run(&self.commands).await;
                }
            }
        }

        if let Some(cloud) = packet.cloud_connected() {
            self.store.set_connectivity(None, Some(cloud));
        }

        if let Some(fields) = packet.telemetry() {
            self.store.merge(fields);
        }

        debug!(body = %packet.body, "robot message");
        self.bus.publish(BridgeEventKind::StateUpdated);
    }

    /// Local-origin payloads are the proxy's own control channel: a
    /// `connected` flag and optionally the serial. Listeners are notified
    /// only when the flag actually changed.
    fn handle_local(&self, packet: &Packet) {
        let connected = packet.local_connected().unwrap_or(false);
        let changed = self.store.set_connectivity(Some(connected), None);

        if let Some(sn) = packet.sn() {
            self.store.set_serial(sn);
        }

        if changed {
            self.bus.publish(BridgeEventKind::LinkChanged {
                robot: connected,
                cloud: self.store.cloud_connected(),
            });
        }
    }
}
