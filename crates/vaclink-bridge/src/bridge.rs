//! Public bridge handle.
//!
//! [`VacBridge`] owns one supervisor task per configured device and exposes
//! the narrow surface external entity glue consumes: snapshot and
//! connectivity accessors, a command-send operation, and a subscription
//! feed. Must be created inside a Tokio runtime.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use vaclink_types::{BridgeError, FieldMap};

use crate::bus::{EventBus, Subscription};
use crate::command::{CommandSender, WriterSlot};
use crate::commands::Command;
use crate::state::StateStore;
use crate::supervisor::{Dialer, LinkState, Supervisor, TcpDialer};

pub struct VacBridge {
    store: StateStore,
    bus: EventBus,
    commands: CommandSender,
    link: watch::Receiver<LinkState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl VacBridge {
    /// Connect to the proxy at `addr` (`host:port`) and keep reconnecting
    /// until [`shutdown`](Self::shutdown).
    pub fn connect(addr: impl Into<String>) -> Self {
        Self::with_dialer(Box::new(TcpDialer::new(addr)))
    }

    /// Like [`connect`](Self::connect) but over an arbitrary transport.
    pub fn with_dialer(dialer: Box<dyn Dialer>) -> Self {
        let store = StateStore::new();
        let bus = EventBus::default();
        let writer: WriterSlot = Arc::new(Mutex::new(None));
        let commands = CommandSender::new(writer.clone(), store.clone());

        let (link_tx, link_rx) = watch::channel(LinkState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor::new(
            dialer,
            store.clone(),
            bus.clone(),
            commands.clone(),
            writer,
            link_tx,
            shutdown_rx,
        );
        let task = tokio::spawn(supervisor.run());

        Self {
            store,
            bus,
            commands,
            link: link_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Current merged telemetry (copy-on-read).
    pub fn snapshot(&self) -> FieldMap {
        self.store.snapshot()
    }

    /// Physical link between the proxy and the robot.
    pub fn is_robot_connected(&self) -> bool {
        self.store.robot_connected()
    }

    /// The proxy's upstream cloud session.
    pub fn is_cloud_connected(&self) -> bool {
        self.store.cloud_connected()
    }

    /// Device serial number, once discovered.
    pub fn serial_number(&self) -> Option<String> {
        self.store.serial()
    }

    /// Current connection lifecycle state.
    pub fn link_state(&self) -> LinkState {
        *self.link.borrow()
    }

    /// A watch feed of lifecycle transitions, for callers that want to await
    /// a particular state.
    pub fn link_changes(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    /// Attach an observer notified on every state-affecting event.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Send one framed command, best-effort. Fails fast with
    /// [`BridgeError::NotConnected`] while disconnected.
    pub async fn send_command(&self, info_type: u32, data: Value) -> Result<(), BridgeError> {
        self.commands.send(info_type, data).await
    }

    /// Send a command built by the [`commands`](crate::commands) catalog.
    pub async fn send(&self, command: Command) -> Result<(), BridgeError> {
        let (info_type, data) = command;
        self.commands.send(info_type, data).await
    }

    /// Stop the supervisor and release the transport. Wins the race against
    /// any pending read, dial, or retry timer.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use crate::supervisor::{BoxedReader, BoxedWriter, RETRY_DELAY};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::time::timeout;
    use vaclink_proto::{encode_frame, read_frame};
    use vaclink_types::BridgeEventKind;

    /// Hands out pre-built in-memory streams; once exhausted, dials hang
    /// like a connect to a dead proxy would.
    struct ScriptedDialer {
        streams: Mutex<VecDeque<DuplexStream>>,
        dials: Arc<AtomicUsize>,
    }

    impl ScriptedDialer {
        fn new(streams: Vec<DuplexStream>) -> (Self, Arc<AtomicUsize>) {
            let dials = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    streams: Mutex::new(streams.into()),
                    dials: dials.clone(),
                },
                dials,
            )
        }
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        async fn dial(&self) -> io::Result<(BoxedReader, BoxedWriter)> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let next = self.streams.lock().await.pop_front();
            match next {
                Some(stream) => {
                    let (reader, writer) = tokio::io::split(stream);
                    Ok((Box::new(reader), Box::new(writer)))
                }
                None => std::future::pending().await,
            }
        }
    }

    type ProxySide = (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>);

    /// A bridge wired to one in-memory connection, plus the proxy's side of
    /// the pipe.
    fn bridged() -> (VacBridge, ProxySide, Arc<AtomicUsize>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (dialer, dials) = ScriptedDialer::new(vec![ours]);
        let bridge = VacBridge::with_dialer(Box::new(dialer));
        let (proxy_read, proxy_write) = tokio::io::split(theirs);
        (bridge, (proxy_read, proxy_write), dials)
    }

    async fn proxy_send(writer: &mut WriteHalf<DuplexStream>, payload: serde_json::Value) {
        use tokio::io::AsyncWriteExt;
        let frame = encode_frame(&payload).unwrap();
        writer.write_all(&frame).await.unwrap();
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn robot_packet_updates_state_and_fires_bootstrap() {
        let (bridge, (mut proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        proxy_send(
            &mut proxy_write,
            json!({
                "origin": "robot",
                "sn": "ABC123",
                "robot_connected": true,
                "data": {"data": {"elec": 87}}
            }),
        )
        .await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, BridgeEventKind::StateUpdated);

        assert_eq!(bridge.serial_number().as_deref(), Some("ABC123"));
        assert!(bridge.is_robot_connected());
        assert_eq!(bridge.snapshot().get("elec"), Some(&json!(87)));

        // Exactly one bootstrap sequence, in its defined order, stamped with
        // the discovered serial.
        for expected in [30000u32, 21034, 21011, 21019] {
            let request = read_frame(&mut proxy_read).await.unwrap();
            assert_eq!(request.get("infoType"), Some(&json!(expected)));
            assert_eq!(request.get("origin"), Some(&json!("ha")));
            assert_eq!(request.get("sn"), Some(&json!("ABC123")));
        }

        // A repeat of the same flag value must not re-fire the sequence.
        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "robot_connected": true, "data": {"data": {"elec": 86}}}),
        )
        .await;
        sub.recv().await.unwrap();
        let no_more = timeout(Duration::from_millis(50), read_frame(&mut proxy_read)).await;
        assert!(no_more.is_err(), "bootstrap must fire only on the rising edge");
    }

    #[tokio::test]
    async fn empty_data_merges_cache_fallback() {
        let (bridge, (_proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "sn": "ABC123", "data": {}, "cache": {"mode": "sweep"}}),
        )
        .await;

        sub.recv().await.unwrap();
        assert_eq!(bridge.snapshot().get("mode"), Some(&json!("sweep")));
        assert!(!bridge.is_robot_connected());
    }

    #[tokio::test]
    async fn cloud_flag_applies_unconditionally() {
        let (bridge, (_proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "cloud_connected": true, "data": {"data": {}}}),
        )
        .await;
        sub.recv().await.unwrap();
        assert!(bridge.is_cloud_connected());
        assert!(!bridge.is_robot_connected());
    }

    #[tokio::test]
    async fn local_packet_flips_connectivity_and_notifies_on_change_only() {
        let (bridge, (mut proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        proxy_send(
            &mut proxy_write,
            json!({"origin": "local", "connected": true, "sn": "LOCAL1"}),
        )
        .await;

        let event = sub.recv().await.unwrap();
        assert_eq!(
            event.kind,
            BridgeEventKind::LinkChanged {
                robot: true,
                cloud: false
            }
        );
        assert_eq!(bridge.serial_number().as_deref(), Some("LOCAL1"));

        // The local channel never triggers bootstrap.
        let no_requests = timeout(Duration::from_millis(50), read_frame(&mut proxy_read)).await;
        assert!(no_requests.is_err());

        // Same flag again: no notification.
        proxy_send(
            &mut proxy_write,
            json!({"origin": "local", "connected": true}),
        )
        .await;
        let quiet = timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(quiet.is_err(), "unchanged connectivity must not notify");
    }

    #[tokio::test]
    async fn server_and_unknown_origins_mutate_nothing() {
        let (bridge, (_proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        proxy_send(
            &mut proxy_write,
            json!({"origin": "server", "data": {"data": {"elec": 1}}}),
        )
        .await;
        proxy_send(
            &mut proxy_write,
            json!({"origin": "martian", "data": {"data": {"elec": 2}}}),
        )
        .await;
        // A real robot packet afterwards proves both were skipped in order.
        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "data": {"data": {"elec": 3}}}),
        )
        .await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, BridgeEventKind::StateUpdated);
        assert_eq!(bridge.snapshot().get("elec"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_and_loop_continues() {
        use tokio::io::AsyncWriteExt;

        let (bridge, (_proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        // Correctly framed garbage payload.
        let garbage = b"{broken";
        let mut wire = vaclink_proto::FRAME_MAGIC.to_vec();
        wire.extend((garbage.len() as u16).to_be_bytes());
        wire.extend_from_slice(garbage);
        proxy_write.write_all(&wire).await.unwrap();

        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "data": {"data": {"elec": 42}}}),
        )
        .await;

        sub.recv().await.unwrap();
        assert_eq!(bridge.snapshot().get("elec"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn send_while_disconnected_fails_with_not_connected() {
        let (dialer, _dials) = ScriptedDialer::new(vec![]);
        let bridge = VacBridge::with_dialer(Box::new(dialer));

        let err = bridge.send(commands::pause()).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn commands_flow_to_the_wire_once_connected() {
        let (bridge, (mut proxy_read, mut proxy_write), _dials) = bridged();
        let mut sub = bridge.subscribe();

        // Wait until the session is up (any processed packet proves it).
        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "sn": "SN1", "data": {"data": {}}}),
        )
        .await;
        sub.recv().await.unwrap();

        bridge.send(commands::set_fan_speed(commands::FanSpeed::Max)).await.unwrap();

        let frame = read_frame(&mut proxy_read).await.unwrap();
        assert_eq!(frame.get("infoType"), Some(&json!(21022)));
        assert_eq!(frame.get("data"), Some(&json!({"cmd": "max", "cleanType": "total"})));
        assert_eq!(frame.get("sn"), Some(&json!("SN1")));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_loss_notifies_once_and_retries_after_delay() {
        let (bridge, (proxy_read, mut proxy_write), dials) = bridged();
        let mut sub = bridge.subscribe();
        let mut link = bridge.link_changes();

        // Bring the robot up first so the teardown has a flag to drop.
        proxy_send(
            &mut proxy_write,
            json!({"origin": "robot", "robot_connected": true, "data": {"data": {}}}),
        )
        .await;
        sub.recv().await.unwrap();
        assert!(bridge.is_robot_connected());
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        // Kill the proxy side: the pending read sees EOF.
        drop(proxy_read);
        drop(proxy_write);

        let event = sub.recv().await.unwrap();
        assert_eq!(
            event.kind,
            BridgeEventKind::LinkChanged {
                robot: false,
                cloud: false
            }
        );
        assert!(!bridge.is_robot_connected());

        // Exactly one notification per teardown.
        let quiet = timeout(Duration::from_millis(10), sub.recv()).await;
        assert!(quiet.is_err());

        // After the fixed delay a fresh attempt is observed.
        timeout(RETRY_DELAY * 2, link.wait_for(|s| *s == LinkState::Connecting))
            .await
            .expect("supervisor must retry")
            .unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_wins_the_race_against_the_retry_timer() {
        let (bridge, (proxy_read, proxy_write), dials) = bridged();
        let mut link = bridge.link_changes();

        link.wait_for(|s| *s == LinkState::Connected).await.unwrap();
        drop(proxy_read);
        drop(proxy_write);
        link.wait_for(|s| *s == LinkState::Disconnected).await.unwrap();

        // Shut down while the retry timer is pending; no second dial may
        // happen.
        bridge.shutdown().await;
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_unblocks_a_pending_read() {
        let (bridge, (_proxy_read, _proxy_write), dials) = bridged();
        let mut link = bridge.link_changes();
        link.wait_for(|s| *s == LinkState::Connected).await.unwrap();

        // The supervisor is parked in read_frame; shutdown must still win.
        timeout(Duration::from_secs(1), bridge.shutdown())
            .await
            .expect("shutdown must not hang");
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }
}
