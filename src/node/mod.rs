//! Node runtime module
//!
//! A [`Node`] owns the protocol state of one radio and drives it from a single
//! task: scheduled broadcasts on one side, transport notifications on the
//! other. Everything the node does is reported through an [`EventSink`].

mod events;

pub use self::events::{ChannelSink, EventSink, NodeEvent, TracingSink};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::info;

use crate::core::{Config, MacAddress, PeerError, Result, Role};
use crate::network::{PeerRegistry, PeerTable, Transport, TransportEvent};
use crate::protocol::{Dispatch, FrameCodec, Message, ProtocolState, Rejection};

/// One groupcast radio node
pub struct Node {
    address: MacAddress,
    state: ProtocolState,
    transport: Arc<dyn Transport>,
    events: mpsc::Receiver<TransportEvent>,
    sink: Arc<dyn EventSink>,
    broadcast_interval: Duration,
    reply_delay: Duration,
    static_peers: Vec<MacAddress>,
}

impl Node {
    /// Creates a node over `transport`, reading its notifications from `events`
    ///
    /// The node starts with an in-memory peer registry and logs through
    /// [`TracingSink`].
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Result<Self> {
        let peers = PeerTable::with_capacity(config.peer_capacity);
        let state = ProtocolState::new(config, peers)?;

        Ok(Node {
            address: transport.local_address(),
            state,
            transport,
            events,
            sink: Arc::new(TracingSink),
            broadcast_interval: config.broadcast_interval,
            reply_delay: config.reply_delay,
            static_peers: config.static_peers.clone(),
        })
    }

    /// Reports events to `sink` instead of `tracing`
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Uses the radio's own peer registry
    pub fn with_registry(mut self, registry: Box<dyn PeerRegistry>) -> Self {
        *self.state.peers_mut() = PeerTable::new(registry);
        self
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Registers startup peers and announces the node
    ///
    /// Broadcasters register the broadcast address. Static peers that cannot
    /// be registered are reported and skipped.
    pub fn start(&mut self) {
        if self.state.role() == Role::Broadcaster {
            self.register(MacAddress::BROADCAST, 0);
        }
        let channel = self.state.channel();
        for address in self.static_peers.clone() {
            self.register(address, channel);
        }

        self.emit(NodeEvent::Started {
            address: self.address,
            node_id: self.state.node_id().to_string(),
            group: self.state.group(),
            role: self.state.role(),
        });
    }

    /// Runs the node until the transport's event queue closes
    pub async fn run(mut self) -> Result<()> {
        self.start();

        let broadcaster = self.state.role() == Role::Broadcaster;
        let mut ticker = interval(self.broadcast_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick(), if broadcaster => {
                    // Failures are already reported; the next cycle sends fresh state
                    let _ = self.broadcast_once();
                }

                event = self.events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                    None => {
                        info!(address = %self.address, "transport closed, node stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sends the next scheduled broadcast
    pub fn broadcast_once(&mut self) -> Result<Message> {
        let message = self.state.next_broadcast()?;
        self.emit(NodeEvent::Broadcast {
            message: message.clone(),
        });
        self.transmit(MacAddress::BROADCAST, &message)?;
        Ok(message)
    }

    /// Processes one transport notification
    ///
    /// Events need not come from [`TransportCallbacks`](crate::network::TransportCallbacks):
    /// custom drivers may build [`TransportEvent`]s themselves, so frames without
    /// a source or without data are checked again here.
    pub async fn handle_event(&mut self, event: TransportEvent) -> Option<Dispatch> {
        match event {
            TransportEvent::SendComplete { destination, status } => {
                self.emit(NodeEvent::SendCompleted { destination, status });
                None
            }
            TransportEvent::Received { source: None, .. } => {
                self.emit(NodeEvent::Ignored {
                    reason: "frame without source address",
                });
                None
            }
            TransportEvent::Received { data, .. } if data.is_empty() => {
                self.emit(NodeEvent::Ignored { reason: "empty frame" });
                None
            }
            TransportEvent::Received { source: Some(source), data } => match self.state.role() {
                Role::Broadcaster => {
                    self.observe_reply(source, &data);
                    None
                }
                Role::Listener => Some(self.dispatch(source, &data).await),
            },
        }
    }

    fn observe_reply(&mut self, source: MacAddress, data: &[u8]) {
        match self.state.observe_reply(data) {
            Ok(message) => self.emit(NodeEvent::ReplyReceived { source, message }),
            Err(error) => self.emit(NodeEvent::DecodeFailed {
                source: Some(source),
                error,
            }),
        }
    }

    async fn dispatch(&mut self, source: MacAddress, data: &[u8]) -> Dispatch {
        let dispatch = self.state.receive(Some(source), data);
        let source = Some(source);

        match &dispatch {
            Dispatch::Rejected(Rejection::Decode(error)) => {
                self.emit(NodeEvent::DecodeFailed { source, error: error.clone() });
            }
            Dispatch::Rejected(Rejection::Duplicate { sequence, watermark }) => {
                self.emit(NodeEvent::Duplicate {
                    source,
                    sequence: *sequence,
                    watermark: *watermark,
                });
            }
            Dispatch::Rejected(Rejection::ForeignGroup { group, mine }) => {
                self.emit(NodeEvent::ForeignGroup {
                    source,
                    group: *group,
                    mine: *mine,
                });
            }
            Dispatch::Delivered(message) => {
                self.emit(NodeEvent::Admitted {
                    source,
                    message: message.clone(),
                });
            }
            Dispatch::ReplySkipped { request, reason } => {
                self.emit(NodeEvent::Admitted {
                    source,
                    message: request.clone(),
                });
                self.emit(NodeEvent::ReplySkipped {
                    source,
                    reason: reason.clone(),
                });
            }
            Dispatch::Reply { request, to, reply, peer_added } => {
                self.emit(NodeEvent::Admitted {
                    source,
                    message: request.clone(),
                });
                if *peer_added {
                    self.emit(NodeEvent::PeerAdded { address: *to });
                }
                if !self.reply_delay.is_zero() {
                    sleep(self.reply_delay).await;
                }
                // A refused reply is reported by transmit and not retried
                if self.transmit(*to, reply).is_ok() {
                    self.emit(NodeEvent::ReplySent {
                        to: *to,
                        message: reply.clone(),
                    });
                }
                self.state.complete_reply();
            }
        }

        dispatch
    }

    /// Encodes and hands a frame to the transport; the peer must be registered
    fn transmit(&mut self, destination: MacAddress, message: &Message) -> Result<()> {
        if !self.state.peers().contains(&destination) {
            let error = PeerError::NotRegistered(destination);
            self.emit(NodeEvent::PeerRejected {
                address: destination,
                error: error.clone(),
            });
            return Err(error.into());
        }

        let frame = FrameCodec::encode(message);
        if let Err(error) = self.transport.send(&destination, frame) {
            self.emit(NodeEvent::SendFailed {
                destination,
                error: error.clone(),
            });
            return Err(error.into());
        }
        Ok(())
    }

    fn register(&mut self, address: MacAddress, channel: u8) {
        if self.state.peers().contains(&address) {
            return;
        }
        match self.state.peers_mut().upsert(address, channel) {
            Ok(()) => self.emit(NodeEvent::PeerAdded { address }),
            Err(error) => self.emit(NodeEvent::PeerRejected { address, error }),
        }
    }

    fn emit(&self, event: NodeEvent) {
        self.sink.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    use crate::core::{GroupId, MessageType, TransportError};
    use crate::network::{MemoryRegistry, SendStatus, TransportCallbacks};
    use crate::protocol::DispatchPhase;

    const ME: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x03]);
    const MASTER: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]);
    const PARTNER: MacAddress = MacAddress::new([0x3C, 0x8A, 0x1F, 0x5D, 0x1B, 0x1C]);

    /// Records every frame instead of sending it
    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<(MacAddress, Bytes)>>,
        fail: bool,
    }

    impl MockTransport {
        fn sent(&self) -> Vec<(MacAddress, Message)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(to, frame)| (*to, FrameCodec::decode(frame).unwrap()))
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn local_address(&self) -> MacAddress {
            ME
        }

        fn send(&self, destination: &MacAddress, frame: Bytes) -> std::result::Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::send_failed(*destination, "queue full"));
            }
            self.sent.lock().unwrap().push((*destination, frame));
            Ok(())
        }
    }

    struct Harness {
        node: Node,
        transport: Arc<MockTransport>,
        callbacks: TransportCallbacks,
        events: mpsc::UnboundedReceiver<NodeEvent>,
    }

    fn harness(config: Config, transport: MockTransport) -> Harness {
        let transport = Arc::new(transport);
        let (callbacks, rx) = TransportCallbacks::channel(config.event_queue);
        let (sink, events) = ChannelSink::new();
        let node = Node::new(&config, transport.clone(), rx)
            .unwrap()
            .with_sink(Arc::new(sink));
        Harness { node, transport, callbacks, events }
    }

    fn listener() -> Config {
        Config {
            reply_delay: Duration::ZERO,
            ..Config::listener("NODE_003", GroupId(1))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<NodeEvent>) -> Vec<NodeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn received(message: &Message) -> TransportEvent {
        TransportEvent::Received {
            source: Some(MASTER),
            data: FrameCodec::encode(message),
        }
    }

    #[tokio::test]
    async fn test_command_auto_reply() {
        let mut h = harness(listener(), MockTransport::default());
        h.node.start();

        let command = Message::broadcast("NODE_A", "reboot", MessageType::Command, GroupId(1), 1, 10);
        let dispatch = h.node.handle_event(received(&command)).await;
        assert!(matches!(dispatch, Some(Dispatch::Reply { .. })));

        assert!(h.node.state().peers().contains(&MASTER));
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        let (to, reply) = &sent[0];
        assert_eq!(*to, MASTER);
        assert_eq!(reply.message_type, MessageType::Info);
        assert_eq!(reply.sequence_number, 0);
        assert_eq!(reply.group_id, GroupId(1));
        assert_eq!(reply.sender_id, "NODE_003");

        assert_eq!(h.node.state().phase(), &DispatchPhase::Terminal);

        let events = drain(&mut h.events);
        assert!(events.contains(&NodeEvent::PeerAdded { address: MASTER }));
        assert!(events
            .iter()
            .any(|e| matches!(e, NodeEvent::ReplySent { to, .. } if *to == MASTER)));
    }

    #[tokio::test]
    async fn test_reply_waits_for_delay() {
        let config = Config {
            reply_delay: Duration::from_millis(30),
            ..listener()
        };
        let mut h = harness(config, MockTransport::default());

        let command = Message::broadcast("NODE_A", "go", MessageType::Command, GroupId::ALL, 1, 10);
        let started = tokio::time::Instant::now();
        h.node.handle_event(received(&command)).await;
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_info_and_alert_not_answered() {
        let mut h = harness(listener(), MockTransport::default());

        for (seq, message_type) in [(1, MessageType::Info), (2, MessageType::Alert)] {
            let message = Message::broadcast("NODE_A", "note", message_type, GroupId(1), seq, 0);
            let dispatch = h.node.handle_event(received(&message)).await;
            assert!(matches!(dispatch, Some(Dispatch::Delivered(_))));
        }
        assert!(h.transport.sent().is_empty());
        assert!(h.node.state().peers().is_empty());
    }

    #[tokio::test]
    async fn test_filters_are_reported() {
        let mut h = harness(listener(), MockTransport::default());

        let foreign = Message::broadcast("NODE_A", "g2", MessageType::Alert, GroupId(2), 5, 0);
        let stale = Message::broadcast("NODE_A", "old", MessageType::Command, GroupId(1), 4, 0);
        h.node.handle_event(received(&foreign)).await;
        h.node.handle_event(received(&stale)).await;
        h.node
            .handle_event(TransportEvent::Received {
                source: Some(MASTER),
                data: Bytes::from_static(b"garbage"),
            })
            .await;

        let events = drain(&mut h.events);
        assert_eq!(
            events,
            vec![
                NodeEvent::ForeignGroup {
                    source: Some(MASTER),
                    group: GroupId(2),
                    mine: GroupId(1),
                },
                NodeEvent::Duplicate {
                    source: Some(MASTER),
                    sequence: 4,
                    watermark: 5,
                },
                NodeEvent::DecodeFailed {
                    source: Some(MASTER),
                    error: crate::core::DecodeError::TooShort { expected: 214, actual: 7 },
                },
            ]
        );
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_notifications_ignored() {
        let mut h = harness(listener(), MockTransport::default());
        let command = Message::broadcast("NODE_A", "x", MessageType::Command, GroupId(1), 1, 0);

        let none = h
            .node
            .handle_event(TransportEvent::Received {
                source: None,
                data: FrameCodec::encode(&command),
            })
            .await;
        let empty = h
            .node
            .handle_event(TransportEvent::Received {
                source: Some(MASTER),
                data: Bytes::new(),
            })
            .await;

        assert!(none.is_none() && empty.is_none());
        assert_eq!(h.node.state().filter().watermark(), 0);
        assert_eq!(drain(&mut h.events).len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_cycle() {
        let mut h = harness(Config::broadcaster("MASTER_001"), MockTransport::default());
        h.node.start();

        for _ in 0..4 {
            assert_ok!(h.node.broadcast_once());
        }

        let sent = h.transport.sent();
        let seqs: Vec<u32> = sent.iter().map(|(_, m)| m.sequence_number).collect();
        let pairs: Vec<(u8, u8)> = sent
            .iter()
            .map(|(_, m)| (m.message_type.into(), m.group_id.0))
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(pairs, vec![(1, 0), (2, 1), (3, 2), (1, 0)]);
        assert!(sent.iter().all(|(to, _)| to.is_broadcast()));
        assert_eq!(sent[0].1.sender_id, "MASTER_001");
    }

    #[tokio::test]
    async fn test_broadcast_requires_registration() {
        let mut h = harness(Config::broadcaster("MASTER_001"), MockTransport::default());
        // start() was never called, so the broadcast peer is missing
        assert!(h.node.broadcast_once().is_err());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_not_retried() {
        let transport = MockTransport {
            fail: true,
            ..Default::default()
        };
        let mut h = harness(Config::broadcaster("MASTER_001"), transport);
        h.node.start();
        drain(&mut h.events);

        assert!(h.node.broadcast_once().is_err());
        assert_eq!(h.node.state().last_sequence(), 1);
        let events = drain(&mut h.events);
        assert!(matches!(events.last(), Some(NodeEvent::SendFailed { .. })));

        // The next cycle moves on with a fresh sequence number
        assert!(h.node.broadcast_once().is_err());
        assert_eq!(h.node.state().last_sequence(), 2);
    }

    #[tokio::test]
    async fn test_refused_reply_not_reported_as_sent() {
        let transport = MockTransport {
            fail: true,
            ..Default::default()
        };
        let mut h = harness(listener(), transport);

        let command = Message::broadcast("NODE_A", "reboot", MessageType::Command, GroupId(1), 1, 10);
        h.node.handle_event(received(&command)).await;

        let names: Vec<&str> = drain(&mut h.events)
            .iter()
            .map(|e| match e {
                NodeEvent::Admitted { .. } => "admitted",
                NodeEvent::PeerAdded { .. } => "peer_added",
                NodeEvent::ReplySent { .. } => "reply_sent",
                NodeEvent::SendFailed { .. } => "send_failed",
                _ => "other",
            })
            .collect();
        assert_eq!(names, vec!["admitted", "peer_added", "send_failed"]);
        assert_eq!(h.node.state().phase(), &DispatchPhase::Terminal);
    }

    #[tokio::test]
    async fn test_broadcaster_logs_replies() {
        let mut h = harness(Config::broadcaster("MASTER_001"), MockTransport::default());
        let reply = Message::reply("NODE_003", "Command received and processed", GroupId(1), 77);

        for _ in 0..2 {
            assert!(h.node.handle_event(received(&reply)).await.is_none());
        }
        let replies = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, NodeEvent::ReplyReceived { .. }))
            .count();
        assert_eq!(replies, 2);
    }

    #[tokio::test]
    async fn test_static_peers_and_registry() {
        let config = Config {
            static_peers: vec![PARTNER, MASTER],
            ..listener()
        };
        let mut h = harness(config, MockTransport::default());
        h.node = h.node.with_registry(Box::new(MemoryRegistry::new(1)));
        h.node.start();

        assert!(h.node.state().peers().contains(&PARTNER));
        assert!(!h.node.state().peers().contains(&MASTER));
        let events = drain(&mut h.events);
        assert!(events.contains(&NodeEvent::PeerAdded { address: PARTNER }));
        assert!(events.iter().any(|e| matches!(
            e,
            NodeEvent::PeerRejected { error: PeerError::TableFull { .. }, .. }
        )));
    }

    #[tokio::test]
    async fn test_run_stops_when_transport_closes() {
        let h = harness(listener(), MockTransport::default());
        let Harness { node, callbacks, mut events, .. } = h;

        callbacks.on_send_complete(Some(MASTER), SendStatus::Success);
        drop(callbacks);

        assert_ok!(node.run().await);
        let events = drain(&mut events);
        assert!(matches!(events.first(), Some(NodeEvent::Started { .. })));
        assert!(events.contains(&NodeEvent::SendCompleted {
            destination: Some(MASTER),
            status: SendStatus::Success,
        }));
    }
}
