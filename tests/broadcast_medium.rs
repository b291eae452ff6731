use std::sync::Arc;
use std::time::Duration;

use groupcast::network::RadioMedium;
use groupcast::node::{ChannelSink, NodeEvent};
use groupcast::{Config, GroupId, MacAddress, MessageType, Node};
use tokio::sync::mpsc;
use tokio::time::timeout;

const MASTER: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
const NODE_G1: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);
const NODE_G2: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x03]);

fn spawn_node(
    medium: &RadioMedium,
    address: MacAddress,
    config: Config,
) -> mpsc::UnboundedReceiver<NodeEvent> {
    let (transport, events) = medium.attach(address, config.event_queue);
    let (sink, rx) = ChannelSink::new();
    let node = Node::new(&config, Arc::new(transport), events)
        .unwrap()
        .with_sink(Arc::new(sink));
    tokio::spawn(node.run());
    rx
}

async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<NodeEvent>, mut pred: F) -> NodeEvent
where
    F: FnMut(&NodeEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("node stopped");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not seen in time")
}

#[tokio::test]
async fn test_command_round_trip_over_medium() {
    let medium = RadioMedium::new();

    let listener = |id: &str, group| Config {
        reply_delay: Duration::from_millis(5),
        ..Config::listener(id, GroupId(group))
    };
    let mut g1 = spawn_node(&medium, NODE_G1, listener("NODE_003", 1));
    let mut g2 = spawn_node(&medium, NODE_G2, listener("NODE_004", 2));

    let broadcaster = Config {
        broadcast_interval: Duration::from_millis(20),
        ..Config::broadcaster("MASTER_001")
    };
    let mut master = spawn_node(&medium, MASTER, broadcaster);

    // Group 1 admits the command and answers it
    let event = wait_for(&mut g1, |e| {
        matches!(e, NodeEvent::Admitted { message, .. } if message.message_type == MessageType::Command)
    })
    .await;
    if let NodeEvent::Admitted { source, message } = event {
        assert_eq!(source, Some(MASTER));
        assert_eq!(message.sender_id, "MASTER_001");
        assert_eq!(message.group_id, GroupId(1));
        assert_eq!(message.sequence_number, 2);
    }
    wait_for(&mut g1, |e| matches!(e, NodeEvent::ReplySent { to, .. } if *to == MASTER)).await;

    // Group 2 skips the group 1 command but takes the group 2 alert
    wait_for(&mut g2, |e| {
        matches!(e, NodeEvent::ForeignGroup { group, .. } if *group == GroupId(1))
    })
    .await;
    wait_for(&mut g2, |e| {
        matches!(e, NodeEvent::Admitted { message, .. } if message.message_type == MessageType::Alert)
    })
    .await;

    // The broadcaster hears the reply from group 1
    let event = wait_for(&mut master, |e| matches!(e, NodeEvent::ReplyReceived { .. })).await;
    if let NodeEvent::ReplyReceived { source, message } = event {
        assert_eq!(source, NODE_G1);
        assert_eq!(message.sender_id, "NODE_003");
        assert_eq!(message.sequence_number, 0);
        assert_eq!(message.body, "Command received and processed");
    }
}

#[tokio::test]
async fn test_every_broadcast_completes() {
    let medium = RadioMedium::new();
    let config = Config {
        broadcast_interval: Duration::from_millis(10),
        ..Config::broadcaster("MASTER_001")
    };
    let mut master = spawn_node(&medium, MASTER, config);

    for _ in 0..3 {
        wait_for(&mut master, |e| {
            matches!(
                e,
                NodeEvent::SendCompleted { destination: Some(d), status: groupcast::network::SendStatus::Success }
                    if d.is_broadcast()
            )
        })
        .await;
    }
}
