//! Runs one broadcaster and two listeners on a simulated radio medium.
//!
//! ```text
//! cargo run --example broadcast_sim
//! ```

use std::sync::Arc;
use std::time::Duration;

use groupcast::network::RadioMedium;
use groupcast::{Config, GroupId, MacAddress, Node};

#[tokio::main]
async fn main() -> groupcast::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let medium = RadioMedium::new();
    let mut nodes = Vec::new();

    let broadcaster = Config {
        broadcast_interval: Duration::from_secs(1),
        ..Config::broadcaster("MASTER_001")
    };
    let listeners = [
        Config::listener("NODE_003", GroupId(1)),
        Config::listener("NODE_004", GroupId(2)),
    ];

    for config in std::iter::once(broadcaster).chain(listeners) {
        let address = MacAddress::random();
        let (transport, events) = medium.attach(address, config.event_queue);
        let node = Node::new(&config, Arc::new(transport), events)?;
        nodes.push(tokio::spawn(node.run()));
    }

    println!("Running {} nodes for 10 seconds...", nodes.len());
    tokio::time::sleep(Duration::from_secs(10)).await;

    for node in &nodes {
        node.abort();
    }
    let _ = futures::future::join_all(nodes).await;
    println!("\nDone");
    Ok(())
}
