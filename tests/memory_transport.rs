//! Tests for driving the public client API over the in-memory transport.

use std::{io, sync::Arc, time::Duration};

use agentlink::{CommandClient, CommandError, Message, TransportError};
use agentlink_testing::{MemoryBus, MemoryConnector, RemoteAgent, memory_transport};
use tokio::time::timeout;

async fn started() -> (CommandClient<MemoryConnector>, MemoryBus, RemoteAgent) {
    let (connector, mut bus) = memory_transport();
    let client = CommandClient::builder("memory://bus", "$management").build_with(connector);
    client.start();
    let agent = timeout(Duration::from_secs(5), bus.next_agent())
        .await
        .expect("client connects")
        .expect("bus open");
    (client, bus, agent)
}

#[tokio::test]
async fn request_round_trips_through_memory_bus() {
    let (client, _bus, mut agent) = started().await;
    let client = Arc::new(client);

    let caller = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.request(Message::new("list-queues")).await }
    });
    let command = agent.next_command().await.expect("command forwarded");
    assert_eq!(command.body, b"list-queues");
    assert_eq!(
        command.properties.reply_to.as_deref(),
        Some(agent.reply_address())
    );
    agent.reply(&command, "[]");

    let reply = caller.await.expect("caller task").expect("reply delivered");
    assert_eq!(reply.body, b"[]");
    client.stop().await;
}

#[tokio::test]
async fn scripted_send_failure_reaches_the_caller() {
    let (client, bus, _agent) = started().await;
    bus.fail_send(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));

    let failed = client.request(Message::new("status")).await;
    assert!(
        matches!(failed, Err(CommandError::Send(TransportError::Io(_)))),
        "expected the scripted send error, got {failed:?}"
    );
    client.stop().await;
}
