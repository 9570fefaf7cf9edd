//! Shared test helpers for command client tests.

use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::{
    client::{CommandClient, CommandClientBuilder},
    test_helpers::{MemoryBus, MemoryConnector, RemoteAgent, memory_transport},
};

/// Command address used by every test client.
pub const COMMAND_ADDRESS: &str = "$management";

/// Build an unstarted client over the in-memory transport.
pub fn client_with<F>(configure: F) -> (CommandClient<MemoryConnector>, MemoryBus)
where
    F: FnOnce(CommandClientBuilder) -> CommandClientBuilder,
{
    let (connector, bus) = memory_transport();
    let client = configure(CommandClientBuilder::new("memory://bus", COMMAND_ADDRESS))
        .build_with(connector);
    (client, bus)
}

/// Start a default client and wait for its first connection.
pub async fn connected_client() -> (CommandClient<MemoryConnector>, MemoryBus, RemoteAgent) {
    connected_client_with(|builder| builder).await
}

/// Start a configured client and wait for its first connection.
pub async fn connected_client_with<F>(
    configure: F,
) -> (CommandClient<MemoryConnector>, MemoryBus, RemoteAgent)
where
    F: FnOnce(CommandClientBuilder) -> CommandClientBuilder,
{
    let (client, mut bus) = client_with(configure);
    client.start();
    let agent = next_agent(&mut bus).await;
    wait_until(|| client.connected()).await;
    (client, bus, agent)
}

/// Wait for the client's next connection.
pub async fn next_agent(bus: &mut MemoryBus) -> RemoteAgent {
    timeout(Duration::from_secs(120), bus.next_agent())
        .await
        .expect("client did not connect in time")
        .expect("connector dropped")
}

/// Poll `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
