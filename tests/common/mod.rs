//! Shared utilities for integration tests.
//!
//! Provides a polling helper and a way to reserve a loopback port that
//! nothing listens on.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use agentlink::{BackoffPolicy, CommandClient, CommandClientBuilder, TcpConnector};
use tokio::time::{sleep, timeout};

/// Back-off short enough for reconnect tests to run in real time.
pub const FAST_BACKOFF: BackoffPolicy = BackoffPolicy {
    network_delay: Duration::from_millis(50),
    other_delay: Duration::from_millis(50),
};

/// Address of a loopback port that was free a moment ago.
pub fn closed_port() -> SocketAddr {
    let listener =
        StdTcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).expect("bind port");
    listener.local_addr().expect("read local address")
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Build and start a client for `url`, waiting for it to connect.
pub async fn connected_client(
    builder: CommandClientBuilder,
) -> CommandClient<TcpConnector> {
    let client = builder.backoff(FAST_BACKOFF).build();
    client.start();
    wait_until(|| client.connected()).await;
    client
}
