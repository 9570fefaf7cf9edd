//! Reconnection and back-off tests for the command client.

use std::{io, sync::Arc, time::Duration};

use rstest::rstest;
use tokio::time::{Instant, sleep, timeout};

use super::helpers::{client_with, connected_client, next_agent, wait_until};
use crate::{
    client::CommandError,
    message::Message,
    test_helpers::Released,
    transport::TransportError,
};

fn refused() -> TransportError {
    TransportError::Io(io::Error::from(io::ErrorKind::ConnectionRefused))
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_three_failed_dials() {
    let (client, mut bus) = client_with(|builder| builder);
    bus.fail_dial(refused());
    bus.fail_dial(TransportError::Refused("busy".into()));
    bus.fail_dial(TransportError::ConnectTimeout);
    let started = Instant::now();
    client.start();

    // Attempts land at 0s, 30s, 35s and 65s of virtual time.
    sleep(Duration::from_secs(64)).await;
    assert_eq!(bus.dials(), 3);
    assert!(!client.connected(), "client must not report connected before the fourth dial");

    let mut agent = next_agent(&mut bus).await;
    wait_until(|| client.connected()).await;
    assert_eq!(bus.dials(), 4);
    assert!(started.elapsed() >= Duration::from_secs(65));

    let client = Arc::new(client);
    let caller = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.request(Message::new("ping")).await }
    });
    let command = agent.next_command().await.expect("command sent");
    agent.reply(&command, "pong");
    let reply = caller.await.expect("join caller").expect("reply delivered");
    assert_eq!(reply.body, b"pong");
    client.stop().await;
}

#[rstest]
#[case::protocol(TransportError::Protocol("link reset".into()), Duration::from_secs(5))]
#[case::detached(TransportError::Detached("forced".into()), Duration::from_secs(5))]
#[case::network(
    TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
    Duration::from_secs(30)
)]
#[tokio::test(start_paused = true)]
async fn receive_failure_triggers_reconnect_after_class_backoff(
    #[case] failure: TransportError,
    #[case] backoff: Duration,
) {
    let (client, mut bus, agent) = connected_client().await;
    let started = Instant::now();
    agent.fail_receive(failure);

    wait_until(|| !client.connected()).await;
    assert_eq!(
        bus.released(),
        vec![
            Released::Receiver,
            Released::Sender,
            Released::Session,
            Released::Connection,
        ],
        "the failed connection must be torn down before reconnecting"
    );

    let agent = next_agent(&mut bus).await;
    assert!(started.elapsed() >= backoff, "reconnected before the back-off elapsed");
    assert!(started.elapsed() < backoff + Duration::from_secs(1));
    assert_eq!(agent.reply_address(), "reply-2", "a fresh reply link is attached");
    assert_eq!(bus.dials(), 2);
    wait_until(|| client.connected()).await;
    client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn request_waits_for_reconnection() {
    let (client, mut bus) = client_with(|builder| builder);
    bus.fail_dial(TransportError::Refused("warming up".into()));
    client.start();

    let client = Arc::new(client);
    let caller = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.request(Message::new("patient")).await }
    });

    let mut agent = next_agent(&mut bus).await;
    let command = agent.next_command().await.expect("command sent after reconnect");
    assert_eq!(command.body, b"patient");
    agent.reply(&command, "finally");

    let reply = caller.await.expect("join caller").expect("reply delivered");
    assert_eq!(reply.body, b"finally");
    assert_eq!(bus.dials(), 2);
    client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_backoff() {
    let (client, bus) = client_with(|builder| builder);
    bus.fail_dial(refused());
    client.start();
    wait_until(|| bus.dials() == 1).await;

    let started = Instant::now();
    timeout(Duration::from_secs(1), client.stop())
        .await
        .expect("stop must not wait out the back-off");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bus.dials(), 1, "no further dial after stop");
    assert!(matches!(
        client.request(Message::new("after")).await,
        Err(CommandError::Stopped)
    ));
}
