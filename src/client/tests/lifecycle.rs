//! Start/stop and teardown tests for the command client.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;

use super::helpers::{client_with, connected_client, connected_client_with, wait_until};
use crate::{
    client::{CommandError, OrphanPolicy},
    message::Message,
    test_helpers::Released,
    transport::{ConnectOptions, TransportError},
};

#[tokio::test]
async fn stop_on_idle_client_reports_disconnected() {
    let (client, _bus, _agent) = connected_client().await;
    assert!(client.connected());

    timeout(Duration::from_secs(1), client.stop())
        .await
        .expect("stop should return once the worker has torn down");

    assert!(!client.connected(), "stopped client must report disconnected");
}

#[tokio::test]
async fn teardown_releases_links_in_reverse_order() {
    let (client, bus, _agent) = connected_client().await;
    client.stop().await;
    assert_eq!(
        bus.released(),
        vec![
            Released::Receiver,
            Released::Sender,
            Released::Session,
            Released::Connection,
        ]
    );
}

#[tokio::test]
async fn request_after_stop_fails_fast() {
    let (client, _bus, _agent) = connected_client().await;
    client.stop().await;
    let result = client.request(Message::new("late")).await;
    assert!(matches!(result, Err(CommandError::Stopped)), "got {result:?}");
}

#[tokio::test]
async fn stop_without_start_returns() {
    let (client, bus) = client_with(|builder| builder);
    timeout(Duration::from_secs(1), client.stop())
        .await
        .expect("stop on an unstarted client should return");
    assert_eq!(bus.dials(), 0);
    assert!(matches!(
        client.request(Message::default()).await,
        Err(CommandError::Stopped)
    ));
}

#[tokio::test]
async fn second_start_is_ignored() {
    let (client, bus, _agent) = connected_client().await;
    client.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.dials(), 1, "a second start must not spawn another worker");
    client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn queued_request_fails_when_client_stops() {
    let (client, bus) = client_with(|builder| builder);
    bus.fail_dial(TransportError::Refused("not yet".into()));
    client.start();
    wait_until(|| bus.dials() == 1).await;

    let client = Arc::new(client);
    let caller = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.request(Message::new("queued")).await }
    });
    tokio::task::yield_now().await;

    client.stop().await;
    let result = caller.await.expect("join caller");
    assert!(matches!(result, Err(CommandError::Stopped)), "got {result:?}");
    assert_eq!(bus.dials(), 1, "stop must interrupt the back-off");
}

#[tokio::test]
async fn unanswered_requests_are_retained_across_teardown_by_default() {
    let (client, _bus, mut agent) = connected_client().await;
    let client = Arc::new(client);

    let caller = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .request_with_timeout(Message::new("orphan"), Duration::from_millis(200))
                .await
        }
    });
    agent.next_command().await.expect("command sent");
    agent.fail_receive(TransportError::Protocol("link reset".into()));

    let result = caller.await.expect("join caller");
    assert!(
        matches!(result, Err(CommandError::Timeout(_))),
        "retained request should only end on its own deadline, got {result:?}"
    );
    client.stop().await;
}

#[tokio::test]
async fn fail_policy_notifies_unanswered_requests() {
    let (client, _bus, mut agent) =
        connected_client_with(|builder| builder.orphan_policy(OrphanPolicy::Fail)).await;
    let client = Arc::new(client);

    let caller = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .request_with_timeout(Message::new("orphan"), Duration::from_secs(5))
                .await
        }
    });
    agent.next_command().await.expect("command sent");
    agent.fail_receive(TransportError::Protocol("link reset".into()));

    let result = caller.await.expect("join caller");
    assert!(
        matches!(result, Err(CommandError::ConnectionLost)),
        "got {result:?}"
    );
    client.stop().await;
}

#[tokio::test]
async fn connect_options_are_passed_through_verbatim() {
    let options = ConnectOptions::default()
        .credentials("admin", "secret")
        .idle_timeout(Duration::from_secs(30))
        .property("tenant", "blue");
    let (client, bus, _agent) =
        connected_client_with(|builder| builder.connect_options(options.clone())).await;
    assert_eq!(bus.last_options(), Some(options));
    client.stop().await;
}

#[tokio::test]
async fn second_stop_returns_immediately() {
    let (client, bus, _agent) = connected_client().await;
    client.stop().await;
    timeout(Duration::from_secs(1), client.stop())
        .await
        .expect("a repeated stop should return");
    assert!(!client.connected());
    assert_eq!(bus.released().len(), 4, "links are released only once");
}
