#![cfg(feature = "metrics")]
//! Tests for `agentlink` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use agentlink::{
    client::FailureClass,
    metrics::{
        COMMANDS_TOTAL,
        CONNECTED,
        CommandOutcome,
        RECONNECTS_TOTAL,
        REPLIES_TOTAL,
        ReplyOutcome,
    },
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Read the counters `name{label}` for each of `labels` from one snapshot.
///
/// Taking a snapshot drains the recorder, so related counters must be read
/// together.
fn counters_with_labels(
    snapshotter: &Snapshotter,
    name: &str,
    labels: &[(&str, &str)],
) -> Vec<u64> {
    let snapshot = snapshotter.snapshot().into_vec();
    labels
        .iter()
        .map(|label| {
            snapshot
                .iter()
                .find_map(|(k, _, _, v)| {
                    let matches = k.key().name() == name
                        && k
                            .key()
                            .labels()
                            .any(|l| l.key() == label.0 && l.value() == label.1);
                    match v {
                        DebugValue::Counter(c) if matches => Some(*c),
                        _ => None,
                    }
                })
                .unwrap_or(0)
        })
        .collect()
}

fn counter_with_label(snapshotter: &Snapshotter, name: &str, label: (&str, &str)) -> u64 {
    counters_with_labels(snapshotter, name, &[label])[0]
}

#[rstest]
#[case(CommandOutcome::Sent, "sent")]
#[case(CommandOutcome::SendFailed, "send_failed")]
fn command_outcomes_are_labelled(#[case] outcome: CommandOutcome, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || agentlink::metrics::inc_commands(outcome));
    assert_eq!(
        counter_with_label(&snapshotter, COMMANDS_TOTAL, ("outcome", label)),
        1
    );
}

#[rstest]
#[case(1)]
#[case(3)]
fn unmatched_replies_are_counted(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| agentlink::metrics::inc_replies(ReplyOutcome::Unmatched));
        agentlink::metrics::inc_replies(ReplyOutcome::Matched);
    });
    let counts = counters_with_labels(
        &snapshotter,
        REPLIES_TOTAL,
        &[("outcome", "unmatched"), ("outcome", "matched")],
    );
    assert_eq!(counts, vec![expected, 1]);
}

#[rstest]
#[case(FailureClass::Network, "network")]
#[case(FailureClass::Other, "other")]
fn reconnects_are_labelled_by_failure_class(#[case] class: FailureClass, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || agentlink::metrics::inc_reconnects(class));
    assert_eq!(
        counter_with_label(&snapshotter, RECONNECTS_TOTAL, ("class", label)),
        1
    );
}

#[test]
fn connected_gauge_tracks_last_value() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        agentlink::metrics::set_connected(true);
        agentlink::metrics::set_connected(false);
    });
    let found = snapshotter.snapshot().into_vec().into_iter().any(|(k, _, _, v)| {
        k.key().name() == CONNECTED
            && matches!(v, DebugValue::Gauge(g) if g.into_inner().abs() < f64::EPSILON)
    });
    assert!(found, "connected gauge not recorded as disconnected");
}
