//! Tests for `wiredispatch` metrics helpers and the counters recorded
//! while dispatching.
//!
//! Metrics are captured with `metrics_util::debugging::DebuggingRecorder`.
#![cfg(feature = "metrics")]

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use wiredispatch::{
    Dispatcher,
    Request,
    VersionTag,
    handler::{HandlerError, HandlerResult, handler_fn},
    metrics::{self as wd_metrics, Direction},
};
use wiredispatch_testing::{DecodeScript, RecordingChannel, RecordingSink, ScriptedCodec, request_frame};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key().labels().any(|l| l.key() == k && l.value() == v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wd_metrics::inc_frames(direction));
    assert_eq!(
        counter_value(&snapshotter, wd_metrics::FRAMES_PROCESSED, Some(("direction", label))),
        1
    );
}

#[rstest]
#[case(1)]
#[case(3)]
fn connection_panics_are_counted(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| wd_metrics::inc_connection_panics());
    });
    assert_eq!(
        counter_value(&snapshotter, wd_metrics::CONNECTION_PANICS, None),
        expected
    );
}

#[test]
fn decode_failure_counts_error_and_both_directions() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let codec = Arc::new(ScriptedCodec::new());
    codec.script_decode(DecodeScript::Fail("garbled".into()));
    let dispatcher = Dispatcher::builder(
        Arc::clone(&codec),
        handler_fn(|_| async { Ok::<_, HandlerError>(HandlerResult::from("unused")) }),
        RecordingSink::new(),
    )
    .build();
    let channel = Arc::new(RecordingChannel::new());
    let frame = request_frame(&Request::new(1, VersionTag::V1, "svc", "m", &b""[..]));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    metrics::with_local_recorder(&recorder, || {
        runtime
            .block_on(dispatcher.dispatch(channel.clone(), frame))
            .expect("dispatch");
    });

    assert_eq!(
        counter_value(&snapshotter, wd_metrics::ERRORS_TOTAL, Some(("kind", "decode"))),
        1
    );
    assert_eq!(
        counter_value(&snapshotter, wd_metrics::FRAMES_PROCESSED, Some(("direction", "inbound"))),
        1
    );
    assert_eq!(
        counter_value(&snapshotter, wd_metrics::FRAMES_PROCESSED, Some(("direction", "outbound"))),
        1
    );
}
