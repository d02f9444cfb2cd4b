//! Admission control with a saturated worker pool.

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use log::Level;
use rstest::rstest;
use serial_test::serial;
use tokio::{
    sync::{Semaphore, mpsc},
    time::timeout,
};
use wiredispatch::{
    Dispatcher,
    ErrorKind,
    Request,
    Response,
    StatisticCallback,
    VersionTag,
    handler::{HandlerError, HandlerResult, handler_fn},
    message::Outcome,
    pool::{PoolConfig, WorkerPool},
};
use wiredispatch_testing::{
    DecodeScript,
    LoggerHandle,
    RecordingChannel,
    RecordingSink,
    ScriptedCodec,
    logger,
    request_frame,
    response_frame,
};

struct Saturated {
    dispatcher: Dispatcher,
    channel: Arc<RecordingChannel>,
    sink: Arc<RecordingSink>,
    gate: Arc<Semaphore>,
}

fn blocking_request(id: u64) -> Request {
    Request::new(id, VersionTag::V1, "demo.Slow", "block", &b""[..])
}

/// One worker busy on a gated request and one request queued behind it.
async fn saturated() -> Saturated {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let handler = {
        let gate = Arc::clone(&gate);
        handler_fn(move |request: Request| {
            let gate = Arc::clone(&gate);
            let started = started_tx.clone();
            async move {
                let _ = started.send(request.request_id());
                let _permit = gate.acquire().await.map_err(HandlerError::from)?;
                Ok(HandlerResult::from("done"))
            }
        })
    };
    let pool = WorkerPool::new(PoolConfig::default().workers(1).queue_capacity(1)).expect("pool");
    let sink = Arc::new(RecordingSink::new());
    let dispatcher = Dispatcher::builder(ScriptedCodec::new(), handler, Arc::clone(&sink))
        .pool(pool)
        .build();
    let channel = Arc::new(RecordingChannel::new());

    dispatcher
        .dispatch(channel.clone(), request_frame(&blocking_request(1)))
        .await
        .expect("first request admitted");
    assert_eq!(started_rx.recv().await, Some(1), "worker picked up request 1");
    dispatcher
        .dispatch(channel.clone(), request_frame(&blocking_request(2)))
        .await
        .expect("second request queued");

    Saturated {
        dispatcher,
        channel,
        sink,
        gate,
    }
}

#[tokio::test]
async fn saturated_pool_rejects_with_overload_reply() {
    let s = saturated().await;
    assert_eq!(s.dispatcher.rejections().peek(), 0);

    s.dispatcher
        .dispatch(s.channel.clone(), request_frame(&blocking_request(7)))
        .await
        .expect("rejection is not an error");

    let replies = s.channel.replies();
    assert_eq!(replies.len(), 1, "only the rejection has been answered");
    assert_eq!(replies[0].request_id(), 7);
    assert_eq!(replies[0].version(), VersionTag::V1);
    let error = replies[0].outcome().error().expect("error reply");
    assert_eq!(error.kind(), ErrorKind::ServiceOverload);
    assert!(!error.retryable());
    assert!(error.message().contains("127.0.0.1:7878"), "{}", error.message());
    assert_eq!(s.dispatcher.rejections().peek(), 1);

    s.gate.add_permits(2);
    timeout(Duration::from_secs(2), async {
        while s.channel.writes().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queued requests complete after release");
    let mut ids: Vec<u64> = s.channel.replies().iter().map(Response::request_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 7]);
}

#[tokio::test]
async fn statistics_poll_drains_rejections() {
    let s = saturated().await;
    for id in [7, 8] {
        s.dispatcher
            .dispatch(s.channel.clone(), request_frame(&blocking_request(id)))
            .await
            .expect("rejected");
    }

    assert_eq!(
        s.dispatcher.statistic_callback().as_deref(),
        Some("type: rpc name: reject_request_pool total_count: 1 reject_count: 2")
    );
    assert_eq!(s.dispatcher.statistic_callback(), None);
    s.gate.add_permits(2);
}

#[tokio::test]
async fn saturated_pool_processes_responses_inline() {
    let s = saturated().await;
    let response = Response::new(9, VersionTag::V1, Outcome::Value("pong".into()));

    s.dispatcher
        .dispatch(s.channel.clone(), response_frame(&response))
        .await
        .expect("response processed");

    let delivered = s.sink.delivered();
    assert_eq!(delivered.len(), 1, "delivered before dispatch returned");
    assert_eq!(delivered[0].request_id(), 9);
    assert_eq!(s.dispatcher.rejections().peek(), 0, "responses are not counted");
    s.gate.add_permits(2);
}

#[rstest]
#[serial]
#[tokio::test]
async fn rejection_logs_pool_occupancy(mut logger: LoggerHandle) {
    let s = saturated().await;
    s.dispatcher
        .dispatch(s.channel.clone(), request_frame(&blocking_request(7)))
        .await
        .expect("rejected");

    let errors = logger.messages_at(Level::Error);
    let line = errors
        .iter()
        .find(|m| m.contains("request 7 rejected"))
        .unwrap_or_else(|| panic!("no rejection log in {errors:?}"));
    assert!(line.contains("active=1"), "{line}");
    assert!(line.contains("queued=1"), "{line}");
    assert!(line.contains("pool_size=1"), "{line}");
    s.gate.add_permits(2);
}

#[rstest]
#[serial]
#[tokio::test]
async fn inline_response_fallback_is_logged(mut logger: LoggerHandle) {
    let s = saturated().await;
    let response = Response::new(10, VersionTag::V1, Outcome::Value("pong".into()));
    s.dispatcher
        .dispatch(s.channel.clone(), response_frame(&response))
        .await
        .expect("response processed");

    let warnings = logger.messages_at(Level::Warn);
    assert!(
        warnings
            .iter()
            .any(|m| m.contains("processing response inline") && m.contains("request_id=10")),
        "{warnings:?}"
    );
    s.gate.add_permits(2);
}

#[tokio::test]
async fn pool_shutdown_finishes_queued_requests() {
    let s = saturated().await;
    let pool = s.dispatcher.pool().cloned().expect("pool configured");

    let mut stopping = Box::pin(pool.shutdown());
    assert!(
        stopping.as_mut().now_or_never().is_none(),
        "request 1 still holds the worker"
    );
    s.gate.add_permits(2);
    timeout(Duration::from_secs(2), stopping)
        .await
        .expect("pool drained");

    let mut ids: Vec<u64> = s.channel.replies().iter().map(Response::request_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn pooled_unsupported_message_closes_channel() {
    let codec = Arc::new(ScriptedCodec::new());
    codec.script_decode(DecodeScript::Unsupported("Heartbeat".into()));
    let handler = handler_fn(|_request: Request| async move {
        Ok::<_, HandlerError>(HandlerResult::from("unreachable"))
    });
    let pool = WorkerPool::new(PoolConfig::default().workers(1)).expect("pool");
    let dispatcher = Dispatcher::builder(Arc::clone(&codec), handler, RecordingSink::new())
        .pool(pool)
        .build();
    let channel = Arc::new(RecordingChannel::new());

    dispatcher
        .dispatch(channel.clone(), request_frame(&blocking_request(4)))
        .await
        .expect("decoding happens on the worker");
    timeout(Duration::from_secs(2), async {
        while channel.close_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("channel closed by the worker");

    assert_eq!(channel.close_calls(), 1);
    assert!(channel.writes().is_empty());
    assert_eq!(codec.decode_calls(), 1);
}
