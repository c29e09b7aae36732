//! Session lifecycle tests driven through [`SessionManager`] with mock capabilities.

use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use crate::cancel::{AbortController, CancelReason};
use crate::codec;
use crate::config::{CameraFacing, ReceiveConfig, SendConfig};
use crate::manager::{SessionKind, SessionManager};
use crate::payload::ReceivedPayload;
use crate::renderer::RenderBackend;
use crate::session::{ReceiveOptions, ReceiveProgress, ReceiveState, SendOptions, SendState};
use crate::test_utils::{ChannelScanner, MockRenderer, RenderCall};
use crate::SyncError;

const CHUNK: usize = 25;

fn rotating_config() -> SendConfig {
    SendConfig::default().with_chunk_size(CHUNK)
}

/// A text payload that encodes to exactly `frames` frames at [`CHUNK`].
fn payload_of(frames: usize) -> String {
    "abcde".repeat(frames * CHUNK / 5)
}

fn index_recorder() -> (SendOptions, mpsc::UnboundedReceiver<usize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let options = SendOptions::new(rotating_config()).on_frame_rendered(move |frame| {
        let _ = tx.send(frame.frame_index);
    });
    (options, rx)
}

fn settle() -> tokio::time::Sleep {
    tokio::time::sleep(Duration::from_secs(2))
}

#[tokio::test(start_paused = true)]
async fn single_frame_is_rendered_once_and_held() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let renderer = MockRenderer::new();
    let log = renderer.log();
    let (options, mut shown) = index_recorder();

    let mut session = manager.send("hello", renderer, options).expect("valid send");
    session.started().await.expect("first frame displayed");
    assert!(matches!(session.state(), SendState::Holding));

    settle().await;

    let wire = codec::encode("hello", CHUNK).remove(0);
    assert_eq!(log.calls(), vec![RenderCall::Create { text: wire, size: 150 }]);
    assert_eq!(shown.try_recv().ok(), Some(0));
    assert!(shown.try_recv().is_err(), "a held frame must not trigger more callbacks");
}

#[tokio::test(start_paused = true)]
async fn rotation_renders_each_frame_once_then_replays() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let renderer = MockRenderer::new();
    let log = renderer.log();
    let (options, mut shown) = index_recorder();
    let wires = codec::encode(&payload_of(3), CHUNK);

    let mut session = manager.send(payload_of(3), renderer, options).expect("valid send");
    session.started().await.expect("rotation started");
    assert!(matches!(session.state(), SendState::Rotating));

    let mut indices = Vec::new();
    for _ in 0..7 {
        indices.push(shown.recv().await.expect("tick callback"));
    }
    session.cancel("done");

    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);

    let expected = vec![
        RenderCall::Create { text: wires[0].clone(), size: 150 },
        RenderCall::Capture(wires[0].clone()),
        RenderCall::Update(wires[1].clone()),
        RenderCall::Capture(wires[1].clone()),
        RenderCall::Update(wires[2].clone()),
        RenderCall::Capture(wires[2].clone()),
        RenderCall::Display(wires[0].clone()),
        RenderCall::Display(wires[1].clone()),
        RenderCall::Display(wires[2].clone()),
        RenderCall::Display(wires[0].clone()),
    ];
    let calls = log.calls();
    assert_eq!(&calls[..expected.len()], expected.as_slice());
    assert_eq!(log.render_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn ticks_follow_the_configured_rate() {
    let manager = SessionManager::new();
    let (tx, mut shown) = mpsc::unbounded_channel();
    let options = SendOptions::new(rotating_config().with_max_frames_per_second(4))
        .on_frame_rendered(move |_| {
            let _ = tx.send(tokio::time::Instant::now());
        });

    let _session = manager.send(payload_of(2), MockRenderer::new(), options).expect("valid send");

    let first = shown.recv().await.expect("first tick");
    let second = shown.recv().await.expect("second tick");
    assert_eq!(second - first, Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn frame_size_falls_back_to_container_then_minimum() {
    let manager = SessionManager::new();
    let renderer = MockRenderer::new().with_container_size(480);
    let log = renderer.log();

    let mut session =
        manager.send("hello", renderer, SendOptions::default()).expect("valid send");
    session.started().await.expect("displayed");

    assert!(matches!(log.calls().first(), Some(RenderCall::Create { size: 480, .. })));
}

#[tokio::test(start_paused = true)]
async fn unknown_backend_fails_multi_frame_send() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let renderer = MockRenderer::new().with_backend(None);
    let log = renderer.log();
    let (options, mut shown) = index_recorder();

    let mut session = manager.send(payload_of(3), renderer, options).expect("valid send");
    let error = session.started().await.expect_err("no backend");

    assert!(matches!(error, SyncError::DeviceCompatibility { .. }));
    assert!(matches!(session.state(), SendState::Failed(SyncError::DeviceCompatibility { .. })));
    assert_eq!(log.render_count(), 1);
    settle().await;
    assert!(log.detached());
    assert!(shown.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn unknown_backend_is_fine_for_a_single_frame() {
    let manager = SessionManager::new();
    let renderer = MockRenderer::new().with_backend(None);

    let mut session = manager.send("tiny", renderer, SendOptions::default()).expect("valid send");

    session.started().await.expect("single frame needs no snapshot");
    assert!(matches!(session.state(), SendState::Holding));
}

#[tokio::test(start_paused = true)]
async fn canvas_backend_rotates_like_image() {
    let manager = SessionManager::new();
    let renderer = MockRenderer::new().with_backend(Some(RenderBackend::Canvas));
    let log = renderer.log();
    let (options, mut shown) = index_recorder();

    let _session = manager.send(payload_of(2), renderer, options).expect("valid send");
    for _ in 0..4 {
        shown.recv().await.expect("tick");
    }

    assert_eq!(log.render_count(), 2);
    assert_eq!(log.display_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn render_failure_ends_the_session() {
    let manager = SessionManager::new();
    let renderer = MockRenderer::new().failing_updates();
    let log = renderer.log();

    let mut session =
        manager.send(payload_of(2), renderer, SendOptions::new(rotating_config())).expect("send");
    session.started().await.expect("first frame uses create");

    let error = session.closed().await;
    assert!(matches!(error, SyncError::Render { .. }));
    assert!(!error.is_cancelled());
    settle().await;
    assert!(log.detached());
}

#[tokio::test(start_paused = true)]
async fn state_stream_ends_in_a_terminal_state() {
    let manager = SessionManager::new();
    let renderer = MockRenderer::new().with_backend(None);
    let session =
        manager.send(payload_of(2), renderer, SendOptions::new(rotating_config())).expect("send");

    let mut states = std::pin::pin!(session.states());
    let mut seen = Vec::new();
    while let Some(state) = states.next().await {
        let done = state.is_terminal();
        seen.push(state);
        if done {
            break;
        }
    }

    assert!(matches!(seen.first(), Some(SendState::Idle)));
    assert!(matches!(seen.last(), Some(SendState::Failed(SyncError::DeviceCompatibility { .. }))));
}

#[tokio::test(start_paused = true)]
async fn caller_abort_stops_rotation_and_callbacks() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let caller = AbortController::new();
    let renderer = MockRenderer::new();
    let log = renderer.log();
    let (options, mut shown) = index_recorder();

    let mut session = manager
        .send(payload_of(4), renderer, options.signal(caller.signal()))
        .expect("valid send");
    shown.recv().await.expect("first tick");
    shown.recv().await.expect("second tick");

    caller.abort("user closed dialog");

    let error = session.closed().await;
    assert!(matches!(
        error,
        SyncError::Cancelled { reason: CancelReason::Aborted(ref reason) } if reason == "user closed dialog"
    ));
    assert!(matches!(session.state(), SendState::Cancelled(_)));

    settle().await;
    assert!(shown.try_recv().is_err(), "no callbacks after abort");
    assert!(log.detached());
    assert_eq!(manager.active(SessionKind::Send), None);
}

#[tokio::test(start_paused = true)]
async fn already_aborted_signal_never_renders() {
    let manager = SessionManager::new();
    let caller = AbortController::new();
    caller.abort("too late");
    let renderer = MockRenderer::new();
    let log = renderer.log();

    let mut session = manager
        .send("hello", renderer, SendOptions::default().signal(caller.signal()))
        .expect("validation does not look at the signal");

    let error = session.started().await.expect_err("aborted before first frame");
    assert!(error.is_cancelled());
    settle().await;
    assert_eq!(log.calls(), vec![RenderCall::Detach]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels_the_session() {
    let manager = SessionManager::new();
    let renderer = MockRenderer::new();
    let log = renderer.log();

    let mut session = manager.send(payload_of(2), renderer, SendOptions::default()).expect("send");
    session.started().await.expect("started");
    drop(session);

    settle().await;
    assert!(log.detached());
    assert_eq!(manager.active(SessionKind::Send), None);
}

#[tokio::test(start_paused = true)]
async fn new_send_supersedes_previous_send_only() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let (scanner, _feed) = ChannelScanner::new();
    let receiving = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    let mut first =
        manager.send(payload_of(3), MockRenderer::new(), SendOptions::default()).expect("send");
    first.started().await.expect("first started");

    let mut second =
        manager.send("replacement", MockRenderer::new(), SendOptions::default()).expect("send");

    let error = first.closed().await;
    assert!(matches!(error, SyncError::Cancelled { reason: CancelReason::Superseded }));
    assert!(matches!(first.state(), SendState::Superseded));

    second.started().await.expect("second started");
    settle().await;
    assert_eq!(manager.active(SessionKind::Send), Some(second.id()));
    assert_eq!(manager.active(SessionKind::Receive), Some(receiving.id()));
    assert!(matches!(receiving.state(), ReceiveState::Scanning));
}

#[tokio::test(start_paused = true)]
async fn invalid_send_still_supersedes_active_sender() {
    let manager = SessionManager::new();
    let mut first =
        manager.send(payload_of(2), MockRenderer::new(), SendOptions::default()).expect("send");
    first.started().await.expect("started");

    let error = manager.send("", MockRenderer::new(), SendOptions::default()).err();

    assert!(matches!(error, Some(SyncError::Validation { .. })));
    let closed = first.closed().await;
    assert!(matches!(closed, SyncError::Cancelled { reason: CancelReason::Superseded }));
    assert_eq!(manager.active(SessionKind::Send), None);
}

#[tokio::test]
async fn send_validation_rejects_bad_arguments() {
    let manager = SessionManager::new();

    let empty = manager.send("", MockRenderer::new(), SendOptions::default());
    assert!(matches!(empty, Err(SyncError::Validation { .. })));

    let scalar = manager.send(json!(42), MockRenderer::new(), SendOptions::default());
    assert!(matches!(scalar, Err(SyncError::Validation { .. })));

    let detached = manager.send("hello", MockRenderer::new().detached(), SendOptions::default());
    assert!(matches!(detached, Err(SyncError::Validation { .. })));
}

#[tokio::test]
async fn receive_validation_rejects_detached_scanner() {
    let manager = SessionManager::new();
    let (scanner, _feed) = ChannelScanner::new();

    let result = manager.receive(scanner.detached(), ReceiveOptions::default());

    assert!(matches!(result, Err(SyncError::Validation { .. })));
    assert_eq!(manager.active(SessionKind::Receive), None);
}

#[tokio::test(start_paused = true)]
async fn receive_reassembles_out_of_order_frames_with_noise() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let payload = json!({ "senderName": "Ann", "senderNote": "Hi there, see you at the gate" });
    let serialized = payload.to_string();
    let encoded = codec::encode_frames(&serialized, CHUNK);
    assert_eq!(encoded.frame_count(), 3);
    let wires = encoded.wires();

    let (scanner, feed) = ChannelScanner::new();
    let (tx, mut progress) = mpsc::unbounded_channel();
    let options = ReceiveOptions::default().on_frame_received(move |frame| {
        let _ = tx.send((frame.frame_index, frame.frames_read));
    });
    let mut session = manager.receive(scanner, options).expect("receive");

    feed.code("https://example.com/not-a-frame");
    feed.no_code();
    feed.code(wires[2].clone());
    feed.code(wires[0].clone());
    feed.code(wires[2].clone());
    feed.code(format!(":2:{}:1:3:future", encoded.data_set_id));
    feed.code(wires[1].clone());

    let received = session.result().await.expect("complete");
    assert_eq!(received.data_set_id, encoded.data_set_id);
    assert_eq!(received.frame_count, 3);
    assert_eq!(received.data, ReceivedPayload::Json(payload));

    let mut reports = Vec::new();
    while let Ok(report) = progress.try_recv() {
        reports.push(report);
    }
    assert_eq!(reports, vec![(2, 1), (0, 2), (2, 2), (1, 3)]);
}

#[tokio::test(start_paused = true)]
async fn receive_switches_to_a_new_data_set() {
    let manager = SessionManager::new();
    let first = codec::encode_frames(&payload_of(3), CHUNK);
    let second = codec::encode_frames("a completely different message", CHUNK);

    let (scanner, feed) = ChannelScanner::new();
    let mut session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    feed.code(first.frames[0].wire());
    feed.code(first.frames[1].wire());
    for wire in second.wires() {
        feed.code(wire);
    }

    let received = session.result().await.expect("complete");
    assert_eq!(received.data_set_id, second.data_set_id);
    assert_eq!(
        received.data.as_text(),
        Some(second.frames.iter().map(|f| f.chunk.as_str()).collect::<String>().as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn receive_follows_sender_restarted_with_new_chunk_size() {
    let manager = SessionManager::new();
    let payload = "q".repeat(100);
    let before = codec::encode_frames(&payload, 25);
    let after = codec::encode_frames(&payload, 50);
    assert_eq!(before.data_set_id, after.data_set_id);

    let (scanner, feed) = ChannelScanner::new();
    let mut session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    feed.code(before.frames[0].wire());
    feed.code(before.frames[2].wire());
    for wire in after.wires() {
        feed.code(wire);
    }
    drop(feed);

    let received = session.result().await.expect("restarted transfer completes");
    assert_eq!(received.frame_count, 2);
    assert_eq!(received.data.as_text(), Some(payload.as_str()));
}

#[tokio::test(start_paused = true)]
async fn receive_reports_progress() {
    let manager = SessionManager::new();
    let encoded = codec::encode_frames(&payload_of(3), CHUNK);
    let (scanner, feed) = ChannelScanner::new();
    let session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    feed.code(encoded.frames[1].wire());
    tokio::time::sleep(Duration::from_millis(10)).await;

    let expected =
        ReceiveProgress { data_set_id: Some(encoded.data_set_id), frames_read: 1, frame_count: 3 };
    assert_eq!(session.current_progress(), expected);

    let mut updates = std::pin::pin!(session.progress());
    assert_eq!(updates.next().await, Some(expected));

    feed.code(encoded.frames[2].wire());
    let next = updates.next().await.expect("progress update");
    assert_eq!(next.frames_read, 2);
}

#[tokio::test(start_paused = true)]
async fn receive_passes_normalized_scan_options() {
    let manager = SessionManager::new();
    let (scanner, _feed) = ChannelScanner::new();
    let log = scanner.log();
    let config = ReceiveConfig::default()
        .with_max_scans_per_second(60)
        .with_preferred_camera(CameraFacing::User);

    let _session = manager.receive(scanner, ReceiveOptions::new(config)).expect("receive");
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = log.started_with().expect("scanner started");
    assert_eq!(started.max_scans_per_second, 13);
    assert_eq!(started.preferred_camera, CameraFacing::User);
}

#[tokio::test(start_paused = true)]
async fn scanner_failure_is_a_decode_error() {
    let manager = SessionManager::new();
    let (scanner, feed) = ChannelScanner::new();
    let log = scanner.log();
    let mut session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    feed.no_code();
    feed.error("camera permission denied");

    let error = session.result().await.expect_err("fatal scan error");
    assert!(matches!(error, SyncError::Decode { source: Some(_), .. }));
    let source = std::error::Error::source(&error).expect("scanner error is chained");
    assert_eq!(source.to_string(), "camera permission denied");
    assert!(log.stopped());
}

#[tokio::test(start_paused = true)]
async fn scanner_ending_early_is_a_decode_error() {
    let manager = SessionManager::new();
    let encoded = codec::encode_frames(&payload_of(2), CHUNK);
    let (scanner, feed) = ChannelScanner::new();
    let mut session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    feed.code(encoded.frames[0].wire());
    drop(feed);

    let error = session.result().await.expect_err("stream ended");
    assert!(matches!(error, SyncError::Decode { .. }));
}

#[tokio::test(start_paused = true)]
async fn cancelling_receive_stops_the_scanner() {
    let manager = SessionManager::new();
    let (scanner, _feed) = ChannelScanner::new();
    let log = scanner.log();
    let mut session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");
    tokio::time::sleep(Duration::from_millis(10)).await;

    session.cancel("user closed dialog");

    let error = session.result().await.expect_err("cancelled");
    assert!(matches!(
        error,
        SyncError::Cancelled { reason: CancelReason::Aborted(ref reason) } if reason == "user closed dialog"
    ));
    assert!(log.stopped());
    settle().await;
    assert_eq!(manager.active(SessionKind::Receive), None);
}

#[tokio::test(start_paused = true)]
async fn receive_can_be_cancelled_after_waiting_times_out() {
    let manager = SessionManager::new();
    let (scanner, _feed) = ChannelScanner::new();
    let log = scanner.log();
    let mut session = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    let waited = tokio::time::timeout(Duration::from_secs(5), session.result()).await;
    assert!(waited.is_err(), "nothing was scanned");

    session.cancel("gave up");
    let error = session.result().await.expect_err("cancelled");
    assert!(matches!(
        error,
        SyncError::Cancelled { reason: CancelReason::Aborted(ref reason) } if reason == "gave up"
    ));
    assert!(log.stopped());

    let again = session.result().await.expect_err("outcome is kept");
    assert!(again.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn new_receive_supersedes_previous_receive() {
    let manager = SessionManager::new();
    let (first_scanner, _first_feed) = ChannelScanner::new();
    let first_log = first_scanner.log();
    let mut first = manager.receive(first_scanner, ReceiveOptions::default()).expect("receive");

    let (second_scanner, _second_feed) = ChannelScanner::new();
    let second = manager.receive(second_scanner, ReceiveOptions::default()).expect("receive");

    let error = first.result().await.expect_err("superseded");
    assert!(matches!(error, SyncError::Cancelled { reason: CancelReason::Superseded }));
    assert!(first_log.stopped());
    assert_eq!(manager.active(SessionKind::Receive), Some(second.id()));
}

#[tokio::test(start_paused = true)]
async fn sender_screen_feeds_receiver() {
    let _ = tracing_subscriber::fmt::try_init();
    let manager = SessionManager::new();
    let payload = json!({ "senderName": "Ann", "items": [1, 2, 3], "note": "x".repeat(120) });

    let (scanner, feed) = ChannelScanner::new();
    let mut receiving = manager.receive(scanner, ReceiveOptions::default()).expect("receive");

    let (screen_tx, mut screen_rx) = mpsc::unbounded_channel();
    let renderer = MockRenderer::new().with_screen_sink(screen_tx);
    let sending = manager
        .send(payload.clone(), renderer, SendOptions::new(rotating_config()))
        .expect("send");

    tokio::spawn(async move {
        while let Some(text) = screen_rx.recv().await {
            feed.no_code();
            feed.code(text);
        }
    });

    let received = receiving.result().await.expect("transfer complete");
    assert_eq!(received.data, ReceivedPayload::Json(payload));
    assert!(sending.state().is_displaying());
}
