//! End-to-end session orchestration tests over mock collaborators.
//!
//! The control channel is driven by hand-fed provider events; time is paused
//! so the fail-safe window is exercised deterministically.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use candor::api::{Backend, SessionDescriptor};
use candor::config::Settings;
use candor::errors::{SessionError, SessionResult};
use candor::media::{MediaDevices, MediaFrame, MediaTrack, TrackKind};
use candor::session::recording::MediaSink;
use candor::session::termination::EndCause;
use candor::session::{InterviewSession, SessionControl};
use candor::transport::ControlChannel;

// -----------------------------------------------------------------------------
// Mocks
// -----------------------------------------------------------------------------

#[derive(Default)]
struct MockBackend {
    calls: Mutex<Vec<String>>,
    saved_transcript: Mutex<Option<String>>,
}

#[async_trait]
impl Backend for MockBackend {
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionDescriptor> {
        Ok(descriptor(session_id))
    }

    async fn update_status(&self, _: &str, status: &str) -> SessionResult<()> {
        self.calls.lock().await.push(format!("status:{}", status));
        Ok(())
    }

    async fn save_transcript(&self, _: &str, transcript: &str) -> SessionResult<()> {
        self.calls.lock().await.push("save_transcript".to_string());
        *self.saved_transcript.lock().await = Some(transcript.to_string());
        Ok(())
    }

    async fn request_analysis(&self, _: &str, _: &str) -> SessionResult<()> {
        self.calls.lock().await.push("analyze".to_string());
        Ok(())
    }
}

#[derive(Default)]
struct MockSink {
    uploads: AtomicUsize,
}

#[async_trait]
impl MediaSink for MockSink {
    async fn upload(&self, _: &str, _: &str, _: Vec<u8>) -> SessionResult<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MockChannel {
    sent: Mutex<Vec<Value>>,
    closed: AtomicBool,
}

#[async_trait]
impl ControlChannel for MockChannel {
    async fn send(&self, event: Value) -> SessionResult<()> {
        self.sent.lock().await.push(event);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockDevices {
    microphone: Mutex<Option<MediaTrack>>,
    camera: Mutex<Option<MediaTrack>>,
}

#[async_trait]
impl MediaDevices for MockDevices {
    async fn open_camera(&self) -> SessionResult<MediaTrack> {
        self.camera
            .lock()
            .await
            .take()
            .ok_or_else(|| SessionError::MediaAccess("camera denied".to_string()))
    }

    async fn open_microphone(&self) -> SessionResult<MediaTrack> {
        self.microphone
            .lock()
            .await
            .take()
            .ok_or_else(|| SessionError::MediaAccess("microphone denied".to_string()))
    }
}

fn descriptor(session_id: &str) -> SessionDescriptor {
    SessionDescriptor {
        session_id: session_id.to_string(),
        system_prompt: "You are conducting a structured interview.".to_string(),
        candidate_name: Some("Robin".to_string()),
        job_title: Some("Platform Engineer".to_string()),
        use_alternate_provider: false,
    }
}

struct Harness {
    backend: Arc<MockBackend>,
    sink: Arc<MockSink>,
    channel: Arc<MockChannel>,
    events_tx: mpsc::Sender<Value>,
    mic_tx: mpsc::Sender<MediaFrame>,
    camera_tx: Option<mpsc::Sender<MediaFrame>>,
    control: SessionControl,
    run: tokio::task::JoinHandle<SessionResult<candor::SessionReport>>,
}

fn start_session(with_camera: bool) -> Harness {
    let backend = Arc::new(MockBackend::default());
    let sink = Arc::new(MockSink::default());
    let channel = Arc::new(MockChannel::default());
    let (events_tx, events_rx) = mpsc::channel(64);

    let (mic_tx, mic) = MediaTrack::channel(TrackKind::CandidateAudio);
    let (camera_tx, camera) = MediaTrack::channel(TrackKind::CameraVideo);
    let devices = Arc::new(MockDevices {
        microphone: Mutex::new(Some(mic)),
        camera: Mutex::new(with_camera.then_some(camera)),
    });

    let (session, control) = InterviewSession::new(
        Settings::default(),
        descriptor("s1"),
        backend.clone(),
        sink.clone(),
        devices,
        channel.clone(),
        events_rx,
    );
    let run = tokio::spawn(session.run());

    Harness {
        backend,
        sink,
        channel,
        events_tx,
        mic_tx,
        camera_tx: with_camera.then_some(camera_tx),
        control,
        run,
    }
}

async fn send(h: &Harness, event: Value) {
    h.events_tx.send(event).await.unwrap();
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_full_session_completes_on_playback_drain() {
    let h = start_session(true);

    // Startup traffic: session.update then exactly one greeting.
    tokio::task::yield_now().await;
    {
        let sent = h.channel.sent.lock().await;
        assert_eq!(sent[0]["type"], "session.update");
        assert_eq!(sent[1]["type"], "response.create");
        assert_eq!(
            sent.iter().filter(|e| e["type"] == "response.create").count(),
            1
        );
    }

    // Feed media so the capture has content.
    h.mic_tx
        .send(MediaFrame::Audio(vec![200; 480]))
        .await
        .unwrap();
    h.camera_tx
        .as_ref()
        .unwrap()
        .send(MediaFrame::Video(bytes::Bytes::from_static(b"kf0")))
        .await
        .unwrap();

    // Assistant greets, candidate answers, usage arrives, model ends the
    // interview, playback drains before the fail-safe window elapses.
    send(&h, json!({"type": "output_audio_buffer.started"})).await;
    send(
        &h,
        json!({"type": "conversation.item.created",
               "item": {"id": "a1", "type": "message", "role": "assistant"}}),
    )
    .await;
    send(
        &h,
        json!({"type": "response.audio_transcript.delta",
               "item_id": "a1", "delta": "Welcome, Robin."}),
    )
    .await;
    send(
        &h,
        json!({"type": "response.audio_transcript.done",
               "item_id": "a1", "transcript": "Welcome, Robin. Tell me about your work."}),
    )
    .await;
    send(
        &h,
        json!({"type": "input_audio_buffer.speech_started"}),
    )
    .await;
    send(
        &h,
        json!({"type": "input_audio_buffer.committed", "item_id": "u1"}),
    )
    .await;
    send(
        &h,
        json!({"type": "input_audio_buffer.speech_stopped"}),
    )
    .await;
    send(
        &h,
        json!({"type": "conversation.item.input_audio_transcription.completed",
               "item_id": "u1", "transcript": "I run the build platform."}),
    )
    .await;
    send(
        &h,
        json!({"type": "response.done",
               "response": {
                   "id": "r1",
                   "usage": {
                       "total_tokens": 300, "input_tokens": 200, "output_tokens": 100,
                       "input_token_details": {"text_tokens": 50, "audio_tokens": 150},
                       "output_token_details": {"text_tokens": 20, "audio_tokens": 80}
                   },
                   "output": []
               }}),
    )
    .await;
    send(
        &h,
        json!({"type": "response.function_call_arguments.done",
               "call_id": "call_1", "name": "end_interview",
               "arguments": "{\"reason\":\"all questions covered\"}"}),
    )
    .await;
    // Same call through the response output; must not double-trigger.
    send(
        &h,
        json!({"type": "response.done",
               "response": {"id": "r2", "output": [
                   {"type": "function_call", "call_id": "call_1",
                    "name": "end_interview", "arguments": "{}"}
               ]}}),
    )
    .await;
    send(&h, json!({"type": "output_audio_buffer.stopped"})).await;

    let report = h.run.await.unwrap().unwrap();
    assert_eq!(report.cause, EndCause::AssistantCompleted);
    assert!(report.transcript.contains("ASSISTANT: Welcome, Robin."));
    assert!(report.transcript.contains("USER: I run the build platform."));
    assert!(report.transcript.contains("SYSTEM: interview completed"));

    // Usage counted once despite two response.done events for r1's call.
    assert_eq!(report.cost.audio_input_tokens, 150);
    assert_eq!(report.cost.audio_output_tokens, 80);

    // All three streams were present, so the capture uploaded exactly once.
    assert!(report.artifact.is_some());
    assert_eq!(h.sink.uploads.load(Ordering::SeqCst), 1);
    assert!(h.channel.closed.load(Ordering::SeqCst));

    let calls = h.backend.calls.lock().await;
    assert!(calls.contains(&"status:in-progress".to_string()));
    assert!(calls.contains(&"save_transcript".to_string()));
    assert!(calls.contains(&"status:completed".to_string()));
    assert!(calls.contains(&"analyze".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_playback_stop_just_inside_failsafe_window_wins() {
    let h = start_session(true);
    tokio::task::yield_now().await;

    send(&h, json!({"type": "output_audio_buffer.started"})).await;
    send(
        &h,
        json!({"type": "response.function_call_arguments.done",
               "call_id": "call_1", "name": "end_interview", "arguments": "{}"}),
    )
    .await;
    // Let the loop arm the fail-safe, then run the clock to just short of it.
    tokio::task::yield_now().await;
    tokio::time::advance(std::time::Duration::from_millis(4_900)).await;

    send(&h, json!({"type": "output_audio_buffer.stopped"})).await;
    let report = h.run.await.unwrap().unwrap();
    assert_eq!(report.cause, EndCause::AssistantCompleted);
    // Teardown ran exactly once; the fail-safe never got a second shot.
    assert_eq!(h.sink.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failsafe_fires_without_playback_stop() {
    let h = start_session(true);

    send(&h, json!({"type": "output_audio_buffer.started"})).await;
    send(
        &h,
        json!({"type": "response.function_call_arguments.done",
               "call_id": "call_1", "name": "end_interview",
               "arguments": "{\"reason\":\"done\"}"}),
    )
    .await;
    // No playback-stopped event ever arrives; paused time runs the fail-safe
    // window down.

    let report = h.run.await.unwrap().unwrap();
    assert_eq!(report.cause, EndCause::FailSafe);
    assert_eq!(h.sink.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_stop_bypasses_pending_end() {
    let h = start_session(true);
    tokio::task::yield_now().await;

    send(
        &h,
        json!({"type": "response.function_call_arguments.done",
               "call_id": "call_1", "name": "end_interview", "arguments": "{}"}),
    )
    .await;
    h.control.stop().await;

    let report = h.run.await.unwrap().unwrap();
    assert_eq!(report.cause, EndCause::UserStop);
    assert!(report.transcript.contains("stopped by user"));
    // Exactly one upload however many triggers raced.
    assert_eq!(h.sink.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_tears_down() {
    let h = start_session(true);
    tokio::task::yield_now().await;

    drop(h.events_tx);
    let report = h.run.await.unwrap().unwrap();
    assert_eq!(report.cause, EndCause::ChannelClosed);
    assert!(report.transcript.contains("connection closed"));
}

#[tokio::test(start_paused = true)]
async fn test_camera_denial_degrades_to_audio_only() {
    let h = start_session(false);
    tokio::task::yield_now().await;

    h.control.stop().await;
    let report = h.run.await.unwrap().unwrap();

    assert!(report.transcript.contains("camera unavailable"));
    // Only two of three streams ever arrived; nothing was captured.
    assert!(report.artifact.is_none());
    assert_eq!(h.sink.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_microphone_frames_reach_control_channel() {
    let h = start_session(true);
    tokio::task::yield_now().await;

    h.mic_tx
        .send(MediaFrame::Audio(vec![1, 2, 3, 4]))
        .await
        .unwrap();
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    {
        let sent = h.channel.sent.lock().await;
        assert!(sent
            .iter()
            .any(|e| e["type"] == "input_audio_buffer.append"));
    }

    h.control.stop().await;
    h.run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_is_visible_but_non_fatal() {
    let h = start_session(true);
    tokio::task::yield_now().await;

    send(
        &h,
        json!({"type": "error",
               "error": {"type": "server_error", "message": "transient hiccup"}}),
    )
    .await;
    send(
        &h,
        json!({"type": "response.audio_transcript.done",
               "item_id": "a1", "transcript": "Still here."}),
    )
    .await;
    // Let the loop drain both queued events before the stop signal races them.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    h.control.stop().await;
    let report = h.run.await.unwrap().unwrap();
    assert!(report.transcript.contains("provider error: transient hiccup"));
    assert!(report.transcript.contains("ASSISTANT: Still here."));
}
