//! Interview session orchestration.
//!
//! One `InterviewSession` owns the full lifecycle of an unattended interview:
//! media acquisition, session configuration and greeting, the event loop
//! fanning provider events out to the transcript assembler, usage ledger,
//! termination coordinator and recorder, and a single teardown path that runs
//! exactly once regardless of which trigger fired.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{Backend, SessionDescriptor};
use crate::config::Settings;
use crate::errors::{SessionError, SessionResult};
use crate::media::{bytes_to_pcm, pcm_to_bytes, MediaDevices, MediaFrame, MediaTrack, TrackKind};
use crate::protocol::adapter::SessionSpec;
use crate::protocol::{provider_adapter, ProviderAdapter, Role, SessionEvent};
use crate::transport::ControlChannel;

pub mod recording;
pub mod termination;
pub mod transcript;
pub mod usage;

use recording::{MediaSink, Recorder, RecordingArtifact};
use termination::{Decision, EndCause, TerminationCoordinator};
use transcript::TranscriptAssembler;
use usage::{CostSummary, UsageLedger};

const STOP_CHANNEL_CAPACITY: usize = 4;

/// What a finished session hands back.
#[derive(Debug)]
pub struct SessionReport {
    /// Rendered transcript
    pub transcript: String,
    /// Usage counters and advisory cost
    pub cost: CostSummary,
    /// Capture artifact, when recording ran
    pub artifact: Option<RecordingArtifact>,
    /// Why the session ended
    pub cause: EndCause,
}

/// Handle for stopping a running session and watching elapsed time.
#[derive(Debug, Clone)]
pub struct SessionControl {
    stop: mpsc::Sender<()>,
    elapsed: watch::Receiver<u64>,
}

impl SessionControl {
    /// Request the session stop. Safe to call more than once.
    pub async fn stop(&self) {
        let _ = self.stop.send(()).await;
    }

    /// Seconds elapsed since the event loop started.
    pub fn elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed.clone()
    }
}

/// One interview session, created per run, torn down exactly once.
pub struct InterviewSession {
    descriptor: SessionDescriptor,
    settings: Settings,
    backend: Arc<dyn Backend>,
    adapter: Arc<dyn ProviderAdapter>,
    channel: Arc<dyn ControlChannel>,
    events: mpsc::Receiver<Value>,
    devices: Arc<dyn MediaDevices>,
    recorder: Arc<Recorder>,
    transcript: TranscriptAssembler,
    usage: UsageLedger,
    termination: TerminationCoordinator,
    greeted: bool,
    stop_rx: mpsc::Receiver<()>,
    elapsed_tx: watch::Sender<u64>,
    track_cancels: Vec<CancellationToken>,
}

impl InterviewSession {
    /// Assemble a session around an already-connected control channel.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        descriptor: SessionDescriptor,
        backend: Arc<dyn Backend>,
        sink: Arc<dyn MediaSink>,
        devices: Arc<dyn MediaDevices>,
        channel: Arc<dyn ControlChannel>,
        events: mpsc::Receiver<Value>,
    ) -> (Self, SessionControl) {
        let (stop_tx, stop_rx) = mpsc::channel(STOP_CHANNEL_CAPACITY);
        let (elapsed_tx, elapsed_rx) = watch::channel(0);
        let adapter: Arc<dyn ProviderAdapter> =
            Arc::from(provider_adapter(descriptor.use_alternate_provider));
        let recorder = Arc::new(Recorder::new(descriptor.session_id.clone(), sink));
        let session = Self {
            descriptor,
            settings,
            backend,
            adapter,
            channel,
            events,
            devices,
            recorder,
            transcript: TranscriptAssembler::new(),
            usage: UsageLedger::new(),
            termination: TerminationCoordinator::new(),
            greeted: false,
            stop_rx,
            elapsed_tx,
            track_cancels: Vec::new(),
        };
        let control = SessionControl {
            stop: stop_tx,
            elapsed: elapsed_rx,
        };
        (session, control)
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> SessionResult<SessionReport> {
        let session_id = self.descriptor.session_id.clone();
        info!(session_id, "Starting interview session");

        // Microphone is mandatory; camera denial degrades to audio-only.
        let microphone = require_microphone(self.devices.open_microphone().await)?;
        match self.devices.open_camera().await {
            Ok(camera) => {
                self.track_cancels.push(camera.cancel.clone());
                self.recorder.add_track(camera).await;
            }
            Err(e) => {
                warn!(error = %e, "Camera unavailable, continuing audio-only");
                self.transcript
                    .system_line("camera unavailable, continuing audio-only");
            }
        }

        if let Err(e) = self
            .backend
            .update_status(&session_id, "in-progress")
            .await
        {
            warn!(error = %e, "Status update failed, continuing");
        }

        // Configure the provider session, then greet exactly once.
        let spec = self.session_spec();
        self.channel.send(self.adapter.session_update(&spec)).await?;
        if !self.greeted {
            self.channel
                .send(self.adapter.greeting(&self.greeting_instructions()))
                .await?;
            self.greeted = true;
        }

        self.spawn_microphone_pump(microphone).await;

        // Assistant audio is synthesized from decoded deltas; registering the
        // track here is what lets the recorder reach stream completeness.
        let (assistant_tx, assistant_track) = MediaTrack::channel(TrackKind::AssistantAudio);
        self.track_cancels.push(assistant_track.cancel.clone());
        self.recorder.add_track(assistant_track).await;

        let cause = self.event_loop(&assistant_tx).await;
        drop(assistant_tx);
        self.teardown(cause).await
    }

    async fn event_loop(&mut self, assistant_tx: &mpsc::Sender<MediaFrame>) -> EndCause {
        let far_future = Duration::from_secs(86_400);
        tokio::pin! {
            let failsafe = tokio::time::sleep(far_future);
        }
        let mut failsafe_armed = false;
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let mut elapsed_secs = 0u64;

        loop {
            tokio::select! {
                maybe_event = self.events.recv() => match maybe_event {
                    Some(raw) => {
                        match self.handle_event(raw, assistant_tx).await {
                            Decision::Ignore => {}
                            Decision::ArmFailsafe => {
                                failsafe
                                    .as_mut()
                                    .reset(tokio::time::Instant::now() + self.settings.failsafe);
                                failsafe_armed = true;
                            }
                            Decision::Teardown(cause) => return cause,
                        }
                    }
                    None => {
                        if let Decision::Teardown(cause) = self.termination.channel_closed() {
                            return cause;
                        }
                    }
                },

                _ = self.stop_rx.recv() => {
                    if let Decision::Teardown(cause) = self.termination.user_stop() {
                        return cause;
                    }
                }

                _ = &mut failsafe, if failsafe_armed => {
                    failsafe_armed = false;
                    if let Decision::Teardown(cause) = self.termination.failsafe_fired() {
                        return cause;
                    }
                }

                _ = ticker.tick() => {
                    elapsed_secs += 1;
                    let _ = self.elapsed_tx.send(elapsed_secs);
                }
            }
        }
    }

    /// Fan one provider event out to the sub-modules; returns the termination
    /// decision it produced, if any.
    async fn handle_event(
        &mut self,
        raw: Value,
        assistant_tx: &mpsc::Sender<MediaFrame>,
    ) -> Decision {
        match self.adapter.parse(&raw) {
            SessionEvent::ItemCreated { item_id, role } => {
                self.transcript.item_created(&item_id, role);
                Decision::Ignore
            }

            SessionEvent::TranscriptDelta {
                item_id,
                role,
                delta,
                response_id,
            } => {
                let id = self.transcript.resolve_item_id(
                    role,
                    item_id.as_deref(),
                    response_id.as_deref(),
                );
                self.transcript.append(&id, role, &delta);
                Decision::Ignore
            }

            SessionEvent::TranscriptDone {
                item_id,
                role,
                text,
                response_id,
            } => {
                let id = self.transcript.resolve_item_id(
                    role,
                    item_id.as_deref(),
                    response_id.as_deref(),
                );
                self.transcript.upsert(&id, role, &text);
                Decision::Ignore
            }

            SessionEvent::AudioDelta { pcm, .. } => {
                let samples = bytes_to_pcm(&pcm);
                if assistant_tx.send(MediaFrame::Audio(samples)).await.is_err() {
                    debug!("Assistant track closed, dropping audio delta");
                }
                Decision::Ignore
            }

            SessionEvent::FunctionCall(call) => {
                if call.name == "end_interview" || call.name.is_empty() {
                    info!(call_id = %call.call_id, reason = %call.arguments, "End call received");
                    self.termination.end_signal(&call.call_id)
                } else {
                    debug!(name = %call.name, "Ignoring unrelated function call");
                    Decision::Ignore
                }
            }

            SessionEvent::ResponseCreated { response_id } => {
                debug!(response_id, "Response started");
                Decision::Ignore
            }

            SessionEvent::ResponseDone {
                response_id,
                usage,
                calls,
            } => {
                if let Some(usage) = usage {
                    self.usage.record_response_usage(&response_id, &usage);
                }
                let mut decision = Decision::Ignore;
                for call in calls {
                    if call.name == "end_interview" {
                        let d = self.termination.end_signal(&call.call_id);
                        if d != Decision::Ignore {
                            decision = d;
                        }
                    }
                }
                decision
            }

            SessionEvent::OutputAudioStarted => self.termination.output_audio_started(),
            SessionEvent::OutputAudioStopped => self.termination.output_audio_stopped(),

            SessionEvent::SpeechStarted => {
                self.usage.speech_started();
                Decision::Ignore
            }
            SessionEvent::SpeechStopped => {
                self.usage.speech_stopped();
                Decision::Ignore
            }

            SessionEvent::InputCommitted { item_id } => {
                // Placeholder turn; its transcription lands later.
                self.transcript.item_created(&item_id, Role::User);
                Decision::Ignore
            }

            SessionEvent::Error { message } => {
                warn!(message, "Provider error event");
                self.transcript
                    .system_line(&format!("provider error: {}", message));
                Decision::Ignore
            }

            SessionEvent::Unknown(value) => {
                debug!(
                    event_type = value.get("type").and_then(serde_json::Value::as_str).unwrap_or("?"),
                    "Unhandled provider event"
                );
                Decision::Ignore
            }
        }
    }

    /// The single teardown path; every trigger funnels here once.
    async fn teardown(&mut self, cause: EndCause) -> SessionResult<SessionReport> {
        let session_id = self.descriptor.session_id.clone();
        info!(session_id, cause = cause.as_str(), "Tearing down session");

        self.channel.close().await;
        for cancel in self.track_cancels.drain(..) {
            cancel.cancel();
        }

        // Recorder stop awaits the upload attempt; failure is logged inside
        // and never blocks the rest of teardown.
        let artifact = match self.recorder.stop().await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "Recorder stop failed");
                None
            }
        };

        self.usage.finalize();
        let cost = self.usage.summary(&self.settings.rates);
        info!(
            estimated_cost_usd = cost.estimated_cost_usd,
            speech_seconds = cost.speech_seconds,
            "Session usage"
        );

        self.transcript.system_line(cause.as_str());
        let transcript = self.transcript.render();

        if let Err(e) = self.backend.save_transcript(&session_id, &transcript).await {
            warn!(error = %e, "Transcript save failed");
        }
        if let Err(e) = self.backend.update_status(&session_id, "completed").await {
            warn!(error = %e, "Final status update failed");
        }
        if let Err(e) = self
            .backend
            .request_analysis(&session_id, &transcript)
            .await
        {
            warn!(error = %e, "Analysis request failed");
        }

        Ok(SessionReport {
            transcript,
            cost,
            artifact,
            cause,
        })
    }

    async fn spawn_microphone_pump(&mut self, mut microphone: MediaTrack) {
        let (recorder_tx, recorder_track) = MediaTrack::channel(TrackKind::CandidateAudio);
        self.track_cancels.push(recorder_track.cancel.clone());
        self.recorder.add_track(recorder_track).await;

        let cancel = microphone.cancel.clone();
        self.track_cancels.push(cancel.clone());
        let adapter = self.adapter.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = microphone.rx.recv() => match frame {
                        Some(MediaFrame::Audio(samples)) => {
                            let _ = recorder_tx
                                .send(MediaFrame::Audio(samples.clone()))
                                .await;
                            let event = adapter.audio_append(&pcm_to_bytes(&samples));
                            if channel.send(event).await.is_err() {
                                debug!("Control channel gone, stopping microphone pump");
                                break;
                            }
                        }
                        Some(MediaFrame::Video(_)) => {}
                        None => break,
                    }
                }
            }
        });
    }

    fn session_spec(&self) -> SessionSpec {
        SessionSpec {
            instructions: self.descriptor.system_prompt.clone(),
            voice: self.settings.voice.clone(),
            language: self.settings.language.clone(),
            transcription_model: self.settings.transcription_model.clone(),
        }
    }

    fn greeting_instructions(&self) -> String {
        greeting_instructions(&self.descriptor)
    }
}

fn greeting_instructions(descriptor: &SessionDescriptor) -> String {
    match (&descriptor.candidate_name, &descriptor.job_title) {
        (Some(name), Some(title)) => format!(
            "Greet {} warmly, introduce yourself, and begin the {} interview.",
            name, title
        ),
        (Some(name), None) => {
            format!("Greet {} warmly, introduce yourself, and begin the interview.", name)
        }
        _ => "Greet the candidate warmly, introduce yourself, and begin the interview."
            .to_string(),
    }
}

/// Convenience guard so callers can treat a missing microphone uniformly.
pub fn require_microphone(result: SessionResult<MediaTrack>) -> SessionResult<MediaTrack> {
    result.map_err(|e| match e {
        SessionError::MediaAccess(msg) => {
            SessionError::MediaAccess(format!("microphone required: {}", msg))
        }
        other => other,
    })
}
