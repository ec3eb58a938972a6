//! Three-stream recording coordination.
//!
//! Recording starts only once camera video, candidate audio and assistant
//! audio are all present; tracks arriving earlier are parked. On stop the two
//! audio streams are mixed sample-wise into one WAV track, the video chunks
//! are kept in arrival order, and the result is packed into a framed capture
//! container and handed to the upload sink exactly once. Remuxing into a
//! playable container happens downstream.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{SessionError, SessionResult};
use crate::media::{mix_frames, MediaFrame, MediaTrack, TrackKind, SAMPLE_RATE};

/// Container magic for the capture blob.
pub const CAPTURE_MAGIC: &[u8; 6] = b"IVCAP1";

/// Chunk tag: mixed audio, WAV-encoded.
pub const TAG_MIXED_AUDIO: u8 = 0x01;

/// Chunk tag: one encoded video frame.
pub const TAG_VIDEO: u8 = 0x02;

/// Upload seam for the finished capture blob.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Upload a finished blob for the session.
    async fn upload(&self, session_id: &str, label: &str, data: Vec<u8>) -> SessionResult<()>;
}

/// The assembled capture, returned from `stop()`.
#[derive(Debug)]
pub struct RecordingArtifact {
    /// Framed container bytes
    pub data: Vec<u8>,
    /// Whether the upload attempt succeeded
    pub uploaded: bool,
}

struct CaptureHandles {
    cancel: CancellationToken,
    candidate: JoinHandle<Vec<i16>>,
    assistant: JoinHandle<Vec<i16>>,
    video: JoinHandle<Vec<Bytes>>,
}

enum RecorderState {
    Waiting { parked: HashMap<TrackKind, MediaTrack> },
    Recording(CaptureHandles),
    Stopped,
}

/// Gates capture on stream completeness and owns the stop/upload sequence.
pub struct Recorder {
    session_id: String,
    sink: Arc<dyn MediaSink>,
    state: Mutex<RecorderState>,
}

impl Recorder {
    /// Create a recorder uploading through `sink`.
    pub fn new(session_id: impl Into<String>, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            session_id: session_id.into(),
            sink,
            state: Mutex::new(RecorderState::Waiting {
                parked: HashMap::new(),
            }),
        }
    }

    /// Park a track; starts capture once all three kinds are present.
    /// Tracks offered after capture started or stopped are dropped.
    pub async fn add_track(&self, track: MediaTrack) {
        let mut state = self.state.lock().await;
        *state = match std::mem::replace(&mut *state, RecorderState::Stopped) {
            RecorderState::Waiting { mut parked } => {
                debug!(kind = track.kind.as_str(), "Track available for recording");
                parked.insert(track.kind, track);
                match (
                    parked.remove(&TrackKind::CandidateAudio),
                    parked.remove(&TrackKind::AssistantAudio),
                    parked.remove(&TrackKind::CameraVideo),
                ) {
                    (Some(candidate), Some(assistant), Some(video)) => {
                        info!("All three streams present, recording started");
                        RecorderState::Recording(start_capture(candidate, assistant, video))
                    }
                    (candidate, assistant, video) => {
                        // Still incomplete; park what we have back.
                        for track in [candidate, assistant, video].into_iter().flatten() {
                            parked.insert(track.kind, track);
                        }
                        RecorderState::Waiting { parked }
                    }
                }
            }
            other => {
                warn!(
                    kind = track.kind.as_str(),
                    "Track offered after recording start, dropping"
                );
                other
            }
        };
    }

    /// Whether capture is running.
    pub async fn is_recording(&self) -> bool {
        matches!(&*self.state.lock().await, RecorderState::Recording(_))
    }

    /// Stop capture, assemble the blob, attempt the upload, and return the
    /// artifact. Resolves only after the upload has been attempted; upload
    /// failure is logged, never retried. A second call is a no-op.
    pub async fn stop(&self) -> SessionResult<Option<RecordingArtifact>> {
        let mut state = self.state.lock().await;
        let handles = match std::mem::replace(&mut *state, RecorderState::Stopped) {
            RecorderState::Recording(handles) => handles,
            RecorderState::Waiting { .. } => {
                debug!("Recorder stopped before all streams arrived, nothing captured");
                return Ok(None);
            }
            RecorderState::Stopped => return Ok(None),
        };

        handles.cancel.cancel();
        let candidate = handles
            .candidate
            .await
            .map_err(|e| SessionError::Upload(format!("capture task failed: {}", e)))?;
        let assistant = handles
            .assistant
            .await
            .map_err(|e| SessionError::Upload(format!("capture task failed: {}", e)))?;
        let video = handles
            .video
            .await
            .map_err(|e| SessionError::Upload(format!("capture task failed: {}", e)))?;

        let mixed = mix_frames(&[&candidate, &assistant]);
        let wav = encode_wav(&mixed)?;
        let data = build_container(&wav, &video);
        info!(
            audio_samples = mixed.len(),
            video_chunks = video.len(),
            blob_bytes = data.len(),
            "Capture assembled"
        );

        let uploaded = match self
            .sink
            .upload(&self.session_id, "combined", data.clone())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Recording upload failed, continuing teardown");
                false
            }
        };

        Ok(Some(RecordingArtifact { data, uploaded }))
    }
}

fn start_capture(
    candidate: MediaTrack,
    assistant: MediaTrack,
    video: MediaTrack,
) -> CaptureHandles {
    let cancel = CancellationToken::new();
    CaptureHandles {
        candidate: tokio::spawn(drain_audio(candidate, cancel.clone())),
        assistant: tokio::spawn(drain_audio(assistant, cancel.clone())),
        video: tokio::spawn(drain_video(video, cancel.clone())),
        cancel,
    }
}

async fn drain_audio(mut track: MediaTrack, cancel: CancellationToken) -> Vec<i16> {
    let mut samples = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = track.rx.recv() => match frame {
                Some(MediaFrame::Audio(chunk)) => samples.extend_from_slice(&chunk),
                Some(MediaFrame::Video(_)) => {
                    warn!(kind = track.kind.as_str(), "Video frame on audio track, ignoring");
                }
                None => break,
            }
        }
    }
    samples
}

async fn drain_video(mut track: MediaTrack, cancel: CancellationToken) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = track.rx.recv() => match frame {
                Some(MediaFrame::Video(chunk)) => chunks.push(chunk),
                Some(MediaFrame::Audio(_)) => {
                    warn!("Audio frame on video track, ignoring");
                }
                None => break,
            }
        }
    }
    chunks
}

fn encode_wav(samples: &[i16]) -> SessionResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SessionError::Upload(format!("wav encode failed: {}", e)))?;
        for &s in samples {
            writer
                .write_sample(s)
                .map_err(|e| SessionError::Upload(format!("wav encode failed: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| SessionError::Upload(format!("wav encode failed: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

fn build_container(wav: &[u8], video: &[Bytes]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        CAPTURE_MAGIC.len() + 5 + wav.len() + video.iter().map(|v| 5 + v.len()).sum::<usize>(),
    );
    out.extend_from_slice(CAPTURE_MAGIC);
    push_chunk(&mut out, TAG_MIXED_AUDIO, wav);
    for chunk in video {
        push_chunk(&mut out, TAG_VIDEO, chunk);
    }
    out
}

fn push_chunk(out: &mut Vec<u8>, tag: u8, data: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}
