//! Media capture abstractions.
//!
//! A `MediaTrack` is a stream of frames with a kind tag and a cancellation
//! handle; `MediaDevices` is the seam through which the session acquires the
//! camera and microphone, so tests and the headless CLI can substitute file
//! or synthetic sources. The assistant audio track is not a device: the
//! session synthesizes it from decoded provider audio.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::{SessionError, SessionResult};

/// PCM sample rate used end to end (provider input and output).
pub const SAMPLE_RATE: u32 = 24_000;

/// Samples per microphone frame (100ms at 24kHz).
pub const FRAME_SAMPLES: usize = 2_400;

const TRACK_CHANNEL_CAPACITY: usize = 64;

/// The three stream kinds the recorder coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Candidate camera video
    CameraVideo,
    /// Candidate microphone audio
    CandidateAudio,
    /// Assistant output audio, synthesized from provider audio deltas
    AssistantAudio,
}

impl TrackKind {
    /// Stable name used in logs and the capture container.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::CameraVideo => "camera_video",
            TrackKind::CandidateAudio => "candidate_audio",
            TrackKind::AssistantAudio => "assistant_audio",
        }
    }
}

/// One captured frame.
#[derive(Debug, Clone)]
pub enum MediaFrame {
    /// PCM samples (16-bit, mono, 24kHz)
    Audio(Vec<i16>),
    /// Encoded video frame
    Video(Bytes),
}

/// A live media stream. Dropping the receiver or cancelling the token stops
/// the producing task.
pub struct MediaTrack {
    /// Stream kind
    pub kind: TrackKind,
    /// Frame stream
    pub rx: mpsc::Receiver<MediaFrame>,
    /// Stops the producer
    pub cancel: CancellationToken,
}

impl MediaTrack {
    /// Create a track plus the sender side for its producer.
    pub fn channel(kind: TrackKind) -> (mpsc::Sender<MediaFrame>, Self) {
        let (tx, rx) = mpsc::channel(TRACK_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                kind,
                rx,
                cancel: CancellationToken::new(),
            },
        )
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack").field("kind", &self.kind).finish()
    }
}

/// Device access seam.
///
/// Camera failure is survivable (the session degrades to audio-only);
/// microphone failure is fatal. That policy lives in the session, not here.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the candidate camera.
    async fn open_camera(&self) -> SessionResult<MediaTrack>;

    /// Open the candidate microphone.
    async fn open_microphone(&self) -> SessionResult<MediaTrack>;
}

/// Microphone source backed by a WAV file, paced at real time. Used by the
/// headless CLI; there is no camera, so `open_camera` always fails and the
/// session runs audio-only.
pub struct WavFileMicrophone {
    path: std::path::PathBuf,
}

impl WavFileMicrophone {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MediaDevices for WavFileMicrophone {
    async fn open_camera(&self) -> SessionResult<MediaTrack> {
        Err(SessionError::MediaAccess(
            "no camera in headless mode".to_string(),
        ))
    }

    async fn open_microphone(&self) -> SessionResult<MediaTrack> {
        let mut reader = hound::WavReader::open(&self.path)
            .map_err(|e| SessionError::MediaAccess(format!("cannot open wav source: {}", e)))?;
        let spec = reader.spec();
        if spec.channels != 1 || spec.bits_per_sample != 16 {
            return Err(SessionError::MediaAccess(format!(
                "wav source must be 16-bit mono, got {}ch/{}bit",
                spec.channels, spec.bits_per_sample
            )));
        }
        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| SessionError::MediaAccess(format!("wav source read failed: {}", e)))?;

        let (tx, track) = MediaTrack::channel(TrackKind::CandidateAudio);
        let cancel = track.cancel.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(100));
            for chunk in samples.chunks(FRAME_SAMPLES) {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(MediaFrame::Audio(chunk.to_vec())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(track)
    }
}

/// Serialize PCM samples as little-endian bytes for the wire.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian PCM bytes into samples. A trailing odd byte is
/// dropped.
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Mix PCM frames by summing samples and clamping to the 16-bit range.
/// The output is as long as the longest input.
pub fn mix_frames(frames: &[&[i16]]) -> Vec<i16> {
    let max_len = frames.iter().map(|f| f.len()).max().unwrap_or(0);
    let mut mixed = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let sum: i32 = frames
            .iter()
            .filter_map(|f| f.get(i))
            .map(|&s| s as i32)
            .sum();
        mixed.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }
    mixed
}
