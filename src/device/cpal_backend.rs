//! Host media backend built on `cpal`.
//!
//! The host exposes a microphone but no camera, so a stream from this
//! backend carries one audio track: video is best-effort and simply absent
//! (no zoom, frame size `(0, 0)`). Clips are encoded as 16-bit WAV.
//!
//! `cpal::Stream` is not `Send` on every platform, so each stream lives on a
//! dedicated thread that owns it until told to stop:
//!
//! ```text
//!  acquire() ──spawn──► mic thread ── build_input_stream ──► callback
//!      ▲                    │                                   │
//!      └── oneshot (ready) ─┘                 append f32 while recording
//!                                                               │
//!  stop_tracks() ── std mpsc ──► mic thread drops the stream    ▼
//!                                                       Arc<Mutex<Option<Vec<f32>>>>
//!  ClipRecorder::stop() ── take samples ── hound ──► one WAV chunk
//! ```

use std::io::Cursor;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot;

use crate::device::backend::{
    BackendError, ChunkSender, ClipRecorder, MediaBackend, MediaStream, StreamConstraints,
};
use crate::device::zoom::ZoomCapability;

/// The only clip encoding this backend produces.
pub const WAV_MIME: &str = "audio/wav";

/// Samples captured while a recorder is running; `None` when idle.
type CaptureSlot = Arc<Mutex<Option<Vec<f32>>>>;

// ---------------------------------------------------------------------------
// CpalMediaBackend
// ---------------------------------------------------------------------------

/// [`MediaBackend`] over the default cpal input device.
#[derive(Debug, Default, Clone)]
pub struct CpalMediaBackend;

impl CpalMediaBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for CpalMediaBackend {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, BackendError> {
        if !constraints.audio {
            return Err(BackendError::NotFound(
                "no video capture device on this host".into(),
            ));
        }

        let capture: CaptureSlot = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let slot = Arc::clone(&capture);
        std::thread::Builder::new()
            .name("visionally-mic".into())
            .spawn(move || match open_input(slot) {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    // Block until stop_tracks() or the stream handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                    log::debug!("cpal: input stream closed");
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| BackendError::Other(format!("failed to spawn capture thread: {e}")))?;

        let (sample_rate, channels) = ready_rx
            .await
            .map_err(|_| BackendError::Other("capture thread exited early".into()))??;

        log::info!("cpal: microphone open at {sample_rate} Hz, {channels} channel(s)");
        Ok(Box::new(CpalStream {
            stop_tx: Some(stop_tx),
            capture,
            sample_rate,
            channels,
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type.trim().eq_ignore_ascii_case(WAV_MIME)
    }
}

/// Build and start the default input stream. Runs on the mic thread.
fn open_input(capture: CaptureSlot) -> Result<(cpal::Stream, (u32, u16)), BackendError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| BackendError::NotFound("no input device on the default host".into()))?;

    let supported = device.default_input_config().map_err(map_config_error)?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut slot) = capture.lock() {
                    if let Some(samples) = slot.as_mut() {
                        samples.extend_from_slice(data);
                    }
                }
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )
        .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| BackendError::NotReadable(e.to_string()))?;

    Ok((stream, (sample_rate, channels)))
}

fn map_config_error(err: cpal::DefaultStreamConfigError) -> BackendError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            BackendError::NotReadable(err.to_string())
        }
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
            BackendError::Unsupported(err.to_string())
        }
        other => BackendError::Other(other.to_string()),
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> BackendError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => BackendError::NotReadable(err.to_string()),
        cpal::BuildStreamError::StreamConfigNotSupported => {
            BackendError::Unsupported(err.to_string())
        }
        other => BackendError::Other(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CpalStream
// ---------------------------------------------------------------------------

struct CpalStream {
    stop_tx: Option<std_mpsc::Sender<()>>,
    capture: CaptureSlot,
    sample_rate: u32,
    channels: u16,
}

#[async_trait]
impl MediaStream for CpalStream {
    fn zoom_capability(&self) -> Option<ZoomCapability> {
        None
    }

    async fn apply_zoom(&mut self, _zoom: f64) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("no video track".into()))
    }

    fn frame_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn grab_frame(&mut self, _quality: f32) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::Unsupported("no video track".into()))
    }

    fn start_recorder(
        &mut self,
        mime_type: Option<&str>,
        chunks: ChunkSender,
    ) -> Result<Box<dyn ClipRecorder>, BackendError> {
        if let Some(mime) = mime_type {
            if !mime.trim().eq_ignore_ascii_case(WAV_MIME) {
                return Err(BackendError::Unsupported(format!(
                    "cannot encode {mime}"
                )));
            }
        }
        if self.stop_tx.is_none() {
            return Err(BackendError::NotReadable("stream already stopped".into()));
        }

        *self.capture.lock().unwrap_or_else(|e| e.into_inner()) = Some(Vec::new());
        Ok(Box::new(WavRecorder {
            capture: Arc::clone(&self.capture),
            sample_rate: self.sample_rate,
            channels: self.channels,
            chunks,
        }))
    }

    fn stop_tracks(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

// ---------------------------------------------------------------------------
// WavRecorder
// ---------------------------------------------------------------------------

struct WavRecorder {
    capture: CaptureSlot,
    sample_rate: u32,
    channels: u16,
    chunks: ChunkSender,
}

#[async_trait]
impl ClipRecorder for WavRecorder {
    fn mime_type(&self) -> String {
        WAV_MIME.to_string()
    }

    async fn stop(self: Box<Self>) -> Result<(), BackendError> {
        let samples = self
            .capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();

        let wav = encode_wav(&samples, self.sample_rate, self.channels)?;
        log::debug!(
            "cpal: encoded {} samples into {} WAV bytes",
            samples.len(),
            wav.len()
        );
        let _ = self.chunks.send(wav);
        Ok(())
    }
}

impl Drop for WavRecorder {
    /// A recorder dropped without `stop` still ends sample capture.
    fn drop(&mut self) {
        *self.capture.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Encode interleaved `f32` PCM as a 16-bit WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>, BackendError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_err = |e: hound::Error| BackendError::Other(format!("wav encoding failed: {e}"));

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(to_err)?;
        for &s in samples {
            let pcm = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer.write_sample(pcm).map_err(to_err)?;
        }
        writer.finalize().map_err(to_err)?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
