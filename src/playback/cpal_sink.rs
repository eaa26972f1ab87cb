//! [`PlaybackSink`] over the default cpal output device.
//!
//! Each source owns its own output stream on a dedicated thread (the cpal
//! stream is not `Send`). The callback walks the buffer with a fractional
//! read position so the source rate need not match the device rate, and
//! reports natural end exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::playback::sink::{EndedSender, PlaybackSink, PlaybackSource};
use crate::playback::{DecodedAudio, PlaybackError};

#[derive(Debug, Default, Clone)]
pub struct CpalPlaybackSink;

impl CpalPlaybackSink {
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackSink for CpalPlaybackSink {
    fn start(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset_secs: f64,
        generation: u64,
        ended: EndedSender,
    ) -> Result<Box<dyn PlaybackSource>, PlaybackError> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), PlaybackError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let stopped = Arc::new(AtomicBool::new(false));

        let stopped_cb = Arc::clone(&stopped);
        std::thread::Builder::new()
            .name("visionally-playback".into())
            .spawn(move || {
                match open_output(audio, offset_secs, generation, ended, stopped_cb) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| PlaybackError::Stream(format!("failed to spawn playback thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| PlaybackError::Stream("playback thread exited early".into()))??;

        Ok(Box::new(CpalSource {
            stop_tx: Some(stop_tx),
            stopped,
        }))
    }
}

fn open_output(
    audio: Arc<DecodedAudio>,
    offset_secs: f64,
    generation: u64,
    ended: EndedSender,
    stopped: Arc<AtomicBool>,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;
    let config: cpal::StreamConfig = device
        .default_output_config()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?
        .into();

    let out_channels = usize::from(config.channels);
    let src_channels = usize::from(audio.channels.max(1));
    let step = f64::from(audio.sample_rate) / f64::from(config.sample_rate.0);
    let frames = audio.frames();
    let mut cursor = offset_secs * f64::from(audio.sample_rate);
    let mut finished = false;

    log::debug!(
        "playback: output {} Hz x{}, source {} Hz x{}, from {offset_secs:.2}s",
        config.sample_rate.0,
        out_channels,
        audio.sample_rate,
        src_channels
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(out_channels) {
                    let index = cursor as usize;
                    if index >= frames {
                        frame.fill(0.0);
                        if !finished {
                            finished = true;
                            if !stopped.load(Ordering::Relaxed) {
                                let _ = ended.send(generation);
                            }
                        }
                        continue;
                    }
                    for (ch, sample) in frame.iter_mut().enumerate() {
                        let src_ch = ch.min(src_channels - 1);
                        *sample = audio.samples[index * src_channels + src_ch];
                    }
                    cursor += step;
                }
            },
            |err| log::error!("cpal output error: {err}"),
            None,
        )
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    Ok(stream)
}

struct CpalSource {
    stop_tx: Option<std_mpsc::Sender<()>>,
    stopped: Arc<AtomicBool>,
}

impl PlaybackSource for CpalSource {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}
