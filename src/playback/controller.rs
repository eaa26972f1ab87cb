//! [`TimedPlaybackController`] — play / pause / seek / replay arithmetic over
//! a single decoded buffer.
//!
//! Position is never polled from the output device. While playing it is
//! derived from the clock (`elapsed = now - reference`); while paused it is
//! frozen in `elapsed_at_pause`. Every reading is clamped to
//! `[0, duration]`.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::playback::clock::PlaybackClock;
use crate::playback::sink::{PlaybackSink, PlaybackSource};
use crate::playback::{DecodedAudio, PlaybackError};

pub struct TimedPlaybackController<C, S> {
    clock: C,
    sink: S,
    buffer: Option<Arc<DecodedAudio>>,
    source: Option<Box<dyn PlaybackSource>>,
    /// Bumped for every started source; end signals carrying an older value
    /// are ignored.
    generation: u64,
    playing: bool,
    reference_time: f64,
    elapsed_at_pause: f64,
    ended_tx: mpsc::UnboundedSender<u64>,
    ended_rx: mpsc::UnboundedReceiver<u64>,
}

impl<C: PlaybackClock, S: PlaybackSink> TimedPlaybackController<C, S> {
    pub fn new(clock: C, sink: S) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        Self {
            clock,
            sink,
            buffer: None,
            source: None,
            generation: 0,
            playing: false,
            reference_time: 0.0,
            elapsed_at_pause: 0.0,
            ended_tx,
            ended_rx,
        }
    }

    /// Replace the buffer. Any running source is stopped and the position
    /// returns to zero.
    pub fn load(&mut self, audio: DecodedAudio) {
        self.stop_source();
        log::info!(
            "playback: loaded {:.2}s buffer ({} Hz, {} ch)",
            audio.duration_secs(),
            audio.sample_rate,
            audio.channels
        );
        self.buffer = Some(Arc::new(audio));
        self.playing = false;
        self.elapsed_at_pause = 0.0;
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Buffer length in seconds; `0.0` without a buffer.
    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration_secs())
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current position in seconds.
    pub fn elapsed(&self) -> f64 {
        if self.playing {
            self.clamp(self.clock.now() - self.reference_time)
        } else {
            self.elapsed_at_pause
        }
    }

    /// Start a fresh source at `from_secs`, terminating the previous one.
    pub fn play(&mut self, from_secs: f64) -> Result<(), PlaybackError> {
        let buffer = self.buffer.clone().ok_or(PlaybackError::NoBuffer)?;
        self.stop_source();

        let offset = self.clamp(from_secs);
        self.generation += 1;
        let source = match self
            .sink
            .start(buffer, offset, self.generation, self.ended_tx.clone())
        {
            Ok(source) => source,
            Err(err) => {
                self.playing = false;
                self.elapsed_at_pause = offset;
                return Err(err);
            }
        };

        self.source = Some(source);
        self.reference_time = self.clock.now() - offset;
        self.elapsed_at_pause = offset;
        self.playing = true;
        log::debug!("playback: playing from {offset:.2}s");
        Ok(())
    }

    /// Stop the source and freeze the position. No-op when already paused.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        let elapsed = self.elapsed();
        self.stop_source();
        self.elapsed_at_pause = elapsed;
        self.playing = false;
        log::debug!("playback: paused at {elapsed:.2}s");
    }

    /// Continue from the frozen position. No-op while playing.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.playing {
            return Ok(());
        }
        self.play(self.elapsed_at_pause)
    }

    pub fn toggle(&mut self) -> Result<(), PlaybackError> {
        if self.playing {
            self.pause();
            Ok(())
        } else {
            self.resume()
        }
    }

    /// Move the position by `delta_secs`, clamped to the buffer. Restarts
    /// the source when playing; only moves the stored offset when paused.
    pub fn seek(&mut self, delta_secs: f64) -> Result<(), PlaybackError> {
        let target = self.clamp(self.elapsed() + delta_secs);
        if self.playing {
            self.play(target)
        } else {
            self.elapsed_at_pause = target;
            Ok(())
        }
    }

    pub fn replay(&mut self) -> Result<(), PlaybackError> {
        self.play(0.0)
    }

    /// Handle any pending end-of-buffer signal without waiting. Returns
    /// `true` when the active source finished.
    pub fn poll_completion(&mut self) -> bool {
        let mut completed = false;
        while let Ok(generation) = self.ended_rx.try_recv() {
            completed |= self.finish(generation);
        }
        completed
    }

    /// Wait until the active source reaches the end of the buffer.
    ///
    /// Stale signals (from sources that were stopped or replaced) are
    /// skipped. Cancel-safe.
    pub async fn wait_for_completion(&mut self) {
        while let Some(generation) = self.ended_rx.recv().await {
            if self.finish(generation) {
                return;
            }
        }
    }

    fn finish(&mut self, generation: u64) -> bool {
        if !self.playing || generation != self.generation {
            return false;
        }
        self.stop_source();
        self.playing = false;
        self.elapsed_at_pause = 0.0;
        log::debug!("playback: reached end of buffer");
        true
    }

    fn stop_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }

    fn clamp(&self, secs: f64) -> f64 {
        secs.clamp(0.0, self.duration())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
