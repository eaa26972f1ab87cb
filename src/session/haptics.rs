//! Vibration cues.

/// Recording started.
pub const START_PULSE: &[u64] = &[50];
/// Recording stopped.
pub const STOP_PULSE: &[u64] = &[50];
pub const RESET_PULSE: &[u64] = &[20];
pub const LISTEN_ON_PULSE: &[u64] = &[50, 50];
pub const LISTEN_OFF_PULSE: &[u64] = &[20];

/// Vibration sink. `pattern` alternates on/off durations in milliseconds,
/// starting with "on".
pub trait Haptics: Send + Sync {
    fn pulse(&self, pattern: &[u64]);
}

/// Hosts without a vibration motor: the cue is only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self, pattern: &[u64]) {
        log::debug!("haptics: {pattern:?}");
    }
}

#[cfg(test)]
pub use recording::RecordingHaptics;

#[cfg(test)]
mod recording {
    use std::sync::{Arc, Mutex};

    use super::Haptics;

    #[derive(Debug, Clone, Default)]
    pub struct RecordingHaptics {
        pub pulses: Arc<Mutex<Vec<Vec<u64>>>>,
    }

    impl RecordingHaptics {
        pub fn pulses(&self) -> Vec<Vec<u64>> {
            self.pulses.lock().unwrap().clone()
        }
    }

    impl Haptics for RecordingHaptics {
        fn pulse(&self, pattern: &[u64]) {
            self.pulses.lock().unwrap().push(pattern.to_vec());
        }
    }
}
