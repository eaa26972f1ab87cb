//! Abortable timer tasks owned by the session state machine.
//!
//! Every timer is a spawned task that posts a value on the machine's event
//! channel. The machine keeps each handle in a [`TimerSlot`] and cancels the
//! slot when it leaves the state that armed it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Holds at most one timer task.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Replace the current timer (aborting it) with `handle`.
    pub fn arm(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.handle = Some(handle);
    }

    /// Abort the timer, if any. Its pending event may still be queued; the
    /// machine's epoch check discards it.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget a one-shot timer that has fired.
    pub fn disarm(&mut self) {
        self.handle = None;
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Send `make()` every `period`, first after one full period.
pub fn periodic<T, F>(period: Duration, tx: mpsc::UnboundedSender<T>, mut make: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.send(make()).is_err() {
                break;
            }
        }
    })
}

/// Send `value` once after `delay`.
pub fn one_shot<T>(delay: Duration, tx: mpsc::UnboundedSender<T>, value: T) -> JoinHandle<()>
where
    T: Send + 'static,
{
    tokio::spawn(async move {
        time::sleep(delay).await;
        let _ = tx.send(value);
    })
}
