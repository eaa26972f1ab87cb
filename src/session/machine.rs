//! [`SessionStateMachine`] — sequences recording → analysis → narrated
//! result, and arbitrates voice commands against the current state.
//!
//! # Event loop
//!
//! ```text
//! SessionCommand (mpsc) ──┐
//!                         ├──▶ SessionStateMachine::run()  ← single tokio task
//! Tagged<SessionEvent> ───┘          │
//!   ▲                                ├─ MediaDeviceController (owned)
//!   │                                ├─ SharedSession snapshot (written)
//!   │                                └─ Narrator / Haptics / UsageStore
//!   │
//!   ├── countdown   (1 s,   Recording only)
//!   ├── progress    (50 ms, Analyzing only)
//!   ├── settle      (500 ms before Result)
//!   ├── error return (3 s,  Error → Idle)
//!   ├── frames      (per CaptureFrames interval, any state)
//!   └── analyze / ask tasks (never cancelled)
//! ```
//!
//! Every event carries the epoch of the state that produced it. The epoch
//! changes on every transition, so anything a previous state left in
//! flight is recognised and dropped. Frame ticks carry the generation of
//! their frame sequence instead, so a sequence survives state changes and
//! only a newer sequence or a reset ends it early.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::analysis::{AnalysisError, Analyzer, CredentialSource};
use crate::config::SessionConfig;
use crate::device::{MediaDeviceController, MAX_FRAME_SEQUENCE};
use crate::session::downloads::{now_millis, write_artifacts, DownloadArtifacts};
use crate::session::haptics::{
    Haptics, LISTEN_OFF_PULSE, LISTEN_ON_PULSE, RESET_PULSE, START_PULSE, STOP_PULSE,
};
use crate::session::narration::{self, clean_text, Narrator};
use crate::session::state::{lock_session, AnalysisContext, SessionState, SharedSession};
use crate::session::timers::{one_shot, periodic, TimerSlot};
use crate::session::usage::{AttemptBudget, UsageStore};
use crate::voice::{VoiceAction, VoiceCommandRouter};

// ---------------------------------------------------------------------------
// Commands, events, errors
// ---------------------------------------------------------------------------

/// External inputs to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// (Re)acquire the camera; the retry action after a device error.
    ActivateCamera,
    Start,
    Stop,
    Reset,
    /// A finalized speech-recognition transcript.
    Utterance(String),
    ToggleListening,
    /// The recogniser stopped on its own. Listening is not re-armed.
    ListeningEnded,
    /// Return from a successful checkout.
    UpgradeSucceeded,
    DismissUpgrade,
    Download,
    CaptureFrames { count: usize, interval_ms: u64 },
}

/// Why a start action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("all free attempts have been used")]
    QuotaExceeded,

    #[error("API key missing")]
    CredentialMissing,

    #[error("camera is not active")]
    DeviceUnavailable,

    #[error("cannot start while {0:?}")]
    Busy(SessionState),
}

#[derive(Debug)]
enum SessionEvent {
    CountdownTick,
    ProgressTick,
    AnalysisDone(Result<String, AnalysisError>),
    AnswerReady(Result<String, AnalysisError>),
    SettleElapsed,
    ErrorReturnElapsed,
    /// Next still of the frame sequence whose generation the tag carries.
    FrameTick,
}

#[derive(Debug)]
struct Tagged {
    epoch: u64,
    event: SessionEvent,
}

type EventSender = mpsc::UnboundedSender<Tagged>;

/// Collaborators the session talks to.
#[derive(Clone)]
pub struct SessionPorts {
    pub analyzer: Arc<dyn Analyzer>,
    pub credentials: Arc<dyn CredentialSource>,
    pub usage: Arc<dyn UsageStore>,
    pub narrator: Arc<dyn Narrator>,
    pub haptics: Arc<dyn Haptics>,
}

// ---------------------------------------------------------------------------
// SessionStateMachine
// ---------------------------------------------------------------------------

/// Owns the session state and the device controller.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use visionally::analysis::{ConfigCredentials, GeminiAnalyzer};
/// use visionally::config::AppConfig;
/// use visionally::device::{CpalMediaBackend, MediaDeviceController};
/// use visionally::session::{
///     new_shared_session, AttemptBudget, ConsoleNarrator, LogHaptics, MemoryUsageStore,
///     SessionCommand, SessionPorts, SessionStateMachine,
/// };
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let device = MediaDeviceController::new(Arc::new(CpalMediaBackend::new()), config.capture.clone());
/// let ports = SessionPorts {
///     analyzer: Arc::new(GeminiAnalyzer::from_config(&config.analysis)),
///     credentials: Arc::new(ConfigCredentials::new(config.analysis.api_key.clone())),
///     usage: Arc::new(MemoryUsageStore::default()),
///     narrator: Arc::new(ConsoleNarrator),
///     haptics: Arc::new(LogHaptics),
/// };
/// let shared = new_shared_session(AttemptBudget::new(3, false), 135);
/// let machine = SessionStateMachine::new(shared, device, ports, config.session.clone(), "downloads".into());
///
/// let (tx, rx) = mpsc::channel(16);
/// tokio::spawn(machine.run(rx));
/// tx.send(SessionCommand::ActivateCamera).await.unwrap();
/// tx.send(SessionCommand::Start).await.unwrap();
/// # }
/// ```
pub struct SessionStateMachine {
    shared: SharedSession,
    device: MediaDeviceController,
    ports: SessionPorts,
    config: SessionConfig,
    download_dir: PathBuf,
    router: VoiceCommandRouter,

    epoch: u64,
    events_tx: EventSender,
    events_rx: Option<mpsc::UnboundedReceiver<Tagged>>,

    countdown: TimerSlot,
    progress: TimerSlot,
    settle: TimerSlot,
    error_return: TimerSlot,
    frames: TimerSlot,
    /// Analyze / ask tasks whose result has not come back yet.
    inflight: usize,
    frame_job: Option<FrameJob>,
    frame_generation: u64,
}

/// A frame sequence in progress. One still is taken per frame tick.
#[derive(Debug)]
struct FrameJob {
    generation: u64,
    requested: usize,
    taken: usize,
    captured: usize,
}

impl SessionStateMachine {
    pub fn new(
        shared: SharedSession,
        device: MediaDeviceController,
        ports: SessionPorts,
        config: SessionConfig,
        download_dir: PathBuf,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let mut snap = lock_session(&shared);
            snap.time_left_secs = config.max_recording_secs;
        }
        Self {
            shared,
            device,
            ports,
            router: VoiceCommandRouter::new(config.min_question_chars),
            config,
            download_dir,
            epoch: 0,
            events_tx,
            events_rx: Some(events_rx),
            countdown: TimerSlot::default(),
            progress: TimerSlot::default(),
            settle: TimerSlot::default(),
            error_return: TimerSlot::default(),
            frames: TimerSlot::default(),
            inflight: 0,
            frame_job: None,
            frame_generation: 0,
        }
    }

    pub fn shared(&self) -> SharedSession {
        Arc::clone(&self.shared)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `commands` is closed and no analysis, answer, settle or
    /// error-return is still outstanding.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let Some(mut events) = self.events_rx.take() else {
            log::error!("session: run() called twice");
            return;
        };

        self.announce_startup();

        let mut open = true;
        while open || self.has_outstanding_work() {
            tokio::select! {
                cmd = commands.recv(), if open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        open = false;
                        log::info!("session: command channel closed, draining outstanding work");
                    }
                },
                Some(tagged) = events.recv() => self.handle_event(tagged).await,
                else => break,
            }
        }

        self.device.deactivate();
        log::info!("session: state machine shut down");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        log::debug!("session: command {cmd:?}");
        match cmd {
            SessionCommand::ActivateCamera => self.activate_camera().await,
            SessionCommand::Start => {
                if let Err(e) = self.start() {
                    log::warn!("session: start rejected: {e}");
                }
            }
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Reset => self.reset(),
            SessionCommand::Utterance(text) => self.handle_utterance(&text).await,
            SessionCommand::ToggleListening => self.toggle_listening(),
            SessionCommand::ListeningEnded => self.listening_ended(),
            SessionCommand::UpgradeSucceeded => self.upgrade_succeeded(),
            SessionCommand::DismissUpgrade => {
                lock_session(&self.shared).upgrade_prompt_visible = false;
            }
            SessionCommand::Download => match self.download() {
                Ok(Some(files)) => log::info!(
                    "session: downloaded {} and {}",
                    files.recording.display(),
                    files.transcript.display()
                ),
                Ok(None) => log::debug!("session: nothing to download"),
                Err(e) => log::error!("session: download failed: {e:#}"),
            },
            SessionCommand::CaptureFrames { count, interval_ms } => {
                self.start_frame_sequence(count, interval_ms).await
            }
        }
    }

    async fn handle_event(&mut self, tagged: Tagged) {
        let Tagged { epoch, event } = tagged;
        if matches!(
            event,
            SessionEvent::AnalysisDone(_) | SessionEvent::AnswerReady(_)
        ) {
            self.inflight = self.inflight.saturating_sub(1);
        }
        if let SessionEvent::FrameTick = event {
            if self
                .frame_job
                .as_ref()
                .is_some_and(|job| job.generation == epoch)
            {
                self.capture_next_frame().await;
            }
            return;
        }
        if epoch != self.epoch {
            log::debug!("session: dropping stale {event:?} from epoch {epoch}");
            return;
        }

        match event {
            // Handled (and returned from) above, before the epoch check.
            SessionEvent::FrameTick => {}
            SessionEvent::CountdownTick => self.countdown_tick().await,
            SessionEvent::ProgressTick => {
                let mut snap = lock_session(&self.shared);
                if snap.progress_pct < self.config.progress_hold_pct {
                    snap.progress_pct += 1;
                }
            }
            SessionEvent::AnalysisDone(result) => self.analysis_done(result),
            SessionEvent::AnswerReady(result) => self.answer_ready(result),
            SessionEvent::SettleElapsed => {
                self.settle.disarm();
                self.enter(SessionState::Result);
                let narration = lock_session(&self.shared).narration.clone();
                if let Some(text) = narration {
                    self.speak(&text);
                }
            }
            SessionEvent::ErrorReturnElapsed => {
                self.error_return.disarm();
                self.enter(SessionState::Idle);
                lock_session(&self.shared).clear_transient();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn announce_startup(&self) {
        if self.ports.credentials.lookup().is_some() {
            self.speak(narration::READY_ANNOUNCEMENT);
        } else {
            log::warn!("session: no API key configured");
            self.speak(narration::MISSING_KEY_ANNOUNCEMENT);
        }
    }

    async fn activate_camera(&mut self) {
        let state = self.current_state();
        if state.is_busy() {
            log::warn!("session: camera activation ignored while {state:?}");
            return;
        }
        let result = self.device.activate().await;
        let mut snap = lock_session(&self.shared);
        match result {
            Ok(()) => snap.device_error = None,
            Err(e) => {
                log::error!("session: camera unavailable: {e}");
                snap.device_error = Some(e);
            }
        }
    }

    /// Idle / Result → Recording.
    pub fn start(&mut self) -> Result<(), StartError> {
        let state = self.current_state();
        if !matches!(state, SessionState::Idle | SessionState::Result) {
            return Err(StartError::Busy(state));
        }

        let budget = lock_session(&self.shared).budget;
        if !budget.can_start() {
            lock_session(&self.shared).upgrade_prompt_visible = true;
            self.speak(narration::QUOTA_EXHAUSTED);
            return Err(StartError::QuotaExceeded);
        }
        if self.ports.credentials.lookup().is_none() {
            self.speak(narration::CANNOT_START_NO_KEY);
            return Err(StartError::CredentialMissing);
        }
        if !self.device.is_active() {
            return Err(StartError::DeviceUnavailable);
        }

        self.ports.haptics.pulse(START_PULSE);
        lock_session(&self.shared).clear_transient();
        self.device.start_recording();

        self.enter(SessionState::Recording);
        let epoch = self.epoch;
        self.countdown.arm(periodic(
            Duration::from_secs(1),
            self.events_tx.clone(),
            move || Tagged {
                epoch,
                event: SessionEvent::CountdownTick,
            },
        ));
        self.speak(narration::RECORDING_STARTED);
        Ok(())
    }

    /// Recording → Analyzing, or → Error when the clip or credential is
    /// missing. Shared by the stop action and the countdown reaching zero.
    async fn stop(&mut self) {
        let state = self.current_state();
        if state != SessionState::Recording {
            log::debug!("session: stop ignored while {state:?}");
            return;
        }

        self.countdown.cancel();
        self.ports.haptics.pulse(STOP_PULSE);

        let clip = match self.device.stop_recording().await {
            Ok(clip) => clip,
            Err(e) => {
                self.fail(format_args!("recording could not be finalised: {e}"));
                return;
            }
        };

        let context = AnalysisContext::from(&clip);
        {
            let mut snap = lock_session(&self.shared);
            snap.context = Some(context.clone());
            snap.clip = Some(clip);
        }

        let Some(credential) = self.ports.credentials.lookup() else {
            self.fail(AnalysisError::MissingCredential);
            return;
        };

        self.enter(SessionState::Analyzing);
        let epoch = self.epoch;
        lock_session(&self.shared).progress_pct = 0;
        self.progress.arm(periodic(
            Duration::from_millis(self.config.progress_tick_ms),
            self.events_tx.clone(),
            move || Tagged {
                epoch,
                event: SessionEvent::ProgressTick,
            },
        ));
        self.speak(narration::PROCESSING);

        let analyzer = Arc::clone(&self.ports.analyzer);
        let tx = self.events_tx.clone();
        self.inflight += 1;
        tokio::spawn(async move {
            let result = analyzer
                .analyze(&credential, &context.base64, &context.mime_type)
                .await;
            let _ = tx.send(Tagged {
                epoch,
                event: SessionEvent::AnalysisDone(result),
            });
        });
    }

    async fn countdown_tick(&mut self) {
        let remaining = {
            let mut snap = lock_session(&self.shared);
            snap.time_left_secs = snap.time_left_secs.saturating_sub(1);
            snap.time_left_secs
        };
        if remaining == 0 {
            log::info!("session: recording time limit reached");
            self.stop().await;
        }
    }

    fn analysis_done(&mut self, result: Result<String, AnalysisError>) {
        match result {
            Ok(text) => {
                let budget = {
                    let mut snap = lock_session(&self.shared);
                    snap.budget.consume();
                    snap.narration = Some(clean_text(&text));
                    snap.progress_pct = 100;
                    snap.budget
                };
                if !budget.is_premium {
                    self.persist(&budget);
                }
                log::info!(
                    "session: analysis complete, {} free attempts left",
                    budget.attempts_left
                );

                self.progress.cancel();
                self.settle.arm(one_shot(
                    Duration::from_millis(self.config.settle_delay_ms),
                    self.events_tx.clone(),
                    Tagged {
                        epoch: self.epoch,
                        event: SessionEvent::SettleElapsed,
                    },
                ));
            }
            Err(e) => self.fail(format_args!("analysis failed: {e}")),
        }
    }

    /// → Error, then back to Idle after the error-return delay. The budget
    /// is not touched.
    fn fail(&mut self, reason: impl Display) {
        log::error!("session: {reason}");
        self.enter(SessionState::Error);
        lock_session(&self.shared).context = None;
        self.speak(narration::ANALYSIS_FAILED);
        self.error_return.arm(one_shot(
            Duration::from_millis(self.config.error_return_ms),
            self.events_tx.clone(),
            Tagged {
                epoch: self.epoch,
                event: SessionEvent::ErrorReturnElapsed,
            },
        ));
    }

    /// Any state → Idle. Clears everything the last cycle produced; never
    /// touches the budget.
    pub fn reset(&mut self) {
        self.ports.haptics.pulse(RESET_PULSE);
        self.ports.narrator.cancel();
        self.device.discard_recording();
        self.end_frame_sequence();
        self.enter(SessionState::Idle);
        lock_session(&self.shared).clear_transient();
        self.speak(narration::READY);
    }

    // -----------------------------------------------------------------------
    // Frame sequences
    // -----------------------------------------------------------------------

    /// Takes the first still now and the rest one per `interval_ms` tick,
    /// so commands and timers keep flowing while the sequence runs. A new
    /// sequence replaces one still in progress.
    async fn start_frame_sequence(&mut self, count: usize, interval_ms: u64) {
        self.end_frame_sequence();
        if count == 0 {
            return;
        }
        if count > MAX_FRAME_SEQUENCE {
            log::warn!("session: {count} frames requested, capping at {MAX_FRAME_SEQUENCE}");
        }
        self.frame_generation += 1;
        let generation = self.frame_generation;
        self.frame_job = Some(FrameJob {
            generation,
            requested: count.min(MAX_FRAME_SEQUENCE),
            taken: 0,
            captured: 0,
        });

        self.capture_next_frame().await;
        if self.frame_job.is_some() {
            self.frames.arm(periodic(
                Duration::from_millis(interval_ms.max(1)),
                self.events_tx.clone(),
                move || Tagged {
                    epoch: generation,
                    event: SessionEvent::FrameTick,
                },
            ));
        }
    }

    async fn capture_next_frame(&mut self) {
        let Some(mut job) = self.frame_job.take() else {
            return;
        };
        match self.device.capture_still_frame().await {
            Ok(_) => job.captured += 1,
            Err(e) => log::warn!("session: frame {} skipped: {e}", job.taken + 1),
        }
        job.taken += 1;
        if job.taken < job.requested {
            self.frame_job = Some(job);
        } else {
            self.frames.cancel();
            log::info!("session: captured {}/{} frames", job.captured, job.requested);
        }
    }

    fn end_frame_sequence(&mut self) {
        self.frames.cancel();
        if let Some(job) = self.frame_job.take() {
            log::info!(
                "session: frame sequence stopped at {}/{} frames",
                job.taken,
                job.requested
            );
        }
    }

    // -----------------------------------------------------------------------
    // Voice commands
    // -----------------------------------------------------------------------

    async fn handle_utterance(&mut self, utterance: &str) {
        let (listening, state, has_context) = {
            let snap = lock_session(&self.shared);
            (snap.listening, snap.state, snap.context.is_some())
        };
        if !listening {
            log::debug!("session: utterance dropped, not listening");
            return;
        }
        lock_session(&self.shared).last_transcript = Some(VoiceCommandRouter::normalize(utterance));

        match self.router.route(state, has_context, utterance) {
            VoiceAction::ZoomIn => {
                self.device.zoom_in().await;
                self.speak(narration::ZOOMING_IN);
            }
            VoiceAction::ZoomOut => {
                self.device.zoom_out().await;
                self.speak(narration::ZOOMING_OUT);
            }
            VoiceAction::Ask(question) => self.ask(question),
            VoiceAction::Ignore => log::debug!("session: utterance ignored in {state:?}"),
        }
    }

    fn ask(&mut self, question: String) {
        let Some(context) = lock_session(&self.shared).context.clone() else {
            return;
        };
        let Some(credential) = self.ports.credentials.lookup() else {
            log::warn!("session: question dropped, no API key");
            return;
        };

        self.speak(narration::THINKING);
        let analyzer = Arc::clone(&self.ports.analyzer);
        let tx = self.events_tx.clone();
        let epoch = self.epoch;
        self.inflight += 1;
        tokio::spawn(async move {
            let result = analyzer
                .ask(&credential, &context.base64, &context.mime_type, &question)
                .await;
            let _ = tx.send(Tagged {
                epoch,
                event: SessionEvent::AnswerReady(result),
            });
        });
    }

    fn answer_ready(&mut self, result: Result<String, AnalysisError>) {
        match result {
            Ok(answer) => {
                let cleaned = clean_text(&answer);
                lock_session(&self.shared).qa_answer = Some(cleaned.clone());
                self.speak(&cleaned);
            }
            Err(e) => {
                log::warn!("session: question failed: {e}");
                self.speak(narration::ANSWER_FAILED);
            }
        }
    }

    fn toggle_listening(&mut self) {
        let listening = {
            let mut snap = lock_session(&self.shared);
            snap.listening = !snap.listening;
            snap.listening
        };
        self.ports.haptics.pulse(if listening {
            LISTEN_ON_PULSE
        } else {
            LISTEN_OFF_PULSE
        });
        log::info!("session: listening {}", if listening { "on" } else { "off" });
    }

    fn listening_ended(&mut self) {
        lock_session(&self.shared).listening = false;
        log::debug!("session: recogniser ended, listening off");
    }

    // -----------------------------------------------------------------------
    // Upgrade / download
    // -----------------------------------------------------------------------

    fn upgrade_succeeded(&mut self) {
        let budget = {
            let mut snap = lock_session(&self.shared);
            snap.budget.is_premium = true;
            snap.upgrade_prompt_visible = false;
            snap.budget
        };
        self.persist(&budget);
        self.speak(narration::UPGRADE_SUCCEEDED);
    }

    /// Write the clip and transcript. `Ok(None)` outside Result or when
    /// there is nothing to write.
    pub fn download(&mut self) -> anyhow::Result<Option<DownloadArtifacts>> {
        let (state, clip, narration, answer) = {
            let snap = lock_session(&self.shared);
            (
                snap.state,
                snap.clip.clone(),
                snap.narration.clone(),
                snap.qa_answer.clone(),
            )
        };
        let (SessionState::Result, Some(clip), Some(narration)) = (state, clip, narration) else {
            return Ok(None);
        };

        let files = write_artifacts(
            &self.download_dir,
            &clip,
            &narration,
            answer.as_deref(),
            now_millis(),
        )?;
        self.speak(narration::DOWNLOADING);
        Ok(Some(files))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Change state: new epoch, every timer cancelled, countdown display
    /// back at the ceiling unless recording.
    fn enter(&mut self, next: SessionState) {
        self.epoch += 1;
        self.countdown.cancel();
        self.progress.cancel();
        self.settle.cancel();
        self.error_return.cancel();

        let mut snap = lock_session(&self.shared);
        log::debug!("session: {:?} → {next:?}", snap.state);
        snap.state = next;
        snap.time_left_secs = self.config.max_recording_secs;
    }

    fn current_state(&self) -> SessionState {
        lock_session(&self.shared).state
    }

    fn has_outstanding_work(&self) -> bool {
        self.inflight > 0 || self.settle.is_armed() || self.error_return.is_armed()
    }

    fn speak(&self, text: &str) {
        self.ports.narrator.speak(&clean_text(text));
    }

    fn persist(&self, budget: &AttemptBudget) {
        if let Err(e) = self.ports.usage.save(budget) {
            log::warn!("usage: failed to persist budget: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::task::JoinHandle;

    use super::*;
    use crate::analysis::{ApiCredential, MockAnalyzer};
    use crate::config::CaptureConfig;
    use crate::device::MockBackend;
    use crate::session::haptics::RecordingHaptics;
    use crate::session::narration::RecordingNarrator;
    use crate::session::state::{new_shared_session, SessionSnapshot};
    use crate::session::usage::MemoryUsageStore;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Credential source whose answer can change mid-test.
    #[derive(Clone, Default)]
    struct SwitchableCredentials(Arc<Mutex<Option<ApiCredential>>>);

    impl SwitchableCredentials {
        fn with_key() -> Self {
            Self(Arc::new(Mutex::new(Some(ApiCredential::new("test-key")))))
        }

        fn remove(&self) {
            *self.0.lock().unwrap() = None;
        }
    }

    impl CredentialSource for SwitchableCredentials {
        fn lookup(&self) -> Option<ApiCredential> {
            self.0.lock().unwrap().clone()
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        tx: mpsc::Sender<SessionCommand>,
        shared: SharedSession,
        backend: MockBackend,
        analyzer: MockAnalyzer,
        credentials: SwitchableCredentials,
        narrator: RecordingNarrator,
        haptics: RecordingHaptics,
        usage: Arc<MemoryUsageStore>,
        task: JoinHandle<()>,
        _downloads: tempfile::TempDir,
    }

    struct Setup {
        budget: AttemptBudget,
        credentials: SwitchableCredentials,
        activate: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                budget: AttemptBudget::new(3, false),
                credentials: SwitchableCredentials::with_key(),
                activate: true,
            }
        }
    }

    async fn harness(setup: Setup) -> Harness {
        let backend = MockBackend::working();
        let analyzer = MockAnalyzer::default();
        let narrator = RecordingNarrator::default();
        let haptics = RecordingHaptics::default();
        let usage = Arc::new(MemoryUsageStore::new(Some(setup.budget)));
        let downloads = tempfile::tempdir().unwrap();

        let device =
            MediaDeviceController::new(Arc::new(backend.clone()), CaptureConfig::default());
        let ports = SessionPorts {
            analyzer: Arc::new(analyzer.clone()),
            credentials: Arc::new(setup.credentials.clone()),
            usage: usage.clone(),
            narrator: Arc::new(narrator.clone()),
            haptics: Arc::new(haptics.clone()),
        };
        let shared = new_shared_session(setup.budget, 135);
        let machine = SessionStateMachine::new(
            Arc::clone(&shared),
            device,
            ports,
            SessionConfig::default(),
            downloads.path().to_path_buf(),
        );

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(machine.run(rx));

        let h = Harness {
            tx,
            shared,
            backend,
            analyzer,
            credentials: setup.credentials,
            narrator,
            haptics,
            usage,
            task,
            _downloads: downloads,
        };
        if setup.activate {
            h.send(SessionCommand::ActivateCamera).await;
        }
        h
    }

    async fn wait_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    impl Harness {
        /// Send a command and let the machine process it.
        async fn send(&self, cmd: SessionCommand) {
            self.tx.send(cmd).await.unwrap();
            wait_ms(1).await;
        }

        fn snap(&self) -> SessionSnapshot {
            self.shared.lock().unwrap().clone()
        }

        fn state(&self) -> SessionState {
            self.shared.lock().unwrap().state
        }

        /// Start, stop, and wait for the narrated result.
        async fn full_cycle(&self) {
            self.send(SessionCommand::Start).await;
            assert_eq!(self.state(), SessionState::Recording);
            wait_ms(2_000).await;
            self.send(SessionCommand::Stop).await;
            wait_ms(2_000).await;
            assert_eq!(self.state(), SessionState::Result);
        }

        async fn finish(self) {
            drop(self.tx);
            self.task.await.unwrap();
        }
    }

    // -----------------------------------------------------------------------
    // Start / stop / analysis
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn full_cycle_reaches_result_with_cleaned_narration() {
        let h = harness(Setup::default()).await;
        h.analyzer.lock().analyze_reply = Ok("**Warning:** Car *ahead*".into());

        h.full_cycle().await;

        let snap = h.snap();
        assert_eq!(snap.narration.as_deref(), Some("Warning: Car ahead"));
        assert_eq!(snap.progress_pct, 100);
        assert!(snap.context.is_some());
        assert!(snap.clip.is_some());
        assert!(h.narrator.said("Warning: Car ahead"));
        assert!(h.narrator.said(narration::RECORDING_STARTED));
        assert!(h.narrator.said(narration::PROCESSING));
        assert_eq!(h.haptics.pulses(), vec![vec![50], vec![50]]);

        // The analyzer got exactly the recorded clip.
        let calls = h.analyzer.lock().analyze_calls.clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, snap.context.unwrap().base64);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn result_waits_for_settle_delay() {
        let h = harness(Setup::default()).await;

        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Stop).await;
        // Analysis takes 1 s, then a 500 ms settle.
        wait_ms(1_200).await;
        assert_eq!(h.state(), SessionState::Analyzing);
        assert_eq!(h.snap().progress_pct, 100);
        wait_ms(400).await;
        assert_eq!(h.state(), SessionState::Result);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn quota_is_spent_by_three_cycles_then_start_is_refused() {
        let h = harness(Setup::default()).await;

        for expected_left in [2, 1, 0] {
            h.full_cycle().await;
            assert_eq!(h.snap().budget.attempts_left, expected_left);
        }
        assert_eq!(h.usage.save_count(), 3);

        h.send(SessionCommand::Start).await;

        let snap = h.snap();
        assert_eq!(snap.state, SessionState::Result);
        assert!(snap.upgrade_prompt_visible);
        assert!(h.narrator.said(narration::QUOTA_EXHAUSTED));
        // No fourth recording was started on the device.
        assert_eq!(h.backend.lock().recorder_starts.len(), 3);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn premium_cycles_do_not_consume_attempts() {
        let h = harness(Setup {
            budget: AttemptBudget::new(0, true),
            ..Setup::default()
        })
        .await;

        h.full_cycle().await;
        h.full_cycle().await;

        assert_eq!(h.snap().budget, AttemptBudget::new(0, true));
        assert_eq!(h.usage.save_count(), 0);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_at_stop_goes_to_error_without_network() {
        let h = harness(Setup::default()).await;

        h.send(SessionCommand::Start).await;
        h.credentials.remove();
        h.send(SessionCommand::Stop).await;

        assert_eq!(h.state(), SessionState::Error);
        assert!(h.narrator.said(narration::ANALYSIS_FAILED));
        assert!(h.analyzer.lock().analyze_calls.is_empty());
        assert_eq!(h.snap().budget.attempts_left, 3);

        wait_ms(3_100).await;
        assert_eq!(h.state(), SessionState::Idle);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn analysis_failure_returns_to_idle_without_charge() {
        let h = harness(Setup::default()).await;
        h.analyzer.lock().analyze_reply = Err(AnalysisError::Timeout);

        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Stop).await;
        wait_ms(1_100).await;

        let snap = h.snap();
        assert_eq!(snap.state, SessionState::Error);
        assert_eq!(snap.budget.attempts_left, 3);
        assert!(snap.context.is_none());
        assert!(h.narrator.said(narration::ANALYSIS_FAILED));

        wait_ms(3_000).await;
        let snap = h.snap();
        assert_eq!(snap.state, SessionState::Idle);
        assert!(snap.clip.is_none());
        assert_eq!(h.usage.save_count(), 0);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_auto_stop_matches_manual_stop() {
        let h = harness(Setup::default()).await;

        h.send(SessionCommand::Start).await;
        wait_ms(60_000).await;
        assert_eq!(h.snap().time_left_secs, 75);

        wait_ms(75_100).await;
        assert_eq!(h.state(), SessionState::Analyzing);
        assert_eq!(h.snap().time_left_secs, 135);

        // A late manual stop is a no-op.
        h.send(SessionCommand::Stop).await;
        wait_ms(2_000).await;

        assert_eq!(h.state(), SessionState::Result);
        assert_eq!(h.backend.lock().recorder_stops, 1);
        assert_eq!(h.analyzer.lock().analyze_calls.len(), 1);
        assert_eq!(h.snap().budget.attempts_left, 2);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn progress_holds_below_completion_until_result_arrives() {
        let h = harness(Setup::default()).await;
        h.analyzer.lock().latency = Duration::from_secs(10);

        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Stop).await;

        wait_ms(2_000).await;
        let mid = h.snap().progress_pct;
        assert!(mid > 0 && mid < 90, "progress was {mid}");

        wait_ms(5_000).await;
        assert_eq!(h.snap().progress_pct, 90);

        wait_ms(3_600).await;
        assert_eq!(h.snap().progress_pct, 100);
        assert_eq!(h.state(), SessionState::Result);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn starting_again_clears_previous_result() {
        let h = harness(Setup::default()).await;
        h.full_cycle().await;
        h.send(SessionCommand::ToggleListening).await;
        h.send(SessionCommand::Utterance("what colour is it".into())).await;
        wait_ms(1_500).await;
        assert_eq!(h.snap().qa_answer.as_deref(), Some("It is blue."));

        h.send(SessionCommand::Start).await;

        let snap = h.snap();
        assert_eq!(snap.state, SessionState::Recording);
        assert!(snap.narration.is_none());
        assert!(snap.qa_answer.is_none());
        assert!(snap.context.is_none());
        assert!(snap.clip.is_none());
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_camera_is_device_unavailable() {
        let h = harness(Setup {
            activate: false,
            ..Setup::default()
        })
        .await;

        h.send(SessionCommand::Start).await;
        assert_eq!(h.state(), SessionState::Idle);
        assert!(h.backend.lock().recorder_starts.is_empty());

        h.send(SessionCommand::ActivateCamera).await;
        h.send(SessionCommand::Start).await;
        assert_eq!(h.state(), SessionState::Recording);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_credential_is_refused() {
        let credentials = SwitchableCredentials::default();
        let h = harness(Setup {
            credentials,
            ..Setup::default()
        })
        .await;

        h.send(SessionCommand::Start).await;

        assert_eq!(h.state(), SessionState::Idle);
        assert!(h.narrator.said(narration::MISSING_KEY_ANNOUNCEMENT));
        assert!(h.narrator.said(narration::CANNOT_START_NO_KEY));
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn camera_failure_is_recorded_for_retry() {
        let h = harness(Setup {
            activate: false,
            ..Setup::default()
        })
        .await;
        {
            let mut st = h.backend.lock();
            st.fail_preferred = Some(crate::device::BackendError::PermissionDenied("no".into()));
            st.fail_fallback = Some(crate::device::BackendError::PermissionDenied("no".into()));
        }

        h.send(SessionCommand::ActivateCamera).await;
        assert_eq!(
            h.snap().device_error,
            Some(crate::device::DeviceError::Permission)
        );

        {
            let mut st = h.backend.lock();
            st.fail_preferred = None;
            st.fail_fallback = None;
        }
        h.send(SessionCommand::ActivateCamera).await;
        assert_eq!(h.snap().device_error, None);
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn reset_during_analysis_discards_late_result() {
        let h = harness(Setup::default()).await;

        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Stop).await;
        h.send(SessionCommand::Reset).await;
        assert_eq!(h.state(), SessionState::Idle);

        wait_ms(2_000).await;

        let snap = h.snap();
        assert_eq!(snap.state, SessionState::Idle);
        assert!(snap.narration.is_none());
        assert_eq!(snap.budget.attempts_left, 3);
        assert!(h.narrator.said(narration::READY));
        assert_eq!(*h.narrator.cancels.lock().unwrap(), 1);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_recording_drops_the_clip() {
        let h = harness(Setup::default()).await;

        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Reset).await;
        wait_ms(200_000).await;

        assert_eq!(h.state(), SessionState::Idle);
        assert_eq!(h.backend.lock().recorder_stops, 0);
        assert!(h.analyzer.lock().analyze_calls.is_empty());
        assert_eq!(h.snap().time_left_secs, 135);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_from_result_clears_context_but_not_budget() {
        let h = harness(Setup::default()).await;
        h.full_cycle().await;

        h.send(SessionCommand::Reset).await;

        let snap = h.snap();
        assert_eq!(snap.state, SessionState::Idle);
        assert!(snap.context.is_none());
        assert!(snap.narration.is_none());
        assert_eq!(snap.budget.attempts_left, 2);
        assert_eq!(h.haptics.pulses().last(), Some(&vec![20]));
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Voice commands
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn zoom_in_routes_only_outside_result() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::ToggleListening).await;

        h.send(SessionCommand::Utterance("Zoom in".into())).await;
        assert_eq!(h.backend.lock().applied_zooms.len(), 1);
        assert!(h.narrator.said(narration::ZOOMING_IN));

        h.full_cycle().await;
        h.send(SessionCommand::Utterance("zoom in".into())).await;

        assert_eq!(h.backend.lock().applied_zooms.len(), 1);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn utterances_are_dropped_unless_listening() {
        let h = harness(Setup::default()).await;

        h.send(SessionCommand::Utterance("zoom in".into())).await;
        assert!(h.backend.lock().applied_zooms.is_empty());
        assert!(h.snap().last_transcript.is_none());

        h.send(SessionCommand::ToggleListening).await;
        h.send(SessionCommand::ListeningEnded).await;
        h.send(SessionCommand::Utterance("zoom in".into())).await;
        assert!(h.backend.lock().applied_zooms.is_empty());

        h.send(SessionCommand::ToggleListening).await;
        h.send(SessionCommand::Utterance("zoom out".into())).await;
        assert_eq!(h.snap().last_transcript.as_deref(), Some("zoom out"));
        assert_eq!(h.haptics.pulses(), vec![vec![50, 50], vec![50, 50]]);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_question_uses_the_retained_clip() {
        let h = harness(Setup::default()).await;
        h.full_cycle().await;
        h.send(SessionCommand::ToggleListening).await;
        h.analyzer.lock().ask_reply = Ok("The door is *blue*.".into());

        h.send(SessionCommand::Utterance("What colour is the door".into())).await;
        assert!(h.narrator.said(narration::THINKING));
        wait_ms(1_500).await;

        let snap = h.snap();
        assert_eq!(snap.qa_answer.as_deref(), Some("The door is blue."));
        assert!(h.narrator.said("The door is blue."));
        let asks = h.analyzer.lock().ask_calls.clone();
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].0, snap.context.unwrap().base64);
        assert_eq!(asks[0].1, "what colour is the door");
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_question_is_narrated_and_state_kept() {
        let h = harness(Setup::default()).await;
        h.full_cycle().await;
        h.send(SessionCommand::ToggleListening).await;
        h.analyzer.lock().ask_reply = Err(AnalysisError::Request("503".into()));

        h.send(SessionCommand::Utterance("is it safe".into())).await;
        wait_ms(1_500).await;

        assert!(h.narrator.said(narration::ANSWER_FAILED));
        assert_eq!(h.state(), SessionState::Result);
        assert!(h.snap().qa_answer.is_none());
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn voice_is_ignored_while_analyzing() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::ToggleListening).await;
        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Stop).await;

        h.send(SessionCommand::Utterance("zoom in".into())).await;
        h.send(SessionCommand::Utterance("what is there".into())).await;

        assert!(h.backend.lock().applied_zooms.is_empty());
        assert!(h.analyzer.lock().ask_calls.is_empty());
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Upgrade / download / startup
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn upgrade_unlocks_recording_and_hides_prompt() {
        let h = harness(Setup {
            budget: AttemptBudget::new(0, false),
            ..Setup::default()
        })
        .await;

        h.send(SessionCommand::Start).await;
        assert!(h.snap().upgrade_prompt_visible);

        h.send(SessionCommand::UpgradeSucceeded).await;
        let snap = h.snap();
        assert!(!snap.upgrade_prompt_visible);
        assert!(snap.budget.is_premium);
        assert_eq!(h.usage.save_count(), 1);
        assert!(h.narrator.said(narration::UPGRADE_SUCCEEDED));

        h.send(SessionCommand::Start).await;
        assert_eq!(h.state(), SessionState::Recording);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_can_be_dismissed() {
        let h = harness(Setup {
            budget: AttemptBudget::new(0, false),
            ..Setup::default()
        })
        .await;
        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::DismissUpgrade).await;
        assert!(!h.snap().upgrade_prompt_visible);
        assert!(!h.snap().budget.is_premium);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn download_writes_clip_and_transcript_in_result() {
        let h = harness(Setup::default()).await;

        // Nothing to download before a result exists.
        h.send(SessionCommand::Download).await;
        assert!(!h.narrator.said(narration::DOWNLOADING));

        h.full_cycle().await;
        h.send(SessionCommand::Download).await;
        assert!(h.narrator.said(narration::DOWNLOADING));

        let mut names: Vec<String> = std::fs::read_dir(h._downloads.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("visionally-recording-") && names[0].ends_with(".webm"));
        assert!(names[1].starts_with("visionally-transcript-") && names[1].ends_with(".txt"));
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn startup_announcement_depends_on_credential() {
        let h = harness(Setup::default()).await;
        assert_eq!(
            h.narrator.spoken().first().map(String::as_str),
            Some(narration::READY_ANNOUNCEMENT)
        );
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frame_capture_command_polls_the_device() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::CaptureFrames {
            count: 3,
            interval_ms: 100,
        })
        .await;
        wait_ms(500).await;
        assert_eq!(h.backend.lock().grabs, 3);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frame_sequence_does_not_hold_up_the_countdown() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::CaptureFrames {
            count: 300,
            interval_ms: 1_000,
        })
        .await;

        wait_ms(135_100).await;
        assert_eq!(h.state(), SessionState::Analyzing);
        assert_eq!(h.backend.lock().recorder_stops, 1);
        assert_eq!(h.backend.lock().grabs, MAX_FRAME_SEQUENCE);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_served_while_frames_are_captured() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::CaptureFrames {
            count: 50,
            interval_ms: 1_000,
        })
        .await;
        wait_ms(2_500).await;
        assert_eq!(h.backend.lock().grabs, 3);

        h.send(SessionCommand::Stop).await;
        assert_eq!(h.state(), SessionState::Analyzing);
        wait_ms(1_000).await;
        assert_eq!(h.backend.lock().grabs, 4);

        h.send(SessionCommand::Reset).await;
        assert_eq!(h.state(), SessionState::Idle);
        wait_ms(10_000).await;
        assert_eq!(h.backend.lock().grabs, 4);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn newer_frame_sequence_replaces_the_running_one() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::CaptureFrames {
            count: 10,
            interval_ms: 1_000,
        })
        .await;
        h.send(SessionCommand::CaptureFrames {
            count: 2,
            interval_ms: 100,
        })
        .await;
        wait_ms(5_000).await;
        assert_eq!(h.backend.lock().grabs, 3);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn closing_commands_still_delivers_pending_result() {
        let h = harness(Setup::default()).await;
        h.send(SessionCommand::Start).await;
        h.send(SessionCommand::Stop).await;

        let shared = Arc::clone(&h.shared);
        h.finish().await;

        let snap = shared.lock().unwrap().clone();
        assert_eq!(snap.state, SessionState::Result);
        assert_eq!(snap.budget.attempts_left, 2);
    }
}
