//! Application entry point — VisionAlly console.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse arguments and load [`AppConfig`] (default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Load the attempt budget from `usage.toml`.
//! 5. Build the device controller, analyzer and output ports.
//! 6. Spawn the [`SessionStateMachine`] and acquire the camera.
//! 7. Read commands from stdin until `quit` or end of input, driving the
//!    session and the narration player.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use visionally::{
    analysis::{ConfigCredentials, GeminiAnalyzer},
    cli::{self, Args, ConsoleCommand},
    config::{AppConfig, AppPaths},
    device::{CpalMediaBackend, MediaDeviceController},
    playback::{
        CpalPlaybackSink, DecodedAudio, MonotonicClock, PlaybackError, TimedPlaybackController,
    },
    session::{
        load_budget, lock_session, new_shared_session, ConsoleNarrator, LogHaptics,
        SessionCommand, SessionPorts, SessionStateMachine, SharedSession, TomlUsageStore,
    },
};

type Player = TimedPlaybackController<MonotonicClock, CpalPlaybackSink>;

// ---------------------------------------------------------------------------
// Console loop
// ---------------------------------------------------------------------------

async fn run_console(
    command_tx: mpsc::Sender<SessionCommand>,
    shared: SharedSession,
    config: AppConfig,
) {
    let mut player: Player =
        TimedPlaybackController::new(MonotonicClock::new(), CpalPlaybackSink::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", cli::HELP);

    loop {
        let playing = player.is_playing();
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("console: stdin read failed: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let cmd = match cli::parse_command(&line) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                match cmd {
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Session(cmd) => {
                        if command_tx.send(cmd).await.is_err() {
                            log::error!("console: session task has stopped");
                            break;
                        }
                    }
                    ConsoleCommand::Status => {
                        let snap = lock_session(&shared).clone();
                        println!("{}", cli::render_status(&snap, &config.usage.checkout_url));
                    }
                    ConsoleCommand::Help => println!("{}", cli::HELP),
                    other => handle_playback(&mut player, other, config.playback.skip_secs),
                }
            }
            _ = player.wait_for_completion(), if playing => {
                println!("[playback finished]");
            }
        }
    }
}

fn handle_playback(player: &mut Player, cmd: ConsoleCommand, skip_secs: f64) {
    let result = match cmd {
        ConsoleCommand::Play(path) => load_and_play(player, &path),
        ConsoleCommand::Toggle => player.toggle(),
        ConsoleCommand::Pause => {
            player.pause();
            Ok(())
        }
        ConsoleCommand::Resume => player.resume(),
        ConsoleCommand::Back => player.seek(-skip_secs),
        ConsoleCommand::Forward => player.seek(skip_secs),
        ConsoleCommand::Replay => player.replay(),
        _ => Ok(()),
    };
    match result {
        Ok(()) => println!(
            "[playback {:.1}/{:.1}s{}]",
            player.elapsed(),
            player.duration(),
            if player.is_playing() { "" } else { " paused" }
        ),
        Err(e) => println!("playback: {e}"),
    }
}

fn load_and_play(player: &mut Player, path: &Path) -> Result<(), PlaybackError> {
    let audio = DecodedAudio::from_wav_file(path)?;
    player.load(audio);
    player.play(0.0)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("VisionAlly starting up");

    // 2. Arguments + configuration
    let args = Args::parse();
    let loaded = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    if let Some(dir) = &args.downloads {
        config.downloads.dir = Some(dir.clone());
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    // 4. Usage budget
    let paths = AppPaths::new();
    let usage = Arc::new(TomlUsageStore::new(&paths.usage_file));
    let budget = load_budget(usage.as_ref(), config.usage.free_attempts);
    log::info!(
        "Usage: {} free attempts left{}",
        budget.attempts_left,
        if budget.is_premium { " (premium)" } else { "" }
    );
    let shared = new_shared_session(budget, config.session.max_recording_secs);

    // 5. Collaborators
    let device = MediaDeviceController::new(
        Arc::new(CpalMediaBackend::new()),
        config.capture.clone(),
    );
    let ports = SessionPorts {
        analyzer: Arc::new(GeminiAnalyzer::from_config(&config.analysis)),
        credentials: Arc::new(ConfigCredentials::new(config.analysis.api_key.clone())),
        usage,
        narrator: Arc::new(ConsoleNarrator),
        haptics: Arc::new(LogHaptics),
    };
    let machine = SessionStateMachine::new(
        Arc::clone(&shared),
        device,
        ports,
        config.session.clone(),
        config.downloads.resolve(),
    );

    rt.block_on(async move {
        // 6. Session task + camera
        let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(16);
        let session = tokio::spawn(machine.run(command_rx));

        let _ = command_tx.send(SessionCommand::ActivateCamera).await;
        if args.upgrade_success {
            let _ = command_tx.send(SessionCommand::UpgradeSucceeded).await;
        }

        // 7. Console
        run_console(command_tx, shared, config).await;

        log::info!("Waiting for outstanding session work");
        match tokio::time::timeout(Duration::from_secs(60), session).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("session task failed: {e}"),
            Err(_) => log::warn!("session still busy after 60 s; exiting"),
        }
    });

    log::info!("VisionAlly shut down");
    Ok(())
}
