/*!
Transcription session: the root context of a running player.

A [`Session`] owns the [`PlaybackEngine`] and the [`TypingActivityMonitor`]
and drives both from one event loop. Refills, timer expiries and user input
are handled one at a time, so a refill never overlaps another and the monitor
always sees the engine between operations.
*/

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::audio::PlaybackEngine;
use crate::cli::StatusDisplay;
use crate::config::{ConfigManager, TranscribeConfig};
use crate::error::{PlaybackError, TranscribeError};
use crate::logging::{OperationTimer, PlaybackLogger};
use crate::models::{PlayerEvent, PlayerStatus, PumpMode, SeekDirection};
use crate::typing::TypingActivityMonitor;

/// Refill cadence used until the sink knows its format
const FALLBACK_REFILL_INTERVAL: Duration = Duration::from_millis(10);

/// How often the loop looks at the shutdown flag
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    MediaPlay,
    MediaPlayPause,
    MediaPause,
    MediaStop,
    MediaNext,
    MediaPrevious,
    Space,
    Left,
    Right,
    Up,
    Down,
    Enter,
    Backspace,
    Char(char),
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// A key press as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

/// What a key press does to playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Toggle,
    Pause,
    Skip(SeekDirection),
    BoostUp,
    BoostDown,
    /// Anything else is typing
    Typing,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn ctrl(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        }
    }

    pub fn alt(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers {
                alt: true,
                ..Modifiers::default()
            },
        }
    }

    pub fn action(&self) -> KeyAction {
        let Modifiers { ctrl, alt, .. } = self.modifiers;
        match self.key {
            Key::MediaPlay | Key::MediaPlayPause => KeyAction::Toggle,
            Key::MediaPause | Key::MediaStop => KeyAction::Pause,
            Key::MediaNext => KeyAction::Skip(SeekDirection::Forward),
            Key::MediaPrevious => KeyAction::Skip(SeekDirection::Backward),
            Key::Space if ctrl && !alt => KeyAction::Toggle,
            Key::Left if alt && !ctrl => KeyAction::Skip(SeekDirection::Backward),
            Key::Right if alt && !ctrl => KeyAction::Skip(SeekDirection::Forward),
            Key::Up if alt && !ctrl => KeyAction::BoostUp,
            Key::Down if alt && !ctrl => KeyAction::BoostDown,
            _ => KeyAction::Typing,
        }
    }
}

/// Interactive commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Forward,
    Back,
    /// Jump to an absolute second
    SeekTo(u64),
    BoostUp,
    BoostDown,
    SetWait(u64),
    SetType(u64),
    Status,
    Help,
    Quit,
}

/// One item on the session's input channel
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Key(KeyInput),
    Command(Command),
    /// A line of transcript text
    Text(String),
}

/// What the front end should do after an input was handled
#[derive(Debug, Clone)]
pub enum Outcome {
    Continue,
    Status(PlayerStatus),
    Help,
    Quit,
}

pub struct Session {
    engine: PlaybackEngine,
    monitor: TypingActivityMonitor,
    config: Option<ConfigManager>,
    logger: PlaybackLogger,
    events: UnboundedReceiver<PlayerEvent>,
    seek_step_secs: u64,
    transcript: Option<File>,
    notices: Vec<String>,
}

impl Session {
    pub fn new(mut engine: PlaybackEngine, config: &TranscribeConfig) -> Self {
        engine.apply_config(config);
        let events = engine.subscribe();
        Self {
            engine,
            monitor: TypingActivityMonitor::with_timeouts(config.wait_timeout_ms, config.type_timeout_ms),
            config: None,
            logger: PlaybackLogger::new(),
            events,
            seek_step_secs: config.seek_step_secs.max(1),
            transcript: None,
            notices: Vec::new(),
        }
    }

    /// Session whose timeout changes are saved through `manager`
    pub fn with_config_manager(engine: PlaybackEngine, manager: ConfigManager) -> Self {
        let config = manager.get_config().clone();
        let mut session = Self::new(engine, &config);
        session.config = Some(manager);
        session
    }

    /// Append typed lines to `path`
    pub fn set_transcript(&mut self, path: &Path) -> Result<(), TranscribeError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("Writing transcript to {}", path.display());
        self.transcript = Some(file);
        Ok(())
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine {
        &mut self.engine
    }

    pub fn monitor(&self) -> &TypingActivityMonitor {
        &self.monitor
    }

    pub fn logger(&self) -> &PlaybackLogger {
        &self.logger
    }

    pub fn open(&mut self, path: &Path) -> Result<PumpMode, PlaybackError> {
        let timer = OperationTimer::new(format!("open {}", path.display()));
        let result = self.engine.open(path);
        timer.finish_with_threshold(Duration::from_millis(200));

        if let Ok(mode) = &result {
            let format = self
                .engine
                .status()
                .format
                .map(|f| f.description())
                .unwrap_or_else(|| "format known once decoding starts".to_string());
            self.logger.log_file_opened(&path.display().to_string(), &format);
            self.logger.log_pump_selected(mode.as_str());
        }
        self.dispatch_events();
        result
    }

    pub fn status(&self) -> PlayerStatus {
        let mut status = self.engine.status();
        status.wait_timeout_ms = self.monitor.wait_timeout_ms();
        status.type_timeout_ms = self.monitor.type_timeout_ms();
        status
    }

    /// Messages for the user collected since the last call
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn handle_input(&mut self, input: SessionInput, now: Instant) -> Outcome {
        let outcome = match input {
            SessionInput::Key(key) => {
                self.handle_key(key, now);
                Outcome::Continue
            }
            SessionInput::Command(command) => self.handle_command(command),
            SessionInput::Text(text) => {
                self.type_text(&text, now);
                Outcome::Continue
            }
        };
        self.dispatch_events();
        outcome
    }

    pub fn handle_key(&mut self, key: KeyInput, now: Instant) {
        match key.action() {
            KeyAction::Toggle => {
                self.engine.toggle();
            }
            KeyAction::Pause => {
                self.engine.toggle_play_pause(false);
            }
            KeyAction::Skip(direction) => self.skip(direction),
            KeyAction::BoostUp => self.change_boost(1),
            KeyAction::BoostDown => self.change_boost(-1),
            KeyAction::Typing => self.monitor.key_typed(&mut self.engine, now),
        }
        self.dispatch_events();
    }

    pub fn handle_command(&mut self, command: Command) -> Outcome {
        match command {
            Command::Play => {
                self.engine.toggle_play_pause(true);
            }
            Command::Pause => {
                self.engine.toggle_play_pause(false);
            }
            Command::Toggle => {
                self.engine.toggle();
            }
            Command::Forward => self.skip(SeekDirection::Forward),
            Command::Back => self.skip(SeekDirection::Backward),
            Command::SeekTo(secs) => {
                let from = self.engine.position_ms();
                let to = self.engine.set_position_secs(secs.min(i64::MAX as u64) as i64);
                self.logger.log_seek(from, to);
            }
            Command::BoostUp => self.change_boost(1),
            Command::BoostDown => self.change_boost(-1),
            Command::SetWait(ms) => {
                self.set_wait_timeout(ms);
            }
            Command::SetType(ms) => {
                self.set_type_timeout(ms);
            }
            Command::Status => return Outcome::Status(self.status()),
            Command::Help => return Outcome::Help,
            Command::Quit => return Outcome::Quit,
        }
        self.dispatch_events();
        Outcome::Continue
    }

    /// Record a line of transcript; it counts as typing
    pub fn type_text(&mut self, text: &str, now: Instant) {
        if let Some(file) = self.transcript.as_mut() {
            if let Err(e) = writeln!(file, "{}", text) {
                log::warn!("Cannot append to transcript: {}", e);
                self.notices.push(format!("Transcript not saved: {}", e));
                self.transcript = None;
            }
        }
        self.monitor.key_typed(&mut self.engine, now);
        self.dispatch_events();
    }

    pub fn set_wait_timeout(&mut self, ms: u64) -> u64 {
        let kept = self.monitor.set_wait_timeout(ms, &mut self.engine);
        self.persist_timeouts();
        self.dispatch_events();
        kept
    }

    pub fn set_type_timeout(&mut self, ms: u64) -> u64 {
        let kept = self.monitor.set_type_timeout(ms, &mut self.engine);
        self.persist_timeouts();
        self.dispatch_events();
        kept
    }

    fn persist_timeouts(&mut self) {
        let (wait_ms, type_ms) = (self.monitor.wait_timeout_ms(), self.monitor.type_timeout_ms());
        if let Some(manager) = self.config.as_mut() {
            if let Err(e) = manager.set_timeouts(wait_ms, type_ms) {
                log::warn!("Cannot save timeouts: {}", e);
                self.notices.push(e.user_message());
            }
        }
    }

    fn skip(&mut self, direction: SeekDirection) {
        let from = self.engine.position_ms();
        let to = self.engine.skip(direction, self.seek_step_secs);
        self.logger.log_seek(from, to);
    }

    fn change_boost(&mut self, steps: i32) {
        let db = if steps > 0 { self.engine.boost_up() } else { self.engine.boost_down() };
        if let Some(manager) = self.config.as_mut() {
            if let Err(e) = manager.set_boost_db(db) {
                log::warn!("Cannot save boost level: {}", e);
            }
        }
    }

    /// Run one refill cycle
    pub fn refill(&mut self) {
        self.engine.refill();
        self.dispatch_events();
    }

    /// Fire the typing timers that are due
    pub fn poll_timers(&mut self, now: Instant) {
        self.monitor.poll(&mut self.engine, now);
        self.dispatch_events();
    }

    /// Hand engine notifications to the monitor, the event log and the user
    fn dispatch_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.logger.log_player_event(&event);
            match &event {
                PlayerEvent::StateChanged(state) => {
                    self.monitor.state_changed(*state);
                    self.notices.push(StatusDisplay::format_state(*state));
                }
                PlayerEvent::Error(message) => self.notices.push(message.clone()),
                PlayerEvent::BoostUnsupported(layout) => {
                    self.notices
                        .push(PlaybackError::BoostUnsupported { layout: layout.clone() }.user_message());
                }
                PlayerEvent::BoostChanged(db) => self.notices.push(format!("Boost {:+} dB", db)),
                _ => {}
            }
        }
    }

    fn refill_period(&self) -> Duration {
        self.engine
            .sink()
            .refill_interval()
            .unwrap_or(FALLBACK_REFILL_INTERVAL)
    }

    fn refill_timer(period: Duration) -> Interval {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// Drive the session until `:quit`, the end of input or `shutdown`.
    pub async fn run(
        &mut self,
        mut input: UnboundedReceiver<SessionInput>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), TranscribeError> {
        let mut period = self.refill_period();
        let mut refill = Self::refill_timer(period);
        let mut shutdown_check = time::interval(SHUTDOWN_CHECK_INTERVAL);

        loop {
            if shutdown.load(Ordering::Relaxed) {
                log::info!("Shutdown requested");
                break;
            }

            let deadline = self.monitor.next_deadline();
            tokio::select! {
                biased;

                received = input.recv() => match received {
                    Some(item) => match self.handle_input(item, Instant::now()) {
                        Outcome::Quit => break,
                        Outcome::Status(status) => StatusDisplay::display_full_status(&status),
                        Outcome::Help => StatusDisplay::display_interactive_help(),
                        Outcome::Continue => {}
                    },
                    None => {
                        log::debug!("Input closed");
                        break;
                    }
                },

                _ = wait_until(deadline) => self.poll_timers(Instant::now()),

                _ = refill.tick() => self.refill(),

                _ = shutdown_check.tick() => {}
            }

            for notice in self.take_notices() {
                StatusDisplay::display_notice(&notice);
            }

            // Tapped streams only reveal their format once decoding starts
            let current = self.refill_period();
            if current != period {
                log::debug!("Refill interval now {:?}", current);
                period = current;
                refill = Self::refill_timer(period);
            }
        }

        self.engine.toggle_play_pause(false);
        self.dispatch_events();
        self.take_notices();
        Ok(())
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{cd_mono, MemorySink, ScriptedBackend, WavBuilder};
    use crate::logging::PlaybackEventType;
    use crate::models::PlayerState;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::sync::mpsc::unbounded_channel;

    fn wav_file(dir: &TempDir, ms: u64) -> PathBuf {
        let bytes = cd_mono().bytes_for_duration(ms) as usize;
        let path = dir.path().join("interview.wav");
        std::fs::write(&path, WavBuilder::new().data(vec![0u8; bytes]).build()).unwrap();
        path
    }

    fn engine() -> PlaybackEngine {
        let backend = ScriptedBackend {
            tap_available: false,
            buffers: Vec::new(),
            duration_ms: 0,
            fail_open: false,
        };
        PlaybackEngine::new(Box::new(MemorySink::new(882 * 4, 882)), Box::new(backend))
    }

    fn config() -> TranscribeConfig {
        TranscribeConfig {
            wait_timeout_ms: 2000,
            type_timeout_ms: 500,
            ..TranscribeConfig::default()
        }
    }

    fn session_with_file(dir: &TempDir, ms: u64) -> Session {
        let mut session = Session::new(engine(), &config());
        session.open(&wav_file(dir, ms)).unwrap();
        session
    }

    #[test]
    fn test_key_classification() {
        let cases = [
            (KeyInput::new(Key::MediaPlay), KeyAction::Toggle),
            (KeyInput::new(Key::MediaPlayPause), KeyAction::Toggle),
            (KeyInput::new(Key::MediaPause), KeyAction::Pause),
            (KeyInput::new(Key::MediaStop), KeyAction::Pause),
            (KeyInput::new(Key::MediaNext), KeyAction::Skip(SeekDirection::Forward)),
            (KeyInput::new(Key::MediaPrevious), KeyAction::Skip(SeekDirection::Backward)),
            (KeyInput::ctrl(Key::Space), KeyAction::Toggle),
            (KeyInput::alt(Key::Left), KeyAction::Skip(SeekDirection::Backward)),
            (KeyInput::alt(Key::Right), KeyAction::Skip(SeekDirection::Forward)),
            (KeyInput::alt(Key::Up), KeyAction::BoostUp),
            (KeyInput::alt(Key::Down), KeyAction::BoostDown),
            (KeyInput::new(Key::Space), KeyAction::Typing),
            (KeyInput::new(Key::Left), KeyAction::Typing),
            (KeyInput::ctrl(Key::Up), KeyAction::Typing),
            (KeyInput::new(Key::Char('x')), KeyAction::Typing),
            (KeyInput::new(Key::Backspace), KeyAction::Typing),
        ];
        for (input, expected) in cases {
            assert_eq!(input.action(), expected, "{:?}", input);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_holds_playback_until_the_user_stops() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 6000);
        session.handle_command(Command::Play);
        assert_eq!(session.engine().state(), PlayerState::Playing);

        for _ in 0..19 {
            session.handle_key(KeyInput::new(Key::Char('a')), Instant::now());
            time::advance(Duration::from_millis(100)).await;
            session.poll_timers(Instant::now());
        }
        assert_eq!(session.engine().state(), PlayerState::Playing);

        session.handle_key(KeyInput::new(Key::Char('a')), Instant::now());
        time::advance(Duration::from_millis(100)).await;
        session.poll_timers(Instant::now());
        assert_eq!(session.engine().state(), PlayerState::Waiting);

        time::advance(Duration::from_millis(500)).await;
        session.poll_timers(Instant::now());
        assert_eq!(session.engine().state(), PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_the_timers() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 6000);
        session.handle_command(Command::Play);
        session.handle_key(KeyInput::new(Key::Char('a')), Instant::now());
        assert!(session.monitor().is_wait_timer_active());

        session.handle_key(KeyInput::new(Key::MediaPause), Instant::now());
        assert_eq!(session.engine().state(), PlayerState::Paused);
        assert!(!session.monitor().is_wait_timer_active());
        assert!(!session.monitor().is_type_timer_active());
        assert_eq!(session.monitor().next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_drive_the_engine() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 20_000);

        session.handle_command(Command::Forward);
        assert_eq!(session.engine().position_secs(), 5);
        session.handle_command(Command::Forward);
        session.handle_command(Command::Back);
        assert_eq!(session.engine().position_secs(), 5);
        session.handle_command(Command::SeekTo(12));
        assert_eq!(session.engine().position_secs(), 12);

        session.handle_command(Command::BoostUp);
        session.handle_command(Command::BoostUp);
        session.handle_command(Command::BoostDown);
        assert_eq!(session.engine().boost_db(), 1);

        session.handle_command(Command::Toggle);
        assert_eq!(session.engine().state(), PlayerState::Playing);
        session.handle_command(Command::Toggle);
        assert_eq!(session.engine().state(), PlayerState::Paused);

        match session.handle_command(Command::Status) {
            Outcome::Status(status) => {
                assert_eq!(status.wait_timeout_ms, 2000);
                assert_eq!(status.type_timeout_ms, 500);
                assert_eq!(status.duration_ms, 20_000);
            }
            other => panic!("expected a status, got {:?}", other),
        }
        assert!(matches!(session.handle_command(Command::Quit), Outcome::Quit));
        assert_eq!(session.logger().get_event_statistics().seeks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_changes_pause_and_persist() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        let mut session = Session::with_config_manager(engine(), manager);
        session.open(&wav_file(&dir, 6000)).unwrap();
        session.handle_command(Command::Play);

        assert_eq!(session.set_wait_timeout(3000), 3000);
        assert_eq!(session.engine().state(), PlayerState::Paused);
        assert_eq!(session.set_type_timeout(4000), 2900);

        let saved = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(saved.get_config().wait_timeout_ms, 3000);
        assert_eq!(saved.get_config().type_timeout_ms, 2900);

        // an unchanged value leaves playback alone
        session.handle_command(Command::Play);
        session.handle_command(Command::SetWait(3000));
        assert_eq!(session.engine().state(), PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_lines_are_appended() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 6000);
        let transcript = dir.path().join("notes.txt");
        session.set_transcript(&transcript).unwrap();

        session.handle_input(SessionInput::Text("first line".to_string()), Instant::now());
        session.handle_input(SessionInput::Text("second line".to_string()), Instant::now());

        let text = std::fs::read_to_string(&transcript).unwrap();
        assert_eq!(text, "first line\nsecond line\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_becomes_a_notice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let backend = ScriptedBackend {
            tap_available: false,
            buffers: Vec::new(),
            duration_ms: 0,
            fail_open: true,
        };
        let engine = PlaybackEngine::new(Box::new(MemorySink::new(882 * 4, 882)), Box::new(backend));
        let mut session = Session::new(engine, &config());

        assert!(session.open(&path).is_err());
        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].starts_with("The audio file can't be loaded."));
        assert_eq!(session.logger().get_event_statistics().load_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_waits_while_typing() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 60_000);
        let transcript = dir.path().join("notes.txt");
        session.set_transcript(&transcript).unwrap();
        let logger = session.logger().clone();

        let (tx, rx) = unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(async move {
            session.run(rx, shutdown).await.unwrap();
            session
        });

        tx.send(SessionInput::Command(Command::Play)).unwrap();
        time::sleep(Duration::from_millis(30)).await;
        for _ in 0..25 {
            tx.send(SessionInput::Text("word".to_string())).unwrap();
            time::sleep(Duration::from_millis(100)).await;
        }
        time::sleep(Duration::from_millis(1000)).await;
        tx.send(SessionInput::Command(Command::Quit)).unwrap();

        let session = handle.await.unwrap();
        assert_eq!(logger.typing_pauses(), 1);
        assert_eq!(session.engine().state(), PlayerState::Paused);
        let lines = std::fs::read_to_string(&transcript).unwrap();
        assert_eq!(lines.lines().count(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_waits_on_keystrokes() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 60_000);
        let logger = session.logger().clone();

        let (tx, rx) = unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(async move {
            session.run(rx, shutdown).await.unwrap();
            session
        });

        tx.send(SessionInput::Key(KeyInput::new(Key::MediaPlay))).unwrap();
        time::sleep(Duration::from_millis(30)).await;
        // about 400 keystrokes a minute for six seconds
        for c in "the witness said she left before midnight".chars() {
            let key = if c == ' ' { Key::Space } else { Key::Char(c) };
            tx.send(SessionInput::Key(KeyInput::new(key))).unwrap();
            time::sleep(Duration::from_millis(150)).await;
        }
        time::sleep(Duration::from_millis(1000)).await;
        tx.send(SessionInput::Command(Command::Quit)).unwrap();

        let session = handle.await.unwrap();
        assert_eq!(logger.typing_pauses(), 1);
        let states: Vec<PlayerState> = logger
            .get_recent_events(500)
            .iter()
            .filter(|e| e.event_type == PlaybackEventType::StateChanged)
            .filter_map(|e| {
                [PlayerState::Playing, PlayerState::Waiting, PlayerState::Paused]
                    .into_iter()
                    .find(|s| e.details.ends_with(s.as_str()))
            })
            .collect();
        assert_eq!(
            states,
            vec![PlayerState::Playing, PlayerState::Waiting, PlayerState::Playing, PlayerState::Paused]
        );
        assert_eq!(session.engine().state(), PlayerState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_flag() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_file(&dir, 6000);
        let (_tx, rx) = unbounded_channel::<SessionInput>();
        let shutdown = Arc::new(AtomicBool::new(true));

        tokio_test::assert_ok!(session.run(rx, shutdown).await);
        assert_eq!(session.engine().state(), PlayerState::Paused);
    }
}
