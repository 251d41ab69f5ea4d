use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::{format_seconds, whole_seconds, MediaStatus, PlayerEvent, PlayerState};

/// Environment variable holding the log level
pub const LOG_LEVEL_ENV: &str = "TRANSCRIBE_LOG_LEVEL";

/// Playback event kept in the history for debugging
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    FileOpened,
    PumpSelected,
    StateChanged,
    Seek,
    BoostChanged,
    BoostUnsupported,
    EndOfMedia,
    LoadError,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::FileOpened => "FILE_OPENED",
            PlaybackEventType::PumpSelected => "PUMP_SELECTED",
            PlaybackEventType::StateChanged => "STATE_CHANGED",
            PlaybackEventType::Seek => "SEEK",
            PlaybackEventType::BoostChanged => "BOOST_CHANGED",
            PlaybackEventType::BoostUnsupported => "BOOST_UNSUPPORTED",
            PlaybackEventType::EndOfMedia => "END_OF_MEDIA",
            PlaybackEventType::LoadError => "LOAD_ERROR",
        }
    }

    fn level(&self) -> log::Level {
        match self {
            PlaybackEventType::FileOpened
            | PlaybackEventType::PumpSelected
            | PlaybackEventType::EndOfMedia
            | PlaybackEventType::BoostChanged => log::Level::Info,
            PlaybackEventType::StateChanged | PlaybackEventType::Seek => log::Level::Debug,
            PlaybackEventType::BoostUnsupported => log::Level::Warn,
            PlaybackEventType::LoadError => log::Level::Error,
        }
    }
}

/// Logger for playback operations and debugging
#[derive(Clone)]
pub struct PlaybackLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl PlaybackLogger {
    pub fn new() -> Self {
        Self::with_capacity(500)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
        }
    }

    /// Initialize env_logger from `TRANSCRIBE_LOG_LEVEL` (default warn)
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "warn".to_string());

        let mut builder = env_logger::Builder::new();

        // "\r\n" keeps lines readable while an interactive session holds the terminal in raw mode
        builder.format(|buf, record| {
            use std::io::Write;
            write!(
                buf,
                "{} [{}] [{}:{}] {}\r\n",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(Self::parse_level(&log_level));
        builder.try_init()?;

        info!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    fn parse_level(level: &str) -> log::LevelFilter {
        match level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Warn,
        }
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<PlaybackEvent>> {
        // A panic while holding the lock leaves the history usable
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log_event(&self, event_type: PlaybackEventType, details: String) {
        match event_type.level() {
            log::Level::Error => error!("[{}] {}", event_type.as_str(), details),
            log::Level::Warn => warn!("[{}] {}", event_type.as_str(), details),
            log::Level::Info => info!("[{}] {}", event_type.as_str(), details),
            _ => debug!("[{}] {}", event_type.as_str(), details),
        }

        let mut events = self.history();
        events.push_back(PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_file_opened(&self, path: &str, format_info: &str) {
        self.log_event(PlaybackEventType::FileOpened, format!("Opened {} ({})", path, format_info));
    }

    pub fn log_pump_selected(&self, mode: &str) {
        self.log_event(PlaybackEventType::PumpSelected, format!("Using {} buffer pump", mode));
    }

    /// Record an engine notification; position and duration updates are too
    /// chatty for the history and are skipped.
    pub fn log_player_event(&self, event: &PlayerEvent) {
        match event {
            PlayerEvent::StateChanged(state) => {
                self.log_event(PlaybackEventType::StateChanged, format!("Now {}", state));
            }
            PlayerEvent::MediaStatusChanged(MediaStatus::EndOfMedia) => {
                self.log_event(PlaybackEventType::EndOfMedia, "Reached the end of the file".to_string());
            }
            PlayerEvent::BoostChanged(db) => {
                self.log_event(PlaybackEventType::BoostChanged, format!("Boost {:+} dB", db));
            }
            PlayerEvent::BoostUnsupported(layout) => {
                self.log_event(
                    PlaybackEventType::BoostUnsupported,
                    format!("Cannot boost {}, playing unboosted", layout),
                );
            }
            PlayerEvent::Error(message) => {
                self.log_event(PlaybackEventType::LoadError, message.replace('\n', " "));
            }
            PlayerEvent::MediaStatusChanged(status) => trace!("Media status: {}", status.as_str()),
            PlayerEvent::PositionChanged(_) | PlayerEvent::DurationChanged(_) => {}
        }
    }

    pub fn log_seek(&self, from_ms: u64, to_ms: u64) {
        self.log_event(
            PlaybackEventType::Seek,
            format!(
                "Seek from {} to {}",
                format_seconds(whole_seconds(from_ms)),
                format_seconds(whole_seconds(to_ms))
            ),
        );
    }

    /// Most recent `count` events, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        let events = self.history();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        self.history().clear();
    }

    pub fn get_event_statistics(&self) -> EventStatistics {
        let events = self.history();
        let mut stats = EventStatistics::default();

        for event in events.iter() {
            match event.event_type {
                PlaybackEventType::StateChanged => stats.state_changes += 1,
                PlaybackEventType::Seek => stats.seeks += 1,
                PlaybackEventType::BoostUnsupported => stats.boost_unsupported += 1,
                PlaybackEventType::LoadError => stats.load_errors += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }

    /// Number of WAITING periods recorded so far
    pub fn typing_pauses(&self) -> usize {
        self.history()
            .iter()
            .filter(|e| e.event_type == PlaybackEventType::StateChanged)
            .filter(|e| e.details.ends_with(PlayerState::Waiting.as_str()))
            .count()
    }
}

impl Default for PlaybackLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default)]
pub struct EventStatistics {
    pub total_events: usize,
    pub state_changes: usize,
    pub seeks: usize,
    pub boost_unsupported: usize,
    pub load_errors: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: String) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}
