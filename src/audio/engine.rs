use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::audio::amplifier::Amplifier;
use crate::audio::decoder::DecoderBackend;
use crate::audio::pump::{BufferPump, NativePump, TappedPump};
use crate::audio::sink::OutputSink;
use crate::audio::state::{MediaSlot, PlaybackStateMachine};
use crate::config::{PumpPreference, TranscribeConfig, MAX_BOOST_DB};
use crate::error::PlaybackError;
use crate::models::{
    whole_seconds, AudioBuffer, MediaStatus, PlayerEvent, PlayerState, PlayerStatus, PumpMode,
    SeekDirection,
};
use crate::typing::PlaybackControl;

/// Plays one file at a time.
///
/// Owns the state machine, the active pump with its sink, and the amplifier.
/// Refills are driven from outside by calling [`refill`](Self::refill) at the
/// sink's [`refill_interval`](OutputSink::refill_interval).
pub struct PlaybackEngine {
    machine: PlaybackStateMachine,
    media: MediaSlot,
    backend: Box<dyn DecoderBackend>,
    amplifier: Amplifier,
    preference: PumpPreference,
    boost_db: i32,
    boost_step_db: i32,
    /// Cleared when the current stream cannot be boosted
    boost_enabled: bool,
    /// Tail of the last buffer the sink had no room for; written before anything new
    pending: Vec<u8>,
    path: Option<PathBuf>,
    load_failed: bool,
    error_reported: bool,
    last_status: MediaStatus,
    last_position_secs: u64,
}

impl PlaybackEngine {
    pub fn new(sink: Box<dyn OutputSink>, backend: Box<dyn DecoderBackend>) -> Self {
        Self {
            machine: PlaybackStateMachine::new(),
            media: MediaSlot::new(sink),
            backend,
            amplifier: Amplifier::new(),
            preference: PumpPreference::Auto,
            boost_db: 0,
            boost_step_db: 1,
            boost_enabled: true,
            pending: Vec::new(),
            path: None,
            load_failed: false,
            error_reported: false,
            last_status: MediaStatus::NoMedia,
            last_position_secs: 0,
        }
    }

    pub fn with_config(sink: Box<dyn OutputSink>, backend: Box<dyn DecoderBackend>, config: &TranscribeConfig) -> Self {
        let mut engine = Self::new(sink, backend);
        engine.apply_config(config);
        engine
    }

    pub fn apply_config(&mut self, config: &TranscribeConfig) {
        self.preference = config.pump_mode;
        self.boost_db = config.boost_db.clamp(-MAX_BOOST_DB, MAX_BOOST_DB);
        self.boost_step_db = config.boost_step_db.max(1);
        self.amplifier = Amplifier::with_clip_step(config.clip_reduction_step);
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<PlayerEvent> {
        self.machine.subscribe()
    }

    pub fn state(&self) -> PlayerState {
        self.machine.state()
    }

    pub fn media_status(&self) -> MediaStatus {
        match &self.media.pump {
            Some(pump) => pump.status(),
            None if self.load_failed => MediaStatus::LoadError,
            None => MediaStatus::NoMedia,
        }
    }

    pub fn pump_mode(&self) -> Option<PumpMode> {
        self.media.pump.as_ref().map(|p| p.mode())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sink(&self) -> &dyn OutputSink {
        self.media.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> &mut dyn OutputSink {
        self.media.sink.as_mut()
    }

    /// Load `path`, replacing whatever was playing. Playback starts PAUSED.
    pub fn open(&mut self, path: &Path) -> Result<PumpMode, PlaybackError> {
        self.close();
        self.path = Some(path.to_path_buf());
        self.error_reported = false;
        self.load_failed = false;
        self.boost_enabled = true;

        let pump = match self.create_pump(path) {
            Ok(pump) => pump,
            Err(e) => {
                self.fail_load(&e);
                return Err(e);
            }
        };

        if let Some(format) = pump.format() {
            if let Err(e) = self.media.sink.configure(&format) {
                let e = PlaybackError::LoadError {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                self.fail_load(&e);
                return Err(e);
            }
        }

        let mode = pump.mode();
        let duration_ms = pump.duration_ms();
        log::info!("Opened {} ({} mode, {} ms)", path.display(), mode.as_str(), duration_ms);
        self.media.pump = Some(pump);

        self.machine.emit(PlayerEvent::DurationChanged(duration_ms));
        self.publish_status();
        self.machine.emit(PlayerEvent::PositionChanged(0));
        Ok(mode)
    }

    /// Stop playback and drop the current file
    pub fn close(&mut self) {
        self.machine.force_pause(&mut self.media);
        if self.media.pump.take().is_some() {
            log::debug!("Closed {:?}", self.path);
        }
        self.media.sink.suspend();
        self.media.sink.reset();
        self.pending.clear();
        self.path = None;
        self.last_position_secs = 0;
        self.publish_status();
    }

    fn create_pump(&self, path: &Path) -> Result<Box<dyn BufferPump>, PlaybackError> {
        let native = match self.preference {
            PumpPreference::Native => true,
            PumpPreference::Intercepted => false,
            PumpPreference::Auto => !self.backend.tap_available(),
        };

        if native {
            match NativePump::open(path) {
                Ok(pump) => return Ok(Box::new(pump)),
                Err(e) => log::info!("{} cannot be read natively ({}), using the decoder", path.display(), e),
            }
        }

        let decoder = self.backend.open(path)?;
        Ok(Box::new(TappedPump::new(decoder)))
    }

    fn fail_load(&mut self, error: &PlaybackError) {
        log::warn!("{}", error);
        self.load_failed = true;
        self.machine.force_pause(&mut self.media);
        self.report(error);
        self.publish_status();
    }

    /// The first failure after an `open` reaches subscribers, later ones are only logged
    fn report(&mut self, error: &PlaybackError) {
        if self.error_reported {
            log::debug!("Already reported a failure for this file: {}", error);
            return;
        }
        self.error_reported = true;
        self.machine.emit(PlayerEvent::Error(error.user_message()));
    }

    fn publish_status(&mut self) {
        let status = self.media_status();
        if status != self.last_status {
            self.last_status = status;
            self.machine.emit(PlayerEvent::MediaStatusChanged(status));
        }
    }

    /// Move buffers from the pump to the sink while it has room. Returns the
    /// new state if the stream ended or failed along the way.
    pub fn refill(&mut self) -> Option<PlayerState> {
        if self.machine.state() != PlayerState::Playing {
            return None;
        }

        while self.flush_pending() {
            let Some(pump) = self.media.pump.as_mut() else {
                break;
            };
            let Some(buffer) = pump.next_buffer(self.media.sink.as_ref()) else {
                break;
            };
            if !self.deliver(buffer) {
                break;
            }
        }

        let changed = self.check_status();
        self.publish_position();
        changed
    }

    /// Write what an earlier refill held back; true once nothing is left
    fn flush_pending(&mut self) -> bool {
        if !self.pending.is_empty() {
            let written = self.media.sink.write(&self.pending);
            self.pending.drain(..written);
        }
        self.pending.is_empty()
    }

    /// Boost and queue one buffer; false when the sink could not take all of it
    fn deliver(&mut self, buffer: AudioBuffer) -> bool {
        if self.media.sink.format() != Some(buffer.format) {
            if let Err(e) = self.media.sink.configure(&buffer.format) {
                let e = PlaybackError::LoadError {
                    path: self.path_string(),
                    reason: e.to_string(),
                };
                self.report(&e);
                self.machine.force_pause(&mut self.media);
                return false;
            }
        }

        let level = if self.boost_enabled { self.boost_db } else { 0 };
        let bytes: &[u8] = match self.amplifier.boost(&buffer, level) {
            Ok(Some(boosted)) => boosted,
            Ok(None) => &buffer.data,
            Err(e) => {
                log::warn!("{}; playing unboosted", e);
                self.boost_enabled = false;
                if let PlaybackError::BoostUnsupported { layout } = &e {
                    self.machine.emit(PlayerEvent::BoostUnsupported(layout.clone()));
                }
                &buffer.data
            }
        };

        let written = self.media.sink.write(bytes);
        if written < bytes.len() {
            log::trace!("Sink took {} of {} bytes, holding back the rest", written, bytes.len());
            self.pending.extend_from_slice(&bytes[written..]);
            return false;
        }
        true
    }

    fn check_status(&mut self) -> Option<PlayerState> {
        self.publish_status();
        match self.media_status() {
            // the stream is over once its last bytes reached the sink
            MediaStatus::EndOfMedia if self.pending.is_empty() => self.machine.force_pause(&mut self.media),
            MediaStatus::LoadError => {
                let reason = self
                    .media
                    .pump
                    .as_ref()
                    .and_then(|p| p.error_string())
                    .unwrap_or_else(|| "decoding failed".to_string());
                let e = PlaybackError::LoadError {
                    path: self.path_string(),
                    reason,
                };
                self.report(&e);
                self.machine.force_pause(&mut self.media)
            }
            _ => None,
        }
    }

    fn publish_position(&mut self) {
        let position_ms = self.position_ms();
        let secs = whole_seconds(position_ms);
        if secs != self.last_position_secs {
            self.last_position_secs = secs;
            self.machine.emit(PlayerEvent::PositionChanged(position_ms));
        }
    }

    fn path_string(&self) -> String {
        self.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
    }

    /// Start filling the sink right away when playback (re)starts
    fn settle(&mut self, changed: Option<PlayerState>) -> Option<PlayerState> {
        if changed == Some(PlayerState::Playing) {
            return self.refill().or(changed);
        }
        changed
    }

    pub fn toggle_play_pause(&mut self, play: bool) -> Option<PlayerState> {
        let changed = self.machine.toggle_play_pause(play, &mut self.media);
        self.settle(changed)
    }

    /// PAUSED goes to PLAYING, anything else to PAUSED
    pub fn toggle(&mut self) -> Option<PlayerState> {
        let play = self.machine.state() == PlayerState::Paused;
        self.toggle_play_pause(play)
    }

    pub fn seek(&mut self, position_ms: u64) -> u64 {
        let Some(pump) = self.media.pump.as_mut() else {
            return 0;
        };
        let target = pump.seek(position_ms);
        self.media.sink.reset();
        self.pending.clear();
        log::debug!("Seek to {} ms", target);

        self.last_position_secs = whole_seconds(target);
        self.machine.emit(PlayerEvent::PositionChanged(target));
        self.publish_status();
        target
    }

    /// Jump `seconds` forward or back, staying inside the file
    pub fn skip(&mut self, direction: SeekDirection, seconds: u64) -> u64 {
        let position = self.position_ms();
        let target = match direction {
            SeekDirection::Forward => position.saturating_add(seconds * 1000).min(self.duration_ms()),
            SeekDirection::Backward => position.saturating_sub(seconds * 1000),
        };
        self.seek(target)
    }

    /// Jump to an absolute second; negative values mean the start
    pub fn set_position_secs(&mut self, seconds: i64) -> u64 {
        let ms = (seconds.max(0) as u64).saturating_mul(1000).min(self.duration_ms());
        self.seek(ms)
    }

    pub fn duration_ms(&self) -> u64 {
        self.media.pump.as_ref().map(|p| p.duration_ms()).unwrap_or(0)
    }

    /// Audible position: what the pump produced minus what the sink still holds
    /// and what is waiting to be written
    pub fn position_ms(&self) -> u64 {
        let held_back = match self.media.sink.format() {
            Some(format) => format.duration_for_bytes(self.pending.len() as u64),
            None => 0,
        };
        match &self.media.pump {
            Some(pump) => pump
                .position_ms()
                .saturating_sub(self.media.sink.latency_ms() + held_back),
            None => 0,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        whole_seconds(self.duration_ms())
    }

    pub fn position_secs(&self) -> u64 {
        whole_seconds(self.position_ms())
    }

    pub fn boost_db(&self) -> i32 {
        self.boost_db
    }

    /// Whether boosting applies to the current stream
    pub fn boost_active(&self) -> bool {
        self.boost_enabled && self.boost_db != 0
    }

    /// Kept within ±[`MAX_BOOST_DB`]
    pub fn set_boost_db(&mut self, db: i32) -> i32 {
        let db = db.clamp(-MAX_BOOST_DB, MAX_BOOST_DB);
        if db != self.boost_db {
            self.boost_db = db;
            log::info!("Boost set to {} dB", db);
            self.machine.emit(PlayerEvent::BoostChanged(db));
        }
        self.boost_db
    }

    pub fn boost_up(&mut self) -> i32 {
        self.set_boost_db(self.boost_db.saturating_add(self.boost_step_db))
    }

    pub fn boost_down(&mut self) -> i32 {
        self.set_boost_db(self.boost_db.saturating_sub(self.boost_step_db))
    }

    /// Snapshot for display; the typing timeouts are filled in by the session
    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            state: self.state(),
            media_status: self.media_status(),
            path: self.path.clone(),
            pump_mode: self.pump_mode(),
            format: self.media.pump.as_ref().and_then(|p| p.format()),
            position_ms: self.position_ms(),
            duration_ms: self.duration_ms(),
            boost_db: self.boost_db,
            boost_active: self.boost_active(),
            wait_timeout_ms: 0,
            type_timeout_ms: 0,
        }
    }
}

impl PlaybackControl for PlaybackEngine {
    fn state(&self) -> PlayerState {
        self.machine.state()
    }

    fn toggle_waiting(&mut self, wait: bool) -> Option<PlayerState> {
        let changed = self.machine.toggle_waiting(wait, &mut self.media);
        self.settle(changed)
    }

    fn force_pause(&mut self) -> Option<PlayerState> {
        self.machine.force_pause(&mut self.media)
    }
}
