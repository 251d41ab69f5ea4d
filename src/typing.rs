/*!
Typing activity monitor.

Couples key presses to playback: while the user keeps typing for longer than
the wait timeout, playback goes to WAITING; once no key has been pressed for
the type timeout, playback resumes.

Two single-shot timers drive this:

- the *wait timer* starts on the first key typed while PLAYING and, when it
  fires, puts playback into WAITING;
- the *type timer* restarts on every key. When it fires it resumes WAITING
  playback, or restarts the wait timer while PLAYING, and then re-arms itself
  as a heartbeat until the next key.

Timers are plain deadlines; the owner of the event loop sleeps until
[`TypingActivityMonitor::next_deadline`] and calls
[`TypingActivityMonitor::poll`].
*/

use std::time::Duration;
use tokio::time::Instant;

use crate::models::PlayerState;

pub const WAIT_TIMEOUT_MIN_MS: u64 = 2000;
pub const WAIT_TIMEOUT_MAX_MS: u64 = 30000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

pub const TYPE_TIMEOUT_MIN_MS: u64 = 500;
pub const TYPE_TIMEOUT_MAX_MS: u64 = 5000;
pub const DEFAULT_TYPE_TIMEOUT_MS: u64 = 1000;

/// Minimum distance between the wait and the type timeout
pub const TIMEOUT_GAP_MS: u64 = 100;

/// Clamp a wait timeout and keep it at least [`TIMEOUT_GAP_MS`] above `type_timeout_ms`
pub fn constrain_wait_timeout(ms: u64, type_timeout_ms: u64) -> u64 {
    let ms = ms.clamp(WAIT_TIMEOUT_MIN_MS, WAIT_TIMEOUT_MAX_MS);
    if ms < type_timeout_ms + TIMEOUT_GAP_MS {
        type_timeout_ms + TIMEOUT_GAP_MS
    } else {
        ms
    }
}

/// Clamp a type timeout and keep it at least [`TIMEOUT_GAP_MS`] below `wait_timeout_ms`
pub fn constrain_type_timeout(ms: u64, wait_timeout_ms: u64) -> u64 {
    let ms = ms.clamp(TYPE_TIMEOUT_MIN_MS, TYPE_TIMEOUT_MAX_MS);
    if ms + TIMEOUT_GAP_MS > wait_timeout_ms {
        wait_timeout_ms.saturating_sub(TIMEOUT_GAP_MS)
    } else {
        ms
    }
}

/// What the monitor needs from the player it steers
pub trait PlaybackControl {
    fn state(&self) -> PlayerState;

    /// Returns the new state if it changed
    fn toggle_waiting(&mut self, wait: bool) -> Option<PlayerState>;

    fn force_pause(&mut self) -> Option<PlayerState>;
}

#[derive(Debug, Clone)]
pub struct SingleShotTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl SingleShotTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// (Re)start counting from `now`
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect on the next start
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Disarm and return the deadline if it has passed
    pub fn take_due(&mut self, now: Instant) -> Option<Instant> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(deadline)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypingActivityMonitor {
    wait_timer: SingleShotTimer,
    type_timer: SingleShotTimer,
}

impl TypingActivityMonitor {
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_WAIT_TIMEOUT_MS, DEFAULT_TYPE_TIMEOUT_MS)
    }

    /// Start from persisted timeouts, repairing them if they break the rules
    pub fn with_timeouts(wait_ms: u64, type_ms: u64) -> Self {
        let type_ms = constrain_type_timeout(type_ms, WAIT_TIMEOUT_MAX_MS);
        let wait_ms = constrain_wait_timeout(wait_ms, type_ms);
        Self::with_unchecked_timeouts(wait_ms, type_ms)
    }

    /// Use the given timeouts as they are, outside the legal ranges if need be
    pub fn with_unchecked_timeouts(wait_ms: u64, type_ms: u64) -> Self {
        Self {
            wait_timer: SingleShotTimer::new(Duration::from_millis(wait_ms)),
            type_timer: SingleShotTimer::new(Duration::from_millis(type_ms)),
        }
    }

    pub fn wait_timeout_ms(&self) -> u64 {
        self.wait_timer.interval().as_millis() as u64
    }

    pub fn type_timeout_ms(&self) -> u64 {
        self.type_timer.interval().as_millis() as u64
    }

    /// Change the wait timeout; an effective change pauses playback first.
    /// Returns the value kept.
    pub fn set_wait_timeout(&mut self, ms: u64, player: &mut impl PlaybackControl) -> u64 {
        let ms = constrain_wait_timeout(ms, self.type_timeout_ms());
        if ms != self.wait_timeout_ms() {
            if let Some(state) = player.force_pause() {
                self.state_changed(state);
            }
            self.wait_timer.set_interval(Duration::from_millis(ms));
        }
        ms
    }

    pub fn set_type_timeout(&mut self, ms: u64, player: &mut impl PlaybackControl) -> u64 {
        let ms = constrain_type_timeout(ms, self.wait_timeout_ms());
        if ms != self.type_timeout_ms() {
            if let Some(state) = player.force_pause() {
                self.state_changed(state);
            }
            self.type_timer.set_interval(Duration::from_millis(ms));
        }
        ms
    }

    pub fn key_typed(&mut self, player: &mut impl PlaybackControl, now: Instant) {
        if player.state() == PlayerState::Playing && !self.wait_timer.is_active() {
            self.wait_timer.start(now);
        }
        self.restart_type_timer(player.state(), now);
    }

    /// Fire every timer whose deadline has passed, in deadline order
    pub fn poll(&mut self, player: &mut impl PlaybackControl, now: Instant) {
        loop {
            let wait_due = self.wait_timer.deadline().filter(|d| *d <= now);
            let type_due = self.type_timer.deadline().filter(|d| *d <= now);
            match (wait_due, type_due) {
                (Some(w), Some(t)) if w <= t => self.wait_timeout(player, now),
                (Some(_), None) => self.wait_timeout(player, now),
                (_, Some(_)) => self.type_timeout(player, now),
                (None, None) => break,
            }
        }
    }

    /// Track a state change made by anyone
    pub fn state_changed(&mut self, state: PlayerState) {
        if state != PlayerState::Playing {
            self.wait_timer.stop();
        }
        if state == PlayerState::Paused {
            self.type_timer.stop();
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.wait_timer.deadline(), self.type_timer.deadline()) {
            (Some(w), Some(t)) => Some(w.min(t)),
            (w, t) => w.or(t),
        }
    }

    pub fn is_wait_timer_active(&self) -> bool {
        self.wait_timer.is_active()
    }

    pub fn is_type_timer_active(&self) -> bool {
        self.type_timer.is_active()
    }

    fn wait_timeout(&mut self, player: &mut impl PlaybackControl, now: Instant) {
        if self.wait_timer.take_due(now).is_none() {
            return;
        }
        log::debug!("Still typing, waiting");
        if let Some(state) = player.toggle_waiting(true) {
            self.state_changed(state);
        }
    }

    fn type_timeout(&mut self, player: &mut impl PlaybackControl, now: Instant) {
        // Timers restart from when they should have fired, so a late poll
        // does not stretch the schedule
        let Some(fired_at) = self.type_timer.take_due(now) else {
            return;
        };
        match player.state() {
            PlayerState::Waiting => {
                log::debug!("Typing stopped, resuming");
                if let Some(state) = player.toggle_waiting(false) {
                    self.state_changed(state);
                }
            }
            PlayerState::Playing => self.restart_wait_timer(player.state(), fired_at),
            PlayerState::Paused => {}
        }
        self.restart_type_timer(player.state(), fired_at);
    }

    fn restart_wait_timer(&mut self, state: PlayerState, at: Instant) {
        if state == PlayerState::Playing {
            self.wait_timer.start(at);
        }
    }

    fn restart_type_timer(&mut self, state: PlayerState, at: Instant) {
        if state != PlayerState::Paused {
            self.type_timer.start(at);
        }
    }
}

impl Default for TypingActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
