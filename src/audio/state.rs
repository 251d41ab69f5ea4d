use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::audio::pump::BufferPump;
use crate::audio::sink::OutputSink;
use crate::models::{MediaStatus, PlayerEvent, PlayerState};

/// The active pump and the sink it feeds
pub struct MediaSlot {
    pub pump: Option<Box<dyn BufferPump>>,
    pub sink: Box<dyn OutputSink>,
}

impl MediaSlot {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self { pump: None, sink }
    }

    pub fn status(&self) -> MediaStatus {
        self.pump.as_ref().map(|p| p.status()).unwrap_or(MediaStatus::NoMedia)
    }
}

/// Owner of the PLAYING/PAUSED/WAITING state.
///
/// Every change goes through [`transition`](Self::transition), which applies
/// the pump side effects and notifies subscribers only when the state really
/// changed.
pub struct PlaybackStateMachine {
    state: PlayerState,
    subscribers: Vec<UnboundedSender<PlayerEvent>>,
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlayerState::Paused,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<PlayerEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Send an event to every live subscriber
    pub fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// `true`: PAUSED to PLAYING. `false`: PLAYING or WAITING to PAUSED.
    pub fn toggle_play_pause(&mut self, play: bool, media: &mut MediaSlot) -> Option<PlayerState> {
        match (play, self.state) {
            (true, PlayerState::Paused) => self.transition(PlayerState::Playing, media),
            (false, PlayerState::Playing | PlayerState::Waiting) => self.transition(PlayerState::Paused, media),
            _ => None,
        }
    }

    /// `true`: PLAYING to WAITING. `false`: WAITING to PLAYING.
    pub fn toggle_waiting(&mut self, wait: bool, media: &mut MediaSlot) -> Option<PlayerState> {
        match (wait, self.state) {
            (true, PlayerState::Playing) => self.transition(PlayerState::Waiting, media),
            (false, PlayerState::Waiting) => self.transition(PlayerState::Playing, media),
            _ => None,
        }
    }

    /// Go to PAUSED from anywhere, e.g. at the end of the stream
    pub fn force_pause(&mut self, media: &mut MediaSlot) -> Option<PlayerState> {
        self.transition(PlayerState::Paused, media)
    }

    /// Apply `target`, downgraded to PAUSED when no media is ready
    pub fn transition(&mut self, target: PlayerState, media: &mut MediaSlot) -> Option<PlayerState> {
        let status = media.status();
        let target = if target != PlayerState::Paused && !status.is_ready() {
            log::debug!("Media is {}, staying paused", status.as_str());
            PlayerState::Paused
        } else {
            target
        };

        if target == self.state {
            return None;
        }

        if let Some(pump) = media.pump.as_mut() {
            match target {
                PlayerState::Playing => pump.play(media.sink.as_mut()),
                PlayerState::Waiting => pump.pause(media.sink.as_mut()),
                // Pausing a finished stream would rewind it
                PlayerState::Paused if status == MediaStatus::EndOfMedia => {}
                PlayerState::Paused => pump.pause(media.sink.as_mut()),
            }
        }

        log::debug!("Playback state {} -> {}", self.state, target);
        self.state = target;
        self.emit(PlayerEvent::StateChanged(target));
        Some(target)
    }
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pump::TappedPump;
    use crate::audio::testing::{cd_mono, DecoderCalls, MemorySink, ScriptedDecoder};
    use crate::models::AudioBuffer;
    use std::sync::{Arc, Mutex};

    fn loaded_media() -> (MediaSlot, Arc<Mutex<DecoderCalls>>) {
        let buffers = vec![AudioBuffer::new(cd_mono(), vec![0u8; 882], 0)];
        let (decoder, calls) = ScriptedDecoder::new(buffers, 10);
        let mut media = MediaSlot::new(Box::new(MemorySink::new(8820, 882)));
        media.pump = Some(Box::new(TappedPump::new(Box::new(decoder))));
        (media, calls)
    }

    fn state_events(rx: &mut UnboundedReceiver<PlayerEvent>) -> Vec<PlayerState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PlayerEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        states
    }

    #[test]
    fn test_starts_paused() {
        assert_eq!(PlaybackStateMachine::new().state(), PlayerState::Paused);
    }

    #[test]
    fn test_waiting_from_paused_is_a_no_op() {
        let (mut media, _) = loaded_media();
        let mut machine = PlaybackStateMachine::new();
        let mut rx = machine.subscribe();

        assert_eq!(machine.toggle_waiting(true, &mut media), None);
        assert_eq!(machine.state(), PlayerState::Paused);
        assert!(state_events(&mut rx).is_empty());
    }

    #[test]
    fn test_wait_then_pause_emits_two_events() {
        let (mut media, _) = loaded_media();
        let mut machine = PlaybackStateMachine::new();
        machine.toggle_play_pause(true, &mut media);
        let mut rx = machine.subscribe();

        machine.toggle_waiting(true, &mut media);
        machine.toggle_play_pause(false, &mut media);

        assert_eq!(machine.state(), PlayerState::Paused);
        assert_eq!(state_events(&mut rx), vec![PlayerState::Waiting, PlayerState::Paused]);
    }

    #[test]
    fn test_transition_table() {
        let (mut media, _) = loaded_media();
        let mut machine = PlaybackStateMachine::new();
        let mut rx = machine.subscribe();
        let mut count = 0;
        let mut step = |machine: &mut PlaybackStateMachine, expected_state, expected_count| {
            count += state_events(&mut rx).len();
            assert_eq!(machine.state(), expected_state);
            assert_eq!(count, expected_count);
        };

        machine.toggle_play_pause(true, &mut media);
        step(&mut machine, PlayerState::Playing, 1);
        machine.toggle_play_pause(true, &mut media);
        step(&mut machine, PlayerState::Playing, 1);
        machine.toggle_waiting(true, &mut media);
        step(&mut machine, PlayerState::Waiting, 2);
        machine.toggle_waiting(true, &mut media);
        step(&mut machine, PlayerState::Waiting, 2);
        machine.toggle_waiting(false, &mut media);
        step(&mut machine, PlayerState::Playing, 3);
        machine.toggle_play_pause(false, &mut media);
        step(&mut machine, PlayerState::Paused, 4);
        machine.toggle_play_pause(false, &mut media);
        step(&mut machine, PlayerState::Paused, 4);
        machine.toggle_waiting(true, &mut media);
        step(&mut machine, PlayerState::Paused, 4);
        machine.toggle_play_pause(true, &mut media);
        machine.toggle_waiting(true, &mut media);
        step(&mut machine, PlayerState::Waiting, 6);
        machine.toggle_play_pause(false, &mut media);
        step(&mut machine, PlayerState::Paused, 7);
    }

    #[test]
    fn test_side_effects_reach_the_pump() {
        let (mut media, calls) = loaded_media();
        let mut machine = PlaybackStateMachine::new();

        machine.toggle_play_pause(true, &mut media);
        assert!(calls.lock().unwrap().playing);
        machine.toggle_waiting(true, &mut media);
        assert!(!calls.lock().unwrap().playing);
        machine.toggle_waiting(false, &mut media);
        assert!(calls.lock().unwrap().playing);
        machine.toggle_play_pause(false, &mut media);
        let calls = calls.lock().unwrap();
        assert!(!calls.playing);
        assert_eq!((calls.play_calls, calls.pause_calls), (2, 2));
    }

    #[test]
    fn test_cannot_play_without_media() {
        let mut media = MediaSlot::new(Box::new(MemorySink::new(100, 10)));
        let mut machine = PlaybackStateMachine::new();
        let mut rx = machine.subscribe();

        assert_eq!(machine.toggle_play_pause(true, &mut media), None);
        assert_eq!(machine.state(), PlayerState::Paused);
        assert!(state_events(&mut rx).is_empty());
    }

    #[test]
    fn test_end_of_media_forces_pause_without_pausing_pump() {
        let (mut media, calls) = loaded_media();
        let mut machine = PlaybackStateMachine::new();
        machine.toggle_play_pause(true, &mut media);

        // play out the single buffer, then hit the end
        let pump = media.pump.as_mut().unwrap();
        while pump.next_buffer(media.sink.as_ref()).is_some() {}
        assert_eq!(media.status(), MediaStatus::EndOfMedia);

        assert_eq!(machine.force_pause(&mut media), Some(PlayerState::Paused));
        assert_eq!(calls.lock().unwrap().pause_calls, 0);

        // a finished stream cannot be resumed without seeking
        assert_eq!(machine.toggle_play_pause(true, &mut media), None);
    }
}
