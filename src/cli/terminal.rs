/*!
Raw-mode keyboard input for interactive sessions.

Every key press reaches the session as it happens, so the typing monitor sees
real keystrokes instead of whole lines. Printable keys are also collected into
a line: Enter turns a line starting with ':' into a command and anything else
into transcript text. Keys typed into a command line are not typing activity.
*/

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MediaKeyCode};
use crossterm::terminal;
use tokio::sync::mpsc::UnboundedSender;

use crate::cli::{CliApp, CommandError, StatusDisplay};
use crate::session::{Key, KeyAction, KeyInput, Modifiers, SessionInput};

/// How long a read blocks before the reader looks at the shutdown flag again
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Erase the character left of the cursor
const ERASE: &str = "\x08 \x08";

/// What a terminal key event means to the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKey {
    Input(KeyInput),
    /// Ctrl+C or Ctrl+D; raw mode swallows the signal, so the reader ends the session
    Interrupt,
}

/// Map a crossterm key event; releases are ignored
pub fn translate(event: &KeyEvent) -> Option<TerminalKey> {
    if !matches!(event.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
        return None;
    }

    let modifiers = Modifiers {
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
    };
    let key = match event.code {
        KeyCode::Char('c') | KeyCode::Char('d') if modifiers.ctrl => return Some(TerminalKey::Interrupt),
        KeyCode::Char(' ') => Key::Space,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Media(media) => match media {
            MediaKeyCode::Play => Key::MediaPlay,
            MediaKeyCode::PlayPause => Key::MediaPlayPause,
            MediaKeyCode::Pause => Key::MediaPause,
            MediaKeyCode::Stop => Key::MediaStop,
            MediaKeyCode::TrackNext => Key::MediaNext,
            MediaKeyCode::TrackPrevious => Key::MediaPrevious,
            _ => Key::Other,
        },
        _ => Key::Other,
    };
    Some(TerminalKey::Input(KeyInput { key, modifiers }))
}

/// Outcome of feeding one key to a [`LineEditor`]
#[derive(Debug, Default, PartialEq)]
pub struct Edit {
    /// Inputs for the session, in order
    pub inputs: Vec<SessionInput>,
    /// Text to echo to the terminal
    pub echo: String,
}

/// Line being typed in raw mode
#[derive(Debug, Default)]
pub struct LineEditor {
    line: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    fn in_command(&self) -> bool {
        self.line.trim_start().starts_with(':')
    }

    /// Feed one key press. A rejected command line is cleared and its error returned.
    pub fn feed(&mut self, key: KeyInput) -> Result<Edit, CommandError> {
        let mut edit = Edit::default();
        if key.action() != KeyAction::Typing {
            edit.inputs.push(SessionInput::Key(key));
            return Ok(edit);
        }

        let plain = !key.modifiers.ctrl && !key.modifiers.alt;
        let typed = match key.key {
            Key::Enter => {
                let line = std::mem::take(&mut self.line);
                edit.echo.push_str("\r\n");
                edit.inputs.push(CliApp::parse_input(&line)?);
                return Ok(edit);
            }
            Key::Backspace => {
                let typing = !self.in_command();
                if self.line.pop().is_some() {
                    edit.echo.push_str(ERASE);
                }
                typing
            }
            Key::Char(c) if plain => self.push(c, &mut edit),
            Key::Space if plain => self.push(' ', &mut edit),
            _ => !self.in_command(),
        };

        if typed {
            edit.inputs.push(SessionInput::Key(key));
        }
        Ok(edit)
    }

    fn push(&mut self, c: char, edit: &mut Edit) -> bool {
        self.line.push(c);
        edit.echo.push(c);
        !self.in_command()
    }
}

/// Keeps the terminal in raw mode until dropped
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("Cannot restore the terminal: {}", e);
        }
    }
}

/// Read key events on a thread of their own until the session goes away or
/// the user interrupts. Expects the terminal to be in raw mode.
pub fn spawn_key_reader(tx: UnboundedSender<SessionInput>, shutdown: Arc<AtomicBool>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("key-reader".to_string())
        .spawn(move || {
            if let Err(e) = read_keys(&tx, &shutdown) {
                log::warn!("Keyboard input failed: {}", e);
                shutdown.store(true, Ordering::Relaxed);
            }
        })
}

fn read_keys(tx: &UnboundedSender<SessionInput>, shutdown: &AtomicBool) -> io::Result<()> {
    let mut editor = LineEditor::new();
    let mut stdout = io::stdout();

    while !shutdown.load(Ordering::Relaxed) {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        let key = match translate(&key_event) {
            Some(TerminalKey::Input(key)) => key,
            Some(TerminalKey::Interrupt) => {
                log::info!("Interrupted from the keyboard");
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
            None => continue,
        };

        match editor.feed(key) {
            Ok(edit) => {
                if !edit.echo.is_empty() {
                    write!(stdout, "{}", edit.echo)?;
                    stdout.flush()?;
                }
                for input in edit.inputs {
                    if tx.send(input).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                write!(stdout, "\r\n")?;
                StatusDisplay::display_input_error(&e);
            }
        }
    }
    Ok(())
}
