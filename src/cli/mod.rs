use crate::config::PumpPreference;
use crate::session::{Command, SessionInput};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub mod terminal;
pub use status::StatusDisplay;

/// Transcription player: playback pauses while you type and resumes when you stop
#[derive(Debug, Parser)]
#[command(name = "transcribe")]
#[command(about = "Audio player for transcription that waits while you type")]
#[command(version = "0.1.0")]
pub struct CliApp {
    /// Log at info level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open a file and start an interactive transcription session
    Play {
        /// Audio file to transcribe
        file: PathBuf,
        /// Append typed lines to this file
        #[arg(short, long)]
        transcript: Option<PathBuf>,
        /// Read WAV/AIFF samples directly instead of tapping the decoder
        #[arg(long)]
        native: bool,
        /// Output device name
        #[arg(long)]
        device: Option<String>,
    },
    /// Show the container header of a WAV or AIFF file
    Info {
        file: PathBuf,
    },
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List audio output devices
    Devices,
}

/// Configuration subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Typing time (ms) before playback waits
    SetWait { ms: u64 },
    /// Idle time (ms) after the last key before playback resumes
    SetType { ms: u64 },
    /// Boost level in dB
    SetBoost {
        #[arg(allow_hyphen_values = true)]
        db: i32,
    },
    /// How samples are read: auto, native (WAV/AIFF only) or intercepted
    SetMode {
        #[arg(value_enum)]
        mode: PumpPreference,
    },
    /// Output device by name; leave out to use the system default
    SetDevice { name: Option<String> },
    /// Seconds skipped by forward/back
    SetSeek { secs: u64 },
    /// Restore the defaults
    Reset,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Log level requested by the flags, if any
    pub fn log_level(&self) -> Option<&'static str> {
        if self.debug {
            Some("debug")
        } else if self.verbose {
            Some("info")
        } else {
            None
        }
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(rest)
            } else {
                PathBuf::from(path)
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Turn one line of interactive input into session input. Lines starting
    /// with ':' are commands; everything else is transcript text.
    pub fn parse_input(line: &str) -> Result<SessionInput, CommandError> {
        match line.trim_start().strip_prefix(':') {
            Some(command) => Self::parse_command(command).map(SessionInput::Command),
            None => Ok(SessionInput::Text(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    }

    /// Parse a command without its leading ':'
    pub fn parse_command(input: &str) -> Result<Command, CommandError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        if args.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        match args[0] {
            "play" => Ok(Command::Play),
            "pause" => Ok(Command::Pause),
            "toggle" => Ok(Command::Toggle),
            "fwd" | "forward" => Ok(Command::Forward),
            "back" => Ok(Command::Back),
            "up" => Ok(Command::BoostUp),
            "down" => Ok(Command::BoostDown),
            "wait" => Self::millis_argument(&args, "wait").map(Command::SetWait),
            "type" => Self::millis_argument(&args, "type").map(Command::SetType),
            "seek" => match args.get(1) {
                Some(time) => Ok(Command::SeekTo(Self::parse_time(time)?.as_secs())),
                None => Err(CommandError::MissingArgument {
                    command: "seek".to_string(),
                    argument: "position".to_string(),
                }),
            },
            "status" => Ok(Command::Status),
            "help" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            _ => Err(CommandError::UnknownCommand {
                command: args[0].to_string(),
            }),
        }
    }

    fn millis_argument(args: &[&str], command: &str) -> Result<u64, CommandError> {
        let value = args.get(1).ok_or_else(|| CommandError::MissingArgument {
            command: command.to_string(),
            argument: "milliseconds".to_string(),
        })?;
        value.parse::<u64>().map_err(|_| CommandError::InvalidArgument {
            argument: "milliseconds".to_string(),
            value: value.to_string(),
            expected: "a whole number of milliseconds".to_string(),
        })
    }

    /// Parse "1:30", "90" or "90s"
    pub fn parse_time(time_str: &str) -> Result<Duration, CommandError> {
        let trimmed = time_str.trim();
        let invalid = || CommandError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        if let Some((minutes, seconds)) = trimmed.split_once(':') {
            let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            Ok(Duration::from_secs_f64(minutes as f64 * 60.0 + seconds))
        } else {
            let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;
            if seconds < 0.0 || !seconds.is_finite() {
                return Err(invalid());
            }
            Ok(Duration::from_secs_f64(seconds))
        }
    }
}

/// Interactive command errors
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },
}
