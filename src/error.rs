use thiserror::Error;

/// Top-level error for the transcription engine and its CLI
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("Container error: {0}")]
    Parse(#[from] ParseError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command error: {0}")]
    Command(#[from] crate::cli::CommandError),
}

impl TranscribeError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            TranscribeError::Parse(err) => err.user_message(),
            TranscribeError::Playback(err) => err.user_message(),
            TranscribeError::File(err) => Self::format_file_error(err),
            TranscribeError::Config(err) => err.user_message(),
            TranscribeError::Command(err) => format!("Command error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            TranscribeError::Parse(err) => err.recovery_suggestions(),
            TranscribeError::Playback(err) => err.recovery_suggestions(),
            TranscribeError::File(err) => Self::file_error_suggestions(err),
            TranscribeError::Config(err) => err.recovery_suggestions(),
            TranscribeError::Command(_) => vec!["Type ':help' to see available commands".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            TranscribeError::Parse(err) => err.is_recoverable(),
            TranscribeError::Playback(err) => err.is_recoverable(),
            TranscribeError::File(_) => false,
            TranscribeError::Config(err) => err.is_recoverable(),
            TranscribeError::Command(_) => false,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // A container we can't read natively is handed to the decoder backend.
            TranscribeError::Parse(_) => ErrorSeverity::Info,
            TranscribeError::Playback(PlaybackError::BoostUnsupported { .. }) => ErrorSeverity::Warning,
            TranscribeError::Playback(PlaybackError::NoMedia) => ErrorSeverity::Info,
            TranscribeError::Playback(PlaybackError::DeviceNotFound { .. }) => ErrorSeverity::Critical,
            TranscribeError::Playback(_) => ErrorSeverity::Error,
            TranscribeError::File(_) => ErrorSeverity::Error,
            TranscribeError::Config(_) => ErrorSeverity::Warning,
            TranscribeError::Command(_) => ErrorSeverity::Info,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated".to_string(),
            _ => format!("File system error: {}", err),
        }
    }

    fn file_error_suggestions(err: &std::io::Error) -> Vec<String> {
        match err.kind() {
            std::io::ErrorKind::NotFound => vec![
                "Check that the file path is correct".to_string(),
                "Try using an absolute path instead of a relative one".to_string(),
            ],
            std::io::ErrorKind::PermissionDenied => vec![
                "Check file permissions".to_string(),
                "Ensure the file is not locked by another application".to_string(),
            ],
            _ => vec!["Try the operation again".to_string()],
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// WAV/AIFF container parsing errors.
///
/// Every variant is recoverable: the engine hands the file to the decoder
/// backend instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Not a WAV or AIFF container")]
    NotAContainer,

    #[error("Declared container size {declared} does not match file size {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("Chunk not found: '{chunk}'")]
    ChunkNotFound { chunk: String },

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Header is truncated")]
    Truncated,

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ParseError::Truncated
        } else {
            ParseError::Io(err)
        }
    }
}

impl ParseError {
    pub fn user_message(&self) -> String {
        match self {
            ParseError::NotAContainer => "File is not a WAV or AIFF container".to_string(),
            ParseError::SizeMismatch { .. } => {
                "Container header does not match the file size".to_string()
            }
            ParseError::ChunkNotFound { chunk } => {
                format!("Container is missing its '{}' chunk", chunk.trim())
            }
            ParseError::UnsupportedEncoding(what) => {
                format!("Sample encoding is not plain 8/16-bit PCM: {}", what)
            }
            ParseError::Truncated => "Container header ends prematurely".to_string(),
            ParseError::Io(err) => format!("Cannot read container header: {}", err),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ParseError::Io(_) => vec![
                "Check that the file is readable".to_string(),
            ],
            _ => vec![
                "The file will be played through the decoder backend instead".to_string(),
                "Re-export the file as 16-bit PCM WAV for native playback".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Playback pipeline errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Cannot load '{path}': {reason}")]
    LoadError { path: String, reason: String },

    #[error("Boost unsupported for {layout}")]
    BoostUnsupported { layout: String },

    #[error("Output error: {0}")]
    Output(String),

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("No media loaded")]
    NoMedia,
}

impl PlaybackError {
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::LoadError { reason, .. } => {
                format!("The audio file can't be loaded.\n{}", reason)
            }
            PlaybackError::BoostUnsupported { layout } => {
                format!("Volume boost is not available for {} audio", layout)
            }
            PlaybackError::Output(msg) => format!("Audio output failed: {}", msg),
            PlaybackError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available", device)
            }
            PlaybackError::NoMedia => "Open an audio file first".to_string(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlaybackError::LoadError { .. } => vec![
                "Check that the file exists and is an audio file".to_string(),
                "Try converting the file to WAV".to_string(),
            ],
            PlaybackError::BoostUnsupported { .. } => vec![
                "Playback continues without boost".to_string(),
                "Convert the file to 16-bit PCM to enable boosting".to_string(),
            ],
            PlaybackError::Output(_) => vec![
                "Check audio device connections".to_string(),
                "Close other applications holding the device".to_string(),
            ],
            PlaybackError::DeviceNotFound { .. } => vec![
                "Run 'transcribe devices' to list available outputs".to_string(),
                "Clear 'output_device' in the configuration to use the default".to_string(),
            ],
            PlaybackError::NoMedia => vec!["Start a session with 'transcribe play <file>'".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            PlaybackError::LoadError { .. } => true,
            PlaybackError::BoostUnsupported { .. } => true,
            PlaybackError::Output(_) => true,
            PlaybackError::DeviceNotFound { .. } => false,
            PlaybackError::NoMedia => true,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/transcribe/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Try resetting configuration with 'transcribe config reset'".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true
    }
}
