use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a sample is represented in its bytes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SampleType {
    SignedInt,
    UnsignedInt,
    Float,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::SignedInt => "signed",
            SampleType::UnsignedInt => "unsigned",
            SampleType::Float => "float",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "LE",
            ByteOrder::BigEndian => "BE",
        }
    }
}

/// Layout of interleaved PCM audio
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_type: SampleType,
    pub byte_order: ByteOrder,
}

impl FormatDescriptor {
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        sample_type: SampleType,
        byte_order: ByteOrder,
    ) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            sample_type,
            byte_order,
        }
    }

    /// Codec tag; every buffer that reaches the pipeline is uncompressed.
    pub fn codec(&self) -> &'static str {
        "audio/pcm"
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize + 7) / 8
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Playback time in milliseconds spanned by `bytes` of audio
    pub fn duration_for_bytes(&self, bytes: u64) -> u64 {
        let frame = self.bytes_per_frame() as u64;
        if frame == 0 || self.sample_rate == 0 {
            return 0;
        }
        (bytes / frame) * 1000 / self.sample_rate as u64
    }

    /// Byte count covering `ms` milliseconds, rounded down to a whole frame
    pub fn bytes_for_duration(&self, ms: u64) -> u64 {
        let frames = ms * self.sample_rate as u64 / 1000;
        frames * self.bytes_per_frame() as u64
    }

    /// Get a human-readable format description
    pub fn description(&self) -> String {
        format!(
            "PCM {}-bit {} {} - {} Hz - {} channel{}",
            self.bits_per_sample,
            self.sample_type.as_str(),
            self.byte_order.as_str(),
            self.sample_rate,
            self.channels,
            if self.channels == 1 { "" } else { "s" }
        )
    }
}

/// Location of the sample data inside a container
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRegion {
    pub offset: u64,
    pub length: u64,
    pub duration_ms: u64,
}

impl DataRegion {
    pub fn new(offset: u64, length: u64, format: &FormatDescriptor) -> Self {
        Self {
            offset,
            length,
            duration_ms: format.duration_for_bytes(length),
        }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Result of parsing a WAV/AIFF header
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedHeader {
    pub format: FormatDescriptor,
    pub region: DataRegion,
}

/// One block of audio travelling from a pump to the output sink
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub format: FormatDescriptor,
    pub data: Vec<u8>,
    /// Position of the first sample, in milliseconds
    pub timestamp_ms: u64,
}

impl AudioBuffer {
    pub fn new(format: FormatDescriptor, data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            format,
            data,
            timestamp_ms,
        }
    }

    /// Number of individual samples across all channels
    pub fn sample_count(&self) -> usize {
        match self.format.bytes_per_sample() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    pub fn frame_count(&self) -> usize {
        match self.format.bytes_per_frame() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.format.duration_for_bytes(self.data.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Playback state seen by the user and the typing monitor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    /// Silenced while the user types, still logically playing
    Waiting,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Waiting => "Waiting",
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of the media behind the active pump
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaStatus {
    NoMedia,
    Loaded,
    Buffered,
    EndOfMedia,
    LoadError,
}

impl MediaStatus {
    /// Whether playback may run on top of this status
    pub fn is_ready(&self) -> bool {
        matches!(self, MediaStatus::Loaded | MediaStatus::Buffered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::NoMedia => "No media",
            MediaStatus::Loaded => "Loaded",
            MediaStatus::Buffered => "Buffered",
            MediaStatus::EndOfMedia => "End of media",
            MediaStatus::LoadError => "Load error",
        }
    }
}

/// Which buffer source feeds the pipeline for the current file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PumpMode {
    /// Raw PCM read straight from a parsed WAV/AIFF container
    Native,
    /// Buffers tapped from the decoder backend
    Intercepted,
}

impl PumpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpMode::Native => "native",
            PumpMode::Intercepted => "intercepted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Notifications published by the playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlayerState),
    MediaStatusChanged(MediaStatus),
    PositionChanged(u64),
    DurationChanged(u64),
    BoostChanged(i32),
    BoostUnsupported(String),
    Error(String),
}

/// Snapshot of the engine for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub media_status: MediaStatus,
    pub path: Option<PathBuf>,
    pub pump_mode: Option<PumpMode>,
    pub format: Option<FormatDescriptor>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub boost_db: i32,
    pub boost_active: bool,
    pub wait_timeout_ms: u64,
    pub type_timeout_ms: u64,
}

impl PlayerStatus {
    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.duration_ms > 0 {
            (self.position_ms as f32 / self.duration_ms as f32).min(1.0)
        } else {
            0.0
        }
    }

    pub fn position_formatted(&self) -> String {
        format_seconds(whole_seconds(self.position_ms))
    }

    pub fn duration_formatted(&self) -> String {
        format_seconds(whole_seconds(self.duration_ms))
    }
}

/// Milliseconds rounded to the nearest whole second
pub fn whole_seconds(ms: u64) -> u64 {
    (ms + 500) / 1000
}

/// Format seconds as MM:SS
pub fn format_seconds(total_seconds: u64) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}
