use std::path::Path;

use crate::audio::DeviceInfo;
use crate::cli::CommandError;
use crate::config::TranscribeConfig;
use crate::error::{ErrorSeverity, TranscribeError};
use crate::models::{format_seconds, whole_seconds, ParsedHeader, PlayerState, PlayerStatus};

// Raw terminal mode does not turn "\n" into a line break, so lines end in "\r\n"
macro_rules! term_println {
    () => {
        print!("\r\n")
    };
    ($($arg:tt)*) => {
        print!("{}\r\n", format_args!($($arg)*))
    };
}

macro_rules! term_eprintln {
    ($($arg:tt)*) => {
        eprint!("{}\r\n", format_args!($($arg)*))
    };
}

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display the full session status
    pub fn display_full_status(status: &PlayerStatus) {
        term_println!("┌─ Transcription Status ──────────────────────────────────┐");

        match &status.path {
            Some(path) => {
                term_println!("│ File: {}", Self::truncate(&path.display().to_string(), 50));
                Self::display_playback_info(status);
                if let Some(format) = &status.format {
                    term_println!("│ Format: {}", format.description());
                }
                if let Some(mode) = status.pump_mode {
                    term_println!("│ Buffers: {}", mode.as_str());
                }
            }
            None => {
                term_println!("│ No file loaded");
                term_println!("│ Status: {}", status.media_status.as_str());
            }
        }

        term_println!("│");
        term_println!(
            "│ Boost: {:+} dB{}",
            status.boost_db,
            if status.boost_db != 0 && !status.boost_active { " (unavailable for this file)" } else { "" }
        );
        term_println!(
            "│ Wait after {} ms of typing, resume after {} ms idle",
            status.wait_timeout_ms, status.type_timeout_ms
        );
        term_println!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_playback_info(status: &PlayerStatus) {
        term_println!("│");
        term_println!("│ Status: {} ({})", Self::format_state(status.state), status.media_status.as_str());
        term_println!("│ Position: {} / {}", status.position_formatted(), status.duration_formatted());

        let progress = status.progress();
        term_println!(
            "│ Progress: [{}] {:.1}%",
            Self::create_progress_bar(progress, 40),
            progress * 100.0
        );

        let remaining = whole_seconds(status.duration_ms.saturating_sub(status.position_ms));
        term_println!("│ Remaining: {}", format_seconds(remaining));
    }

    /// One-line status
    pub fn display_compact_status(status: &PlayerStatus) {
        term_println!("{}", Self::compact_line(status));
    }

    pub fn compact_line(status: &PlayerStatus) -> String {
        match &status.path {
            Some(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                format!(
                    "{} | {} | {}/{} | {:+} dB",
                    Self::format_state(status.state),
                    Self::truncate(&name, 30),
                    status.position_formatted(),
                    status.duration_formatted(),
                    status.boost_db
                )
            }
            None => format!("{} | No file loaded", Self::format_state(status.state)),
        }
    }

    /// Display the parsed container header of `path`
    pub fn display_header(path: &Path, header: &ParsedHeader) {
        let format = &header.format;
        term_println!("┌─ Container ─────────────────────────────────────────────┐");
        term_println!("│ File: {}", Self::truncate(&path.display().to_string(), 50));
        term_println!("│ Codec: {}", format.codec());
        term_println!("│ Sample Rate: {} Hz", format.sample_rate);
        term_println!("│ Bit Depth: {}-bit {} {}", format.bits_per_sample, format.sample_type.as_str(), format.byte_order.as_str());
        term_println!("│ Channels: {} ({})", format.channels, Self::channel_description(format.channels));
        term_println!("│ Data: {} bytes at offset {}", header.region.length, header.region.offset);
        term_println!("│ Duration: {}", format_seconds(whole_seconds(header.region.duration_ms)));
        term_println!("└─────────────────────────────────────────────────────────┘");
    }

    pub fn display_config(config: &TranscribeConfig, path: &Path) {
        term_println!("┌─ Configuration ─────────────────────────────────────────┐");
        term_println!("│ File: {}", Self::truncate(&path.display().to_string(), 50));
        term_println!("│ Wait timeout: {} ms", config.wait_timeout_ms);
        term_println!("│ Type timeout: {} ms", config.type_timeout_ms);
        term_println!("│ Boost: {:+} dB (step {} dB)", config.boost_db, config.boost_step_db);
        term_println!("│ Clip reduction step: {}", config.clip_reduction_step);
        term_println!("│ Seek step: {} s", config.seek_step_secs);
        term_println!("│ Period / buffer: {} ms / {} ms", config.period_ms, config.buffer_ms);
        term_println!("│ Buffer source: {}", config.pump_mode.as_str());
        term_println!("│ Device: {}", config.output_device.as_deref().unwrap_or("Default"));
        term_println!("└─────────────────────────────────────────────────────────┘");
    }

    pub fn display_devices(devices: &[DeviceInfo]) {
        if devices.is_empty() {
            term_println!("No audio output devices found");
            return;
        }
        term_println!("Audio output devices:");
        for device in devices {
            term_println!(
                "  {} {} ({} Hz, {} ch, {})",
                if device.is_default { "*" } else { " " },
                device.name,
                device.default_sample_rate,
                device.default_channels,
                device.sample_format
            );
        }
    }

    /// Short message shown while a session runs
    pub fn display_notice(message: &str) {
        for line in message.lines() {
            term_println!("  » {}", line);
        }
    }

    pub fn display_interactive_help() {
        term_println!("Type to transcribe. Playback waits while you type and resumes when you stop.");
        term_println!();
        term_println!("Keys:");
        term_println!("  Ctrl+Space / media play  - Play or pause");
        term_println!("  Alt+Left / Alt+Right     - Skip back or forward");
        term_println!("  Alt+Up / Alt+Down        - Change the boost level");
        term_println!("  Ctrl+C                   - Leave the session");
        term_println!();
        term_println!("Commands:");
        term_println!("  :play / :pause / :toggle  - Control playback");
        term_println!("  :fwd / :back              - Skip forward or back");
        term_println!("  :seek <time>              - Jump to a position (e.g. '1:30', '90s')");
        term_println!("  :up / :down               - Change the boost level");
        term_println!("  :wait <ms>                - Typing time before playback waits");
        term_println!("  :type <ms>                - Idle time before playback resumes");
        term_println!("  :status                   - Show the session status");
        term_println!("  :help                     - Show this help message");
        term_println!("  :quit                     - Leave the session");
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &TranscribeError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        term_eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐", severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            term_eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            term_eprintln!("│");
            term_eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    term_eprintln!("│   {}", line);
                }
            }
        }

        term_eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// A line of interactive input that could not be used
    pub fn display_input_error(error: &CommandError) {
        term_eprintln!("Error: {}", error);
        term_println!("Type ':help' for available commands.");
    }

    /// Wrap text to fit within specified width; embedded newlines start new lines
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();

        for paragraph in text.lines() {
            let mut current_line = String::new();
            for word in paragraph.split_whitespace() {
                if current_line.is_empty() {
                    current_line = word.to_string();
                } else if current_line.len() + word.len() < width {
                    current_line.push(' ');
                    current_line.push_str(word);
                } else {
                    lines.push(std::mem::take(&mut current_line));
                    current_line = word.to_string();
                }
            }
            if !current_line.is_empty() {
                lines.push(current_line);
            }
        }

        lines
    }

    pub fn channel_description(channels: u16) -> &'static str {
        match channels {
            1 => "Mono",
            2 => "Stereo",
            _ => "Multi-channel",
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_state(state: PlayerState) -> String {
        match state {
            PlayerState::Playing => "▶ Playing".to_string(),
            PlayerState::Paused => "⏸ Paused".to_string(),
            PlayerState::Waiting => "⌨ Waiting".to_string(),
        }
    }
}
