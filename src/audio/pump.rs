/*!
Buffer pumps: where playable audio buffers come from.

Two strategies sit behind one trait and are picked once per `open`:

- [`NativePump`] reads raw PCM out of a parsed WAV/AIFF data region, one
  sink period at a time, and only while the sink has room for a period.
- [`TappedPump`] lets a [`PlatformDecoder`] decode the file and taps each
  buffer it produces; the decoder decides the buffer size.
*/

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::audio::decoder::PlatformDecoder;
use crate::audio::format::FormatParser;
use crate::audio::sink::OutputSink;
use crate::error::ParseError;
use crate::models::{AudioBuffer, FormatDescriptor, MediaStatus, ParsedHeader, PumpMode};

pub trait BufferPump: Send {
    fn mode(&self) -> PumpMode;

    fn status(&self) -> MediaStatus;

    /// Format of the buffers this pump produces, once known
    fn format(&self) -> Option<FormatDescriptor>;

    /// 0 when unknown
    fn duration_ms(&self) -> u64;

    /// Elapsed playback time of the next buffer to be produced
    fn position_ms(&self) -> u64;

    /// Move to `position_ms`, clamped to the duration; returns the new position
    fn seek(&mut self, position_ms: u64) -> u64;

    fn play(&mut self, sink: &mut dyn OutputSink);

    fn pause(&mut self, sink: &mut dyn OutputSink);

    /// Produce the next buffer if the sink has room for it
    fn next_buffer(&mut self, sink: &dyn OutputSink) -> Option<AudioBuffer>;

    /// Detail for a `LoadError` status
    fn error_string(&self) -> Option<String>;
}

/// Reads PCM straight from a WAV/AIFF data region
pub struct NativePump<R> {
    source: R,
    header: ParsedHeader,
    /// Bytes of the data region already handed out
    cursor: u64,
    status: MediaStatus,
    error: Option<String>,
}

impl NativePump<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        Self::from_source(BufReader::new(file))
    }
}

impl<R: Read + Seek + Send> NativePump<R> {
    pub fn from_source(mut source: R) -> Result<Self, ParseError> {
        let header = FormatParser::parse(&mut source)?;
        source.seek(SeekFrom::Start(header.region.offset))?;
        Ok(Self {
            source,
            header,
            cursor: 0,
            status: MediaStatus::Loaded,
            error: None,
        })
    }

    pub fn header(&self) -> &ParsedHeader {
        &self.header
    }

    /// Read until `buf` is full or the source runs dry
    fn read_full(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn end_of_media(&mut self) -> Option<AudioBuffer> {
        if self.status != MediaStatus::EndOfMedia {
            log::debug!("End of media at {} ms", self.position_ms());
        }
        self.status = MediaStatus::EndOfMedia;
        None
    }
}

impl<R: Read + Seek + Send> BufferPump for NativePump<R> {
    fn mode(&self) -> PumpMode {
        PumpMode::Native
    }

    fn status(&self) -> MediaStatus {
        self.status
    }

    fn format(&self) -> Option<FormatDescriptor> {
        Some(self.header.format)
    }

    fn duration_ms(&self) -> u64 {
        self.header.region.duration_ms
    }

    fn position_ms(&self) -> u64 {
        self.header.format.duration_for_bytes(self.cursor)
    }

    fn seek(&mut self, position_ms: u64) -> u64 {
        let target = position_ms.min(self.duration_ms());
        let bytes = self
            .header
            .format
            .bytes_for_duration(target)
            .min(self.header.region.length);

        match self.source.seek(SeekFrom::Start(self.header.region.offset + bytes)) {
            Ok(_) => {
                self.cursor = bytes;
                if self.status != MediaStatus::LoadError {
                    self.status = MediaStatus::Loaded;
                }
            }
            Err(e) => {
                log::warn!("Seek failed: {}", e);
                self.status = MediaStatus::LoadError;
                self.error = Some(e.to_string());
            }
        }
        target
    }

    fn play(&mut self, sink: &mut dyn OutputSink) {
        sink.resume();
    }

    fn pause(&mut self, sink: &mut dyn OutputSink) {
        sink.suspend();
    }

    fn next_buffer(&mut self, sink: &dyn OutputSink) -> Option<AudioBuffer> {
        if matches!(self.status, MediaStatus::EndOfMedia | MediaStatus::LoadError) {
            return None;
        }
        let period = sink.period_size();
        if period == 0 || sink.free_space() < period {
            return None;
        }

        let frame = self.header.format.bytes_per_frame() as u64;
        let remaining = self.header.region.length - self.cursor;
        let wanted = (period as u64).min(remaining) / frame * frame;
        if wanted == 0 {
            return self.end_of_media();
        }

        let timestamp_ms = self.position_ms();
        let mut data = vec![0u8; wanted as usize];
        let got = match self.read_full(&mut data) {
            Ok(got) => got,
            Err(e) => {
                log::warn!("Read failed at {} ms: {}", timestamp_ms, e);
                self.status = MediaStatus::LoadError;
                self.error = Some(e.to_string());
                return None;
            }
        };
        if (got as u64) < wanted {
            // File shorter than its header claims
            return self.end_of_media();
        }

        self.cursor += wanted;
        self.status = MediaStatus::Buffered;
        Some(AudioBuffer::new(self.header.format, data, timestamp_ms))
    }

    fn error_string(&self) -> Option<String> {
        self.error.clone()
    }
}

/// Taps the buffers of a platform decoder that renders silently
pub struct TappedPump {
    decoder: Box<dyn PlatformDecoder>,
    format: Option<FormatDescriptor>,
}

impl TappedPump {
    pub fn new(decoder: Box<dyn PlatformDecoder>) -> Self {
        Self {
            decoder,
            format: None,
        }
    }
}

impl BufferPump for TappedPump {
    fn mode(&self) -> PumpMode {
        PumpMode::Intercepted
    }

    fn status(&self) -> MediaStatus {
        self.decoder.status()
    }

    fn format(&self) -> Option<FormatDescriptor> {
        self.format
    }

    fn duration_ms(&self) -> u64 {
        self.decoder.duration_ms()
    }

    fn position_ms(&self) -> u64 {
        self.decoder.position_ms()
    }

    fn seek(&mut self, position_ms: u64) -> u64 {
        let duration = self.decoder.duration_ms();
        let target = if duration > 0 { position_ms.min(duration) } else { position_ms };
        self.decoder.seek(target);
        target
    }

    // The decoder renders silence; the sink is what the user hears, so it
    // follows the decoder's run state.
    fn play(&mut self, sink: &mut dyn OutputSink) {
        self.decoder.play();
        sink.resume();
    }

    fn pause(&mut self, sink: &mut dyn OutputSink) {
        self.decoder.pause();
        sink.suspend();
    }

    fn next_buffer(&mut self, sink: &dyn OutputSink) -> Option<AudioBuffer> {
        // Before the sink knows the format it cannot size anything. Decoded
        // buffers may exceed a period; the engine holds back what does not fit.
        if sink.format().is_some() && sink.free_space() < sink.period_size() {
            return None;
        }
        let buffer = self.decoder.next_buffer()?;
        self.format = Some(buffer.format);
        Some(buffer)
    }

    fn error_string(&self) -> Option<String> {
        self.decoder.error_string()
    }
}
