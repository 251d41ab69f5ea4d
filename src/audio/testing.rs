//! Fixtures shared by the audio tests: container builders, an in-memory sink
//! and a scripted decoder backend.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::audio::decoder::{DecoderBackend, PlatformDecoder};
use crate::audio::sink::OutputSink;
use crate::error::PlaybackError;
use crate::models::{AudioBuffer, ByteOrder, FormatDescriptor, MediaStatus, SampleType};

/// Encode a positive integer rate as an 80-bit extended float
pub fn f80_bytes(rate: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    if rate == 0 {
        return out;
    }
    let exponent = 31 - rate.leading_zeros();
    let biased = (exponent + 16383) as u16;
    let mantissa = (rate as u64) << (63 - exponent);
    out[..2].copy_from_slice(&biased.to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

pub fn pcm16_le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Builds RIFF/WAVE files chunk by chunk
pub struct WavBuilder {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits: u16,
    before_data: Vec<([u8; 4], Vec<u8>)>,
    data: Option<Vec<u8>>,
    size_adjust: i64,
}

impl WavBuilder {
    pub fn new() -> Self {
        Self {
            format_tag: 1,
            channels: 1,
            sample_rate: 44100,
            bits: 16,
            before_data: Vec::new(),
            data: Some(Vec::new()),
            size_adjust: 0,
        }
    }

    pub fn format_tag(mut self, tag: u16) -> Self {
        self.format_tag = tag;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn bits(mut self, bits: u16) -> Self {
        self.bits = bits;
        self
    }

    pub fn chunk(mut self, id: &[u8; 4], body: Vec<u8>) -> Self {
        self.before_data.push((*id, body));
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn no_data(mut self) -> Self {
        self.data = None;
        self
    }

    /// Skew the declared RIFF size away from the real one
    pub fn size_adjust(mut self, delta: i64) -> Self {
        self.size_adjust = delta;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let block_align = self.channels * ((self.bits + 7) / 8);
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&self.format_tag.to_le_bytes());
        fmt.extend_from_slice(&self.channels.to_le_bytes());
        fmt.extend_from_slice(&self.sample_rate.to_le_bytes());
        fmt.extend_from_slice(&(self.sample_rate * block_align as u32).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&self.bits.to_le_bytes());

        let mut body = b"WAVE".to_vec();
        push_chunk(&mut body, b"fmt ", &fmt, ByteOrder::LittleEndian);
        for (id, chunk) in &self.before_data {
            push_chunk(&mut body, id, chunk, ByteOrder::LittleEndian);
        }
        if let Some(data) = &self.data {
            push_chunk(&mut body, b"data", data, ByteOrder::LittleEndian);
        }

        let declared = (body.len() as i64 + self.size_adjust) as u32;
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(&body);
        out
    }
}

/// Builds FORM/AIFF files, or FORM/AIFC once a compression type is set
pub struct AiffBuilder {
    compression: Option<[u8; 4]>,
    channels: u16,
    bits: u16,
    rate_bytes: [u8; 10],
    ssnd_offset: u32,
    data: Vec<u8>,
}

impl AiffBuilder {
    pub fn new() -> Self {
        Self {
            compression: None,
            channels: 1,
            bits: 16,
            rate_bytes: f80_bytes(44100),
            ssnd_offset: 0,
            data: Vec::new(),
        }
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn compression(mut self, tag: &[u8; 4]) -> Self {
        self.compression = Some(*tag);
        self
    }

    pub fn bits(mut self, bits: u16) -> Self {
        self.bits = bits;
        self
    }

    pub fn rate_bytes(mut self, bytes: [u8; 10]) -> Self {
        self.rate_bytes = bytes;
        self
    }

    pub fn ssnd_offset(mut self, offset: u32) -> Self {
        self.ssnd_offset = offset;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let frame = (self.channels as usize * ((self.bits as usize + 7) / 8)).max(1);
        let mut comm = Vec::new();
        comm.extend_from_slice(&self.channels.to_be_bytes());
        comm.extend_from_slice(&((self.data.len() / frame) as u32).to_be_bytes());
        comm.extend_from_slice(&self.bits.to_be_bytes());
        comm.extend_from_slice(&self.rate_bytes);
        if let Some(tag) = &self.compression {
            comm.extend_from_slice(tag);
            // empty pascal string, padded to an even length
            comm.extend_from_slice(&[0, 0]);
        }

        let mut ssnd = Vec::new();
        ssnd.extend_from_slice(&self.ssnd_offset.to_be_bytes());
        ssnd.extend_from_slice(&0u32.to_be_bytes());
        ssnd.extend(std::iter::repeat(0u8).take(self.ssnd_offset as usize));
        ssnd.extend_from_slice(&self.data);

        let mut body = match self.compression {
            Some(_) => b"AIFC".to_vec(),
            None => b"AIFF".to_vec(),
        };
        push_chunk(&mut body, b"COMM", &comm, ByteOrder::BigEndian);
        push_chunk(&mut body, b"SSND", &ssnd, ByteOrder::BigEndian);

        let mut out = b"FORM".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }
}

fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8], order: ByteOrder) {
    out.extend_from_slice(id);
    let size = body.len() as u32;
    match order {
        ByteOrder::LittleEndian => out.extend_from_slice(&size.to_le_bytes()),
        ByteOrder::BigEndian => out.extend_from_slice(&size.to_be_bytes()),
    }
    out.extend_from_slice(body);
}

/// Mono 16-bit 44.1 kHz little-endian
pub fn cd_mono() -> FormatDescriptor {
    FormatDescriptor::new(44100, 1, 16, SampleType::SignedInt, ByteOrder::LittleEndian)
}

/// Sink that queues bytes in memory and drains only when told to
#[derive(Debug)]
pub struct MemorySink {
    pub capacity: usize,
    pub period: usize,
    pub queued: usize,
    /// Every byte accepted so far, shared so it stays readable once the sink is boxed
    pub written: Arc<Mutex<Vec<u8>>>,
    pub suspended: bool,
    pub format: Option<FormatDescriptor>,
    pub configure_count: usize,
}

impl MemorySink {
    pub fn new(capacity: usize, period: usize) -> Self {
        Self {
            capacity,
            period,
            queued: 0,
            written: Arc::new(Mutex::new(Vec::new())),
            suspended: true,
            format: None,
            configure_count: 0,
        }
    }

    /// Simulate the device consuming `bytes`
    pub fn drain(&mut self, bytes: usize) {
        if !self.suspended {
            self.queued = self.queued.saturating_sub(bytes);
        }
    }
}

impl OutputSink for MemorySink {
    fn configure(&mut self, format: &FormatDescriptor) -> Result<(), PlaybackError> {
        self.format = Some(*format);
        self.configure_count += 1;
        self.queued = 0;
        Ok(())
    }

    fn format(&self) -> Option<FormatDescriptor> {
        self.format
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free_space());
        self.written.lock().unwrap().extend_from_slice(&bytes[..n]);
        self.queued += n;
        n
    }

    fn free_space(&self) -> usize {
        self.capacity - self.queued
    }

    fn period_size(&self) -> usize {
        self.period
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }

    fn reset(&mut self) {
        self.queued = 0;
    }
}

/// Observable state of a [`ScriptedDecoder`]
#[derive(Debug, Default)]
pub struct DecoderCalls {
    pub playing: bool,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub seeks: Vec<u64>,
}

/// Decoder that replays a fixed list of buffers
pub struct ScriptedDecoder {
    buffers: VecDeque<AudioBuffer>,
    status: MediaStatus,
    duration_ms: u64,
    position_ms: u64,
    fail_after: Option<usize>,
    calls: Arc<Mutex<DecoderCalls>>,
}

impl ScriptedDecoder {
    pub fn new(buffers: Vec<AudioBuffer>, duration_ms: u64) -> (Self, Arc<Mutex<DecoderCalls>>) {
        let calls = Arc::new(Mutex::new(DecoderCalls::default()));
        let decoder = Self {
            buffers: buffers.into(),
            status: MediaStatus::Loaded,
            duration_ms,
            position_ms: 0,
            fail_after: None,
            calls: Arc::clone(&calls),
        };
        (decoder, calls)
    }

    /// Report a decode failure once `n` buffers have been tapped
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

impl PlatformDecoder for ScriptedDecoder {
    fn status(&self) -> MediaStatus {
        self.status
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn play(&mut self) {
        let mut calls = self.calls.lock().unwrap();
        calls.playing = true;
        calls.play_calls += 1;
    }

    fn pause(&mut self) {
        let mut calls = self.calls.lock().unwrap();
        calls.playing = false;
        calls.pause_calls += 1;
    }

    fn seek(&mut self, position_ms: u64) {
        self.position_ms = position_ms;
        if self.status == MediaStatus::EndOfMedia {
            self.status = MediaStatus::Loaded;
        }
        self.calls.lock().unwrap().seeks.push(position_ms);
    }

    fn next_buffer(&mut self) -> Option<AudioBuffer> {
        if !self.calls.lock().unwrap().playing {
            return None;
        }
        if self.fail_after == Some(0) {
            self.status = MediaStatus::LoadError;
            return None;
        }
        match self.buffers.pop_front() {
            Some(buffer) => {
                self.fail_after = self.fail_after.map(|n| n - 1);
                self.position_ms = buffer.timestamp_ms + buffer.duration_ms();
                self.status = MediaStatus::Buffered;
                Some(buffer)
            }
            None => {
                self.status = MediaStatus::EndOfMedia;
                None
            }
        }
    }

    fn error_string(&self) -> Option<String> {
        match self.status {
            MediaStatus::LoadError => Some("scripted decode failure".to_string()),
            _ => None,
        }
    }
}

/// Backend handing out scripted decoders for any path
pub struct ScriptedBackend {
    pub tap_available: bool,
    pub buffers: Vec<AudioBuffer>,
    pub duration_ms: u64,
    pub fail_open: bool,
}

impl DecoderBackend for ScriptedBackend {
    fn tap_available(&self) -> bool {
        self.tap_available
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PlatformDecoder>, PlaybackError> {
        if self.fail_open {
            return Err(PlaybackError::LoadError {
                path: path.display().to_string(),
                reason: "unrecognised media".to_string(),
            });
        }
        let (decoder, _) = ScriptedDecoder::new(self.buffers.clone(), self.duration_ms);
        Ok(Box::new(decoder))
    }
}
