use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::audio::buffer::RingBuffer;
use crate::audio::resampler::LinearResampler;
use crate::error::PlaybackError;
use crate::models::{ByteOrder, FormatDescriptor, SampleType};

/// Where pumped PCM bytes end up.
///
/// The sink consumes audio in periods; the pump only produces a new buffer
/// while [`free_space`](OutputSink::free_space) covers at least one period.
pub trait OutputSink: Send {
    /// Prepare the sink for buffers in `format`, dropping anything queued
    fn configure(&mut self, format: &FormatDescriptor) -> Result<(), PlaybackError>;

    fn format(&self) -> Option<FormatDescriptor>;

    /// Queue bytes; returns how many were accepted
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Bytes that can be written without blocking
    fn free_space(&self) -> usize;

    /// Bytes the device consumes per period
    fn period_size(&self) -> usize;

    /// Stop consuming; queued data stays queued
    fn suspend(&mut self);

    fn resume(&mut self);

    /// Drop queued data
    fn reset(&mut self);

    /// Playback time queued but not yet heard
    fn latency_ms(&self) -> u64 {
        0
    }

    /// Cadence of the "room available" check: half the playback time of one
    /// period, and never below a millisecond.
    fn refill_interval(&self) -> Option<Duration> {
        let format = self.format()?;
        let period_ms = format.duration_for_bytes(self.period_size() as u64);
        Some(Duration::from_millis((period_ms / 2).max(1)))
    }
}

/// Whether [`decode_pcm`] understands this layout
pub fn is_decodable(format: &FormatDescriptor) -> bool {
    matches!(
        (format.sample_type, format.bits_per_sample),
        (SampleType::SignedInt | SampleType::UnsignedInt, 8 | 16)
            | (SampleType::SignedInt, 32)
            | (SampleType::Float, 32)
    ) && format.channels > 0
}

/// Convert interleaved PCM bytes to f32 samples in [-1, 1], appending to `out`
pub fn decode_pcm(bytes: &[u8], format: &FormatDescriptor, out: &mut Vec<f32>) {
    let width = format.bytes_per_sample();
    if width == 0 {
        return;
    }
    let be = format.byte_order == ByteOrder::BigEndian;
    out.reserve(bytes.len() / width);
    for raw in bytes.chunks_exact(width) {
        let sample = match (format.sample_type, width) {
            (SampleType::UnsignedInt, 1) => (raw[0] as f32 - 128.0) / 128.0,
            (SampleType::SignedInt, 1) => raw[0] as i8 as f32 / 128.0,
            (SampleType::SignedInt, 2) => {
                let v = if be { i16::from_be_bytes([raw[0], raw[1]]) } else { i16::from_le_bytes([raw[0], raw[1]]) };
                v as f32 / 32768.0
            }
            (SampleType::UnsignedInt, 2) => {
                let v = if be { u16::from_be_bytes([raw[0], raw[1]]) } else { u16::from_le_bytes([raw[0], raw[1]]) };
                (v as f32 - 32768.0) / 32768.0
            }
            (SampleType::SignedInt, 4) => {
                let b = [raw[0], raw[1], raw[2], raw[3]];
                let v = if be { i32::from_be_bytes(b) } else { i32::from_le_bytes(b) };
                v as f32 / 2_147_483_648.0
            }
            (SampleType::Float, 4) => {
                let b = [raw[0], raw[1], raw[2], raw[3]];
                if be { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
            }
            _ => 0.0,
        };
        out.push(sample);
    }
}

/// Re-lay interleaved frames from `src` to `dst` channels: mono is
/// duplicated, extra channels are averaged into mono or dropped.
pub fn map_channels(input: &[f32], src: usize, dst: usize, out: &mut Vec<f32>) {
    if src == 0 || dst == 0 {
        return;
    }
    if src == dst {
        out.extend_from_slice(input);
        return;
    }
    for frame in input.chunks_exact(src) {
        if src == 1 {
            out.extend(std::iter::repeat(frame[0]).take(dst));
        } else if dst == 1 {
            out.push(frame.iter().sum::<f32>() / src as f32);
        } else {
            out.extend((0..dst).map(|c| frame.get(c).copied().unwrap_or(0.0)));
        }
    }
}

/// The open device stream, living on its own thread
struct DeviceStream {
    ring: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    rate: u32,
    channels: usize,
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Output sink playing through a cpal device.
///
/// Incoming PCM is converted to f32, mapped to the device's channel count,
/// resampled to the device rate and queued in a ring the stream callback
/// drains. Sizes reported to the pump are in source bytes.
pub struct CpalSink {
    device: cpal::Device,
    period_ms: u64,
    buffer_ms: u64,
    format: Option<FormatDescriptor>,
    stream: Option<DeviceStream>,
    suspended: Arc<AtomicBool>,
    resampler: LinearResampler,
    decoded: Vec<f32>,
    mapped: Vec<f32>,
    resampled: Vec<f32>,
}

impl CpalSink {
    pub fn new(device: cpal::Device, period_ms: u64, buffer_ms: u64) -> Self {
        Self {
            device,
            period_ms: period_ms.max(1),
            buffer_ms: buffer_ms.max(period_ms * 2),
            format: None,
            stream: None,
            suspended: Arc::new(AtomicBool::new(true)),
            resampler: LinearResampler::new(0, 0, 0),
            decoded: Vec::new(),
            mapped: Vec::new(),
            resampled: Vec::new(),
        }
    }

    fn open_stream(&self) -> Result<DeviceStream, PlaybackError> {
        let default_config = self
            .device
            .default_output_config()
            .map_err(|e| PlaybackError::Output(format!("Failed to get default config: {}", e)))?;

        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let capacity = (rate as u64 * self.buffer_ms / 1000) as usize * channels;
        let ring = Arc::new(RingBuffer::new(capacity + 1));
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let device = self.device.clone();
        let thread_ring = Arc::clone(&ring);
        let thread_running = Arc::clone(&running);
        let suspended = Arc::clone(&self.suspended);

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    SampleFormat::F32 => build_stream::<f32>(&device, &config, &thread_ring, &suspended),
                    SampleFormat::I16 => build_stream::<i16>(&device, &config, &thread_ring, &suspended),
                    SampleFormat::U16 => build_stream::<u16>(&device, &config, &thread_ring, &suspended),
                    other => Err(format!("Unsupported device sample format: {:?}", other)),
                };
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("Failed to start audio stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                let _ = stream.pause();
            })
            .map_err(|e| PlaybackError::Output(format!("Failed to create audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(DeviceStream { ring, running, rate, channels }),
            Ok(Err(e)) => Err(PlaybackError::Output(e)),
            Err(_) => Err(PlaybackError::Output("Audio thread exited during startup".to_string())),
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    ring: &Arc<RingBuffer>,
    suspended: &Arc<AtomicBool>,
) -> Result<cpal::Stream, String>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let ring = Arc::clone(ring);
    let suspended = Arc::clone(suspended);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let read = if suspended.load(Ordering::Relaxed) {
                    0
                } else {
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    ring.read(&mut scratch[..data.len()])
                };
                for (i, sample) in data.iter_mut().enumerate() {
                    let value = if i < read { scratch[i] } else { 0.0 };
                    *sample = cpal::Sample::from_sample(value);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("Failed to build output stream: {}", e))
}

impl OutputSink for CpalSink {
    fn configure(&mut self, format: &FormatDescriptor) -> Result<(), PlaybackError> {
        if !is_decodable(format) {
            return Err(PlaybackError::Output(format!(
                "Cannot play {}",
                format.description()
            )));
        }
        if self.stream.is_none() {
            self.stream = Some(self.open_stream()?);
        }
        if let Some(stream) = &self.stream {
            stream.ring.clear();
            self.resampler = LinearResampler::new(format.sample_rate, stream.rate, stream.channels);
            log::debug!(
                "Output configured for {} (device {} Hz, {} channels)",
                format.description(),
                stream.rate,
                stream.channels
            );
        }
        self.format = Some(*format);
        Ok(())
    }

    fn format(&self) -> Option<FormatDescriptor> {
        self.format
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let (Some(format), Some(stream)) = (self.format, self.stream.as_ref()) else {
            return 0;
        };
        let frame = format.bytes_per_frame();
        let accepted = bytes.len().min(self.free_space()) / frame * frame;
        if accepted == 0 {
            return 0;
        }

        self.decoded.clear();
        self.mapped.clear();
        self.resampled.clear();
        decode_pcm(&bytes[..accepted], &format, &mut self.decoded);
        map_channels(&self.decoded, format.channels as usize, stream.channels, &mut self.mapped);
        self.resampler.process_into(&self.mapped, &mut self.resampled);

        let queued = stream.ring.write(&self.resampled);
        if queued < self.resampled.len() {
            log::trace!("Dropped {} samples on a full output queue", self.resampled.len() - queued);
        }
        accepted
    }

    fn free_space(&self) -> usize {
        let (Some(format), Some(stream)) = (self.format, self.stream.as_ref()) else {
            return 0;
        };
        let device_frames = stream.ring.available_write() / stream.channels.max(1);
        // one frame of slack for resampler rounding
        let source_frames = self.resampler.input_frames(device_frames).saturating_sub(1);
        source_frames * format.bytes_per_frame()
    }

    fn period_size(&self) -> usize {
        match self.format {
            Some(format) => (format.bytes_for_duration(self.period_ms) as usize).max(format.bytes_per_frame()),
            None => 0,
        }
    }

    fn suspend(&mut self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.suspended.store(false, Ordering::Relaxed);
    }

    fn reset(&mut self) {
        if let Some(stream) = &self.stream {
            stream.ring.clear();
        }
        self.resampler.reset();
    }

    fn latency_ms(&self) -> u64 {
        match &self.stream {
            Some(stream) if stream.rate > 0 => {
                let frames = stream.ring.available_read() / stream.channels.max(1);
                frames as u64 * 1000 / stream.rate as u64
            }
            _ => 0,
        }
    }
}
