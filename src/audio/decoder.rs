use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::PlaybackError;
use crate::models::{AudioBuffer, ByteOrder, FormatDescriptor, MediaStatus, SampleType};

/// A decoder that renders a file on its own schedule and lets us tap every
/// buffer it produces. The engine never inspects what kind it is.
pub trait PlatformDecoder: Send {
    fn status(&self) -> MediaStatus;
    fn duration_ms(&self) -> u64;
    fn position_ms(&self) -> u64;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position_ms: u64);

    /// Copy of the next buffer the decoder would render, if it is playing
    fn next_buffer(&mut self) -> Option<AudioBuffer>;

    /// Why the decoder entered `LoadError`
    fn error_string(&self) -> Option<String>;
}

/// Opens files with a [`PlatformDecoder`]
pub trait DecoderBackend: Send {
    /// Whether decoded buffers can be tapped on this platform
    fn tap_available(&self) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn PlatformDecoder>, PlaybackError>;
}

/// Backend decoding any container symphonia recognises
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaBackend;

impl DecoderBackend for SymphoniaBackend {
    fn tap_available(&self) -> bool {
        true
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PlatformDecoder>, PlaybackError> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}

pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    duration_ms: u64,
    position_ms: u64,
    playing: bool,
    status: MediaStatus,
    error: Option<String>,
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self, PlaybackError> {
        let load_error = |reason: String| PlaybackError::LoadError {
            path: path.display().to_string(),
            reason,
        };

        let file = File::open(path).map_err(|e| load_error(format!("Failed to open file: {}", e)))?;
        let media_source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| load_error(format!("Unrecognised media: {}", e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| load_error("No audio track found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| load_error(format!("Failed to create decoder: {}", e)))?;

        let duration_ms = match (track.codec_params.n_frames, track.codec_params.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => frames * 1000 / rate as u64,
            _ => 0,
        };
        let track_id = track.id;
        let time_base = track.codec_params.time_base;

        log::debug!("Decoder opened {} ({} ms)", path.display(), duration_ms);

        Ok(Self {
            reader,
            decoder,
            track_id,
            time_base,
            duration_ms,
            position_ms: 0,
            playing: false,
            status: MediaStatus::Loaded,
            error: None,
        })
    }

    fn fail(&mut self, reason: String) {
        log::warn!("Decoder failure: {}", reason);
        self.status = MediaStatus::LoadError;
        self.error = Some(reason);
        self.playing = false;
    }

    fn timestamp_ms(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                time.seconds * 1000 + (time.frac * 1000.0) as u64
            }
            None => self.position_ms,
        }
    }
}

/// Interleave a decoded buffer as 16-bit little-endian PCM whatever the codec
/// produced, so every tapped stream can be boosted.
fn tap_bytes(decoded: AudioBufferRef<'_>) -> (FormatDescriptor, Vec<u8>) {
    let spec = *decoded.spec();
    let format = FormatDescriptor::new(
        spec.rate,
        spec.channels.count() as u16,
        16,
        SampleType::SignedInt,
        ByteOrder::LittleEndian,
    );

    let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
    samples.copy_interleaved_ref(decoded);

    let mut data = Vec::with_capacity(samples.len() * 2);
    for sample in samples.samples() {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    (format, data)
}

impl PlatformDecoder for SymphoniaDecoder {
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
        if self.status != MediaStatus::LoadError {
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, position_ms: u64) {
        let time = Time::new(position_ms / 1000, (position_ms % 1000) as f64 / 1000.0);
        let result = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        );
        match result {
            Ok(_) => {
                self.decoder.reset();
                self.position_ms = position_ms;
                if self.status == MediaStatus::EndOfMedia {
                    self.status = MediaStatus::Loaded;
                }
            }
            // Seeking to the very end of some formats fails; treat it as reaching the end
            Err(e) => {
                log::debug!("Seek to {} ms failed: {}", position_ms, e);
                self.position_ms = position_ms.min(self.duration_ms);
                self.status = MediaStatus::EndOfMedia;
            }
        }
    }

    fn next_buffer(&mut self) -> Option<AudioBuffer> {
        if !self.playing || self.status == MediaStatus::EndOfMedia {
            return None;
        }

        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.status = MediaStatus::EndOfMedia;
                    self.playing = false;
                    return None;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    self.fail(format!("Failed to read packet: {}", e));
                    return None;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp_ms = self.timestamp_ms(packet.ts());
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let (format, data) = tap_bytes(decoded);
                    let buffer = AudioBuffer::new(format, data, timestamp_ms);
                    self.position_ms = timestamp_ms + buffer.duration_ms();
                    self.status = MediaStatus::Buffered;
                    return Some(buffer);
                }
                // Corrupt packets are skipped
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => {
                    self.fail(format!("Decoding failed: {}", e));
                    return None;
                }
            }
        }
    }

    fn error_string(&self) -> Option<String> {
        self.error.clone()
    }
}
