use log::{debug, trace};

use crate::error::PlaybackError;
use crate::models::{AudioBuffer, ByteOrder, FormatDescriptor, SampleType};

/// Linear gain removed per step while too many samples would clip
pub const DEFAULT_CLIP_STEP: f64 = 0.1;

/// Integer sample layouts the amplifier can rewrite
#[derive(Debug, Clone, Copy)]
struct Layout {
    bytes: usize,
    min: i32,
    max: i32,
    /// Offset between the stored value and its signed counterpart
    bias: i32,
    byte_order: ByteOrder,
}

impl Layout {
    fn of(format: &FormatDescriptor) -> Option<Self> {
        let (bytes, min, max, unsigned_bias) = match format.bits_per_sample {
            8 => (1, i8::MIN as i32, i8::MAX as i32, 128),
            16 => (2, i16::MIN as i32, i16::MAX as i32, 32768),
            _ => return None,
        };
        let bias = match format.sample_type {
            SampleType::SignedInt => 0,
            SampleType::UnsignedInt => unsigned_bias,
            SampleType::Float => return None,
        };
        Some(Self {
            bytes,
            min,
            max,
            bias,
            byte_order: format.byte_order,
        })
    }

    fn decode(&self, raw: &[u8]) -> i32 {
        let stored = match (self.bytes, self.bias, self.byte_order) {
            (1, 0, _) => raw[0] as i8 as i32,
            (1, _, _) => raw[0] as i32,
            (_, 0, ByteOrder::LittleEndian) => i16::from_le_bytes([raw[0], raw[1]]) as i32,
            (_, 0, ByteOrder::BigEndian) => i16::from_be_bytes([raw[0], raw[1]]) as i32,
            (_, _, ByteOrder::LittleEndian) => u16::from_le_bytes([raw[0], raw[1]]) as i32,
            (_, _, ByteOrder::BigEndian) => u16::from_be_bytes([raw[0], raw[1]]) as i32,
        };
        stored - self.bias
    }

    fn encode(&self, sample: i32, out: &mut [u8]) {
        let stored = sample + self.bias;
        match (self.bytes, self.byte_order) {
            (1, _) => out[0] = stored as u8,
            (_, ByteOrder::LittleEndian) => out.copy_from_slice(&(stored as u16).to_le_bytes()),
            (_, ByteOrder::BigEndian) => out.copy_from_slice(&(stored as u16).to_be_bytes()),
        }
    }
}

/// Clipping-aware gain stage.
///
/// Boosting is limited per buffer: while 10% or more of the samples would
/// clip, the linear factor is lowered by the clip step, never below 1.0. Loud
/// buffers therefore get less gain than quiet ones.
///
/// Scratch storage only ever grows, so steady-state playback does not
/// allocate.
#[derive(Debug)]
pub struct Amplifier {
    samples: Vec<i32>,
    output: Vec<u8>,
    histogram: Vec<u32>,
    clip_step: f64,
    last_factor: f64,
}

impl Amplifier {
    pub fn new() -> Self {
        Self::with_clip_step(DEFAULT_CLIP_STEP)
    }

    pub fn with_clip_step(clip_step: f64) -> Self {
        Self {
            samples: Vec::new(),
            output: Vec::new(),
            histogram: Vec::new(),
            clip_step: if clip_step > 0.0 { clip_step } else { DEFAULT_CLIP_STEP },
            last_factor: 1.0,
        }
    }

    /// Linear factor for a level in dB
    pub fn factor_for(level_db: i32) -> f64 {
        10f64.powf(level_db as f64 / 20.0)
    }

    /// Factor applied to the most recently boosted buffer
    pub fn last_factor(&self) -> f64 {
        self.last_factor
    }

    /// Apply `level_db` of gain to `buffer`.
    ///
    /// Returns `Ok(None)` when the buffer passes through untouched and
    /// `Ok(Some(bytes))` with the rewritten payload otherwise. Layouts other
    /// than 8/16-bit integer PCM are rejected with `BoostUnsupported`.
    pub fn boost(&mut self, buffer: &AudioBuffer, level_db: i32) -> Result<Option<&[u8]>, PlaybackError> {
        let mut factor = Self::factor_for(level_db);
        if factor == 1.0 {
            return Ok(None);
        }

        let layout = Layout::of(&buffer.format).ok_or_else(|| PlaybackError::BoostUnsupported {
            layout: format!(
                "{}-bit {}",
                buffer.format.bits_per_sample,
                buffer.format.sample_type.as_str()
            ),
        })?;

        let count = buffer.data.len() / layout.bytes;
        if count == 0 {
            return Ok(None);
        }

        self.load_signed(buffer, &layout, count);
        if factor > 1.0 {
            factor = self.limit_factor(count, factor, layout.max);
        }
        self.last_factor = factor;

        let byte_len = count * layout.bytes;
        if self.output.len() < byte_len {
            debug!("Growing boost buffer to {} bytes", byte_len);
            self.output.resize(byte_len, 0);
        }

        for (sample, out) in self.samples[..count]
            .iter()
            .zip(self.output[..byte_len].chunks_exact_mut(layout.bytes))
        {
            let scaled = (*sample as f64 * factor) as i64;
            let clamped = scaled.clamp(layout.min as i64, layout.max as i64) as i32;
            layout.encode(clamped, out);
        }

        Ok(Some(&self.output[..byte_len]))
    }

    /// Copy the buffer into the signed working area
    fn load_signed(&mut self, buffer: &AudioBuffer, layout: &Layout, count: usize) {
        if self.samples.len() < count {
            self.samples.resize(count, 0);
        }
        for (slot, raw) in self.samples[..count]
            .iter_mut()
            .zip(buffer.data.chunks_exact(layout.bytes))
        {
            *slot = layout.decode(raw);
        }
    }

    /// Lower `factor` until fewer than 10% of the samples would clip
    fn limit_factor(&mut self, count: usize, requested: f64, max: i32) -> f64 {
        let top = max as usize;
        if self.histogram.len() < top + 1 {
            self.histogram.resize(top + 1, 0);
        }
        let histogram = &mut self.histogram[..=top];
        histogram.iter_mut().for_each(|bin| *bin = 0);

        for sample in &self.samples[..count] {
            let magnitude = (sample.unsigned_abs() as usize).min(top);
            histogram[magnitude] += 1;
        }
        // reverse cumulative: bin i holds the number of samples >= i
        for i in (0..top).rev() {
            histogram[i] += histogram[i + 1];
        }

        let mut factor = requested;
        let cutoff = |f: f64| ((max as f64 / f) as usize).min(top);
        while factor > 1.0 && histogram[cutoff(factor)] as usize * 10 >= count {
            factor = (factor - self.clip_step).max(1.0);
        }

        if factor != requested {
            trace!("Boost reduced from {:.3} to {:.3} to limit clipping", requested, factor);
        }
        factor
    }
}

impl Default for Amplifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ByteOrder, FormatDescriptor, SampleType};

    fn format(bits: u16, sample_type: SampleType, byte_order: ByteOrder) -> FormatDescriptor {
        FormatDescriptor::new(44100, 1, bits, sample_type, byte_order)
    }

    fn i8_buffer(samples: &[i8]) -> AudioBuffer {
        let data = samples.iter().map(|s| *s as u8).collect();
        AudioBuffer::new(format(8, SampleType::SignedInt, ByteOrder::LittleEndian), data, 0)
    }

    fn i16_buffer(samples: &[i16], byte_order: ByteOrder) -> AudioBuffer {
        let data = samples
            .iter()
            .flat_map(|s| match byte_order {
                ByteOrder::LittleEndian => s.to_le_bytes(),
                ByteOrder::BigEndian => s.to_be_bytes(),
            })
            .collect();
        AudioBuffer::new(format(16, SampleType::SignedInt, byte_order), data, 0)
    }

    fn as_i16(bytes: &[u8]) -> Vec<i16> {
        bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
    }

    /// Deterministic noise in [-amplitude, amplitude]
    fn noise(count: usize, amplitude: i32, seed: u32) -> Vec<i16> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let unit = (state >> 8) as f64 / (1u32 << 24) as f64;
                ((unit * 2.0 - 1.0) * amplitude as f64) as i16
            })
            .collect()
    }

    #[test]
    fn test_signed_8bit_scenario() {
        let buffer = i8_buffer(&[0, 50, -50]);
        let mut amp = Amplifier::new();

        let quieter: Vec<i8> = amp.boost(&buffer, -6).unwrap().unwrap().iter().map(|b| *b as i8).collect();
        assert_eq!(quieter, vec![0, 25, -25]);

        let louder: Vec<i8> = amp.boost(&buffer, 6).unwrap().unwrap().iter().map(|b| *b as i8).collect();
        assert_eq!(louder, vec![0, 99, -99]);
    }

    #[test]
    fn test_signed_16bit() {
        let buffer = i16_buffer(&[0, 200, -200], ByteOrder::LittleEndian);
        let mut amp = Amplifier::new();

        assert_eq!(as_i16(amp.boost(&buffer, -6).unwrap().unwrap()), vec![0, 100, -100]);
        assert_eq!(as_i16(amp.boost(&buffer, 6).unwrap().unwrap()), vec![0, 399, -399]);
    }

    #[test]
    fn test_big_endian_16bit() {
        let buffer = i16_buffer(&[1000, -1000], ByteOrder::BigEndian);
        let mut amp = Amplifier::new();

        let out = amp.boost(&buffer, 6).unwrap().unwrap();
        let samples: Vec<i16> = out.chunks_exact(2).map(|c| i16::from_be_bytes([c[0], c[1]])).collect();
        assert_eq!(samples, vec![1995, -1995]);
    }

    #[test]
    fn test_unsigned_8bit() {
        let data = vec![128, 128 + 50, 128 - 50];
        let buffer = AudioBuffer::new(format(8, SampleType::UnsignedInt, ByteOrder::LittleEndian), data, 0);
        let mut amp = Amplifier::new();

        assert_eq!(amp.boost(&buffer, -6).unwrap().unwrap(), &[128, 128 + 25, 128 - 25]);
        assert_eq!(amp.boost(&buffer, 3).unwrap().unwrap(), &[128, 128 + 70, 128 - 70]);
    }

    #[test]
    fn test_unsigned_16bit() {
        let data: Vec<u8> = [32768u16, 32768 + 300, 32768 - 300]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let buffer = AudioBuffer::new(format(16, SampleType::UnsignedInt, ByteOrder::LittleEndian), data, 0);
        let mut amp = Amplifier::new();

        let out = amp.boost(&buffer, -6).unwrap().unwrap();
        let samples: Vec<u16> = out.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        assert_eq!(samples, vec![32768, 32768 + 150, 32768 - 150]);
    }

    #[test]
    fn test_zero_db_is_passthrough_for_all_layouts() {
        let mut amp = Amplifier::new();
        for bits in [8u16, 16] {
            for sample_type in [SampleType::SignedInt, SampleType::UnsignedInt] {
                for byte_order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
                    let buffer = AudioBuffer::new(format(bits, sample_type, byte_order), (0..=255).collect(), 0);
                    let before = buffer.data.clone();
                    assert!(amp.boost(&buffer, 0).unwrap().is_none());
                    assert_eq!(buffer.data, before);
                }
            }
        }
    }

    #[test]
    fn test_signedness_round_trip_is_identity() {
        for (bits, byte_order) in [(8u16, ByteOrder::LittleEndian), (16, ByteOrder::LittleEndian), (16, ByteOrder::BigEndian)] {
            let layout = Layout::of(&format(bits, SampleType::UnsignedInt, byte_order)).unwrap();
            let data: Vec<u8> = (0..=255u8).collect();
            let mut rebuilt = vec![0u8; data.len()];
            for (raw, out) in data.chunks_exact(layout.bytes).zip(rebuilt.chunks_exact_mut(layout.bytes)) {
                let signed = layout.decode(raw);
                assert!(signed >= layout.min && signed <= layout.max);
                layout.encode(signed, out);
            }
            assert_eq!(rebuilt, data);
        }
    }

    #[test]
    fn test_empty_buffer_is_not_modified() {
        let mut amp = Amplifier::new();
        assert!(amp.boost(&i8_buffer(&[]), 6).unwrap().is_none());
        assert!(amp.boost(&i16_buffer(&[], ByteOrder::LittleEndian), -6).unwrap().is_none());
    }

    #[test]
    fn test_unsupported_layouts() {
        let mut amp = Amplifier::new();
        let float = AudioBuffer::new(format(32, SampleType::Float, ByteOrder::LittleEndian), vec![0; 8], 0);
        assert!(matches!(amp.boost(&float, 6), Err(PlaybackError::BoostUnsupported { .. })));

        let wide = AudioBuffer::new(format(24, SampleType::SignedInt, ByteOrder::LittleEndian), vec![0; 6], 0);
        assert!(matches!(amp.boost(&wide, -3), Err(PlaybackError::BoostUnsupported { .. })));

        // nothing to do at unity gain, whatever the layout
        assert!(amp.boost(&wide, 0).unwrap().is_none());
    }

    #[test]
    fn test_loud_buffer_gets_reduced_gain() {
        let buffer = i16_buffer(&[20000; 100], ByteOrder::LittleEndian);
        let mut amp = Amplifier::new();

        let out = as_i16(amp.boost(&buffer, 6).unwrap().unwrap());
        assert!(amp.last_factor() < Amplifier::factor_for(6));
        assert!(amp.last_factor() > 1.0);
        assert!(out.iter().all(|s| *s > 20000 && *s < i16::MAX));
    }

    #[test]
    fn test_gain_never_drops_below_unity() {
        // every sample already at full scale
        let buffer = i16_buffer(&[i16::MAX, i16::MIN, i16::MAX, i16::MIN], ByteOrder::LittleEndian);
        let mut amp = Amplifier::new();

        let out = as_i16(amp.boost(&buffer, 20).unwrap().unwrap());
        assert_eq!(amp.last_factor(), 1.0);
        assert_eq!(out, vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_clipped_fraction_stays_below_ten_percent() {
        let mut amp = Amplifier::new();
        for (seed, amplitude) in [(1u32, 4000), (7, 16000), (42, 30000), (99, 32767)] {
            let samples = noise(1000, amplitude, seed);
            let buffer = i16_buffer(&samples, ByteOrder::LittleEndian);
            for level in [1, 3, 6, 12, 24] {
                amp.boost(&buffer, level).unwrap();
                let factor = amp.last_factor();
                let clipped = samples
                    .iter()
                    .filter(|s| (s.unsigned_abs() as f64 * factor) > i16::MAX as f64)
                    .count();
                assert!(
                    clipped * 10 < samples.len(),
                    "level {} dB, amplitude {}: {} of {} samples clip",
                    level,
                    amplitude,
                    clipped,
                    samples.len()
                );
            }
        }
    }

    #[test]
    fn test_scratch_only_grows() {
        let mut amp = Amplifier::new();
        amp.boost(&i16_buffer(&[100; 512], ByteOrder::LittleEndian), 3).unwrap();
        assert_eq!(amp.output.len(), 1024);

        let out_len = amp.boost(&i16_buffer(&[100; 8], ByteOrder::LittleEndian), 3).unwrap().unwrap().len();
        assert_eq!(out_len, 16);
        assert_eq!(amp.output.len(), 1024);
        assert!(amp.samples.len() >= 512);
    }
}
