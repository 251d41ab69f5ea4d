//! Hand-rolled WAV/AIFF/AIFF-C header parsing.
//!
//! Only the chunks needed to locate plain 8/16-bit PCM are interpreted. Any
//! other layout is reported as a [`ParseError`] so the caller can hand the
//! file to the decoder backend instead.

use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::error::ParseError;
use crate::models::{ByteOrder, DataRegion, FormatDescriptor, ParsedHeader, SampleType};

const RIFF: &[u8; 4] = b"RIFF";
const FORM: &[u8; 4] = b"FORM";
const WAVE: &[u8; 4] = b"WAVE";
const AIFF: &[u8; 4] = b"AIFF";
const AIFC: &[u8; 4] = b"AIFC";
const FMT: &[u8; 4] = b"fmt ";
const DATA: &[u8; 4] = b"data";
const COMM: &[u8; 4] = b"COMM";
const SSND: &[u8; 4] = b"SSND";

/// Offset of the first sub-chunk: magic, size and form tag
const FIRST_CHUNK: u64 = 12;
const WAVE_FORMAT_PCM: u16 = 1;
const FMT_MIN_SIZE: u32 = 16;
const COMM_MIN_SIZE: u32 = 18;
/// COMM of AIFF-C adds the compression type and an (empty) name
const COMM_AIFC_MIN_SIZE: u32 = COMM_MIN_SIZE + 4;
const SSND_HEADER_SIZE: u32 = 8;
const F80_BIAS: i32 = 16383;

/// Reads a container header from a seekable source
pub struct FormatParser<'a, R> {
    source: &'a mut R,
    byte_order: ByteOrder,
    file_size: u64,
}

impl<'a, R: Read + Seek> FormatParser<'a, R> {
    /// Parse the header of `source`, leaving the cursor unspecified
    pub fn parse(source: &'a mut R) -> Result<ParsedHeader, ParseError> {
        let file_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut parser = Self {
            source,
            byte_order: ByteOrder::LittleEndian,
            file_size,
        };
        parser.parse_header()
    }

    fn parse_header(&mut self) -> Result<ParsedHeader, ParseError> {
        let magic = self.read_tag()?;
        self.byte_order = match &magic {
            RIFF => ByteOrder::LittleEndian,
            FORM => ByteOrder::BigEndian,
            _ => return Err(ParseError::NotAContainer),
        };

        let declared = self.read_u32()? as u64;
        if declared + 8 != self.file_size {
            return Err(ParseError::SizeMismatch {
                declared,
                actual: self.file_size.saturating_sub(8),
            });
        }

        let form = self.read_tag()?;
        let header = match (self.byte_order, &form) {
            (ByteOrder::LittleEndian, WAVE) => self.parse_wave()?,
            (ByteOrder::BigEndian, AIFF) => self.parse_aiff(false)?,
            (ByteOrder::BigEndian, AIFC) => self.parse_aiff(true)?,
            _ => return Err(ParseError::NotAContainer),
        };

        debug!(
            "Parsed {} header: {}, data at {} ({} bytes, {} ms)",
            if self.byte_order == ByteOrder::LittleEndian { "WAV" } else { "AIFF" },
            header.format.description(),
            header.region.offset,
            header.region.length,
            header.region.duration_ms
        );
        Ok(header)
    }

    fn parse_wave(&mut self) -> Result<ParsedHeader, ParseError> {
        let fmt_size = self.find_chunk(FMT)?;
        if fmt_size < FMT_MIN_SIZE {
            return Err(ParseError::UnsupportedEncoding(format!(
                "fmt chunk of {} bytes",
                fmt_size
            )));
        }

        let format_tag = self.read_u16()?;
        if format_tag != WAVE_FORMAT_PCM {
            return Err(ParseError::UnsupportedEncoding(format!(
                "WAV format tag {:#06x}",
                format_tag
            )));
        }
        let channels = self.read_u16()?;
        let sample_rate = self.read_u32()?;
        // byte rate and block align follow from the other fields
        self.skip(6)?;
        let bits = self.read_u16()?;

        // WAV stores 8-bit samples unsigned and wider ones signed
        let sample_type = match bits {
            8 => SampleType::UnsignedInt,
            16 => SampleType::SignedInt,
            other => return Err(unsupported_bits(other)),
        };
        let format = self.descriptor(sample_rate, channels, bits, sample_type)?;

        let data_size = self.find_chunk(DATA)?;
        let offset = self.position()?;
        let region = DataRegion::new(offset, self.clamp_length(offset, data_size as u64), &format);
        Ok(ParsedHeader { format, region })
    }

    fn parse_aiff(&mut self, compressed: bool) -> Result<ParsedHeader, ParseError> {
        let comm_size = self.find_chunk(COMM)?;
        let min_size = if compressed { COMM_AIFC_MIN_SIZE } else { COMM_MIN_SIZE };
        if comm_size < min_size {
            return Err(ParseError::UnsupportedEncoding(format!(
                "COMM chunk of {} bytes",
                comm_size
            )));
        }

        let channels = self.read_u16()?;
        // number of sample frames; the SSND length is authoritative
        self.skip(4)?;
        let bits = self.read_u16()?;
        if bits != 8 && bits != 16 {
            return Err(unsupported_bits(bits));
        }
        let mut rate = [0u8; 10];
        self.read_bytes(&mut rate)?;
        let sample_rate = decode_f80_rate(&rate)?;
        let mut format = self.descriptor(sample_rate, channels, bits, SampleType::SignedInt)?;
        if compressed {
            format.byte_order = self.aifc_sample_order()?;
        }

        let ssnd_size = self.find_chunk(SSND)?;
        if ssnd_size < SSND_HEADER_SIZE {
            return Err(ParseError::Truncated);
        }
        let data_offset = self.read_u32()?;
        let _block_size = self.read_u32()?;
        let offset = self.position()? + data_offset as u64;
        let length = (ssnd_size - SSND_HEADER_SIZE).saturating_sub(data_offset) as u64;
        let region = DataRegion::new(offset, self.clamp_length(offset, length), &format);
        Ok(ParsedHeader { format, region })
    }

    /// Only the uncompressed AIFF-C encodings are playable natively
    fn aifc_sample_order(&mut self) -> Result<ByteOrder, ParseError> {
        let compression = self.read_tag()?;
        match &compression {
            b"NONE" | b"twos" => Ok(ByteOrder::BigEndian),
            b"sowt" => Ok(ByteOrder::LittleEndian),
            other => Err(ParseError::UnsupportedEncoding(format!(
                "AIFF-C compression '{}'",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    fn descriptor(
        &self,
        sample_rate: u32,
        channels: u16,
        bits: u16,
        sample_type: SampleType,
    ) -> Result<FormatDescriptor, ParseError> {
        if channels == 0 {
            return Err(ParseError::UnsupportedEncoding("zero channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(ParseError::UnsupportedEncoding("zero sample rate".to_string()));
        }
        Ok(FormatDescriptor::new(sample_rate, channels, bits, sample_type, self.byte_order))
    }

    /// Sample data may be declared longer than what was actually written
    fn clamp_length(&self, offset: u64, length: u64) -> u64 {
        length.min(self.file_size.saturating_sub(offset))
    }

    /// Scan sub-chunks from the first one until `id` is found and return its
    /// size, leaving the cursor at the start of its body.
    fn find_chunk(&mut self, id: &[u8; 4]) -> Result<u32, ParseError> {
        self.source.seek(SeekFrom::Start(FIRST_CHUNK))?;
        let not_found = || ParseError::ChunkNotFound {
            chunk: String::from_utf8_lossy(id).into_owned(),
        };

        loop {
            let tag = match self.read_tag() {
                Ok(tag) => tag,
                Err(ParseError::Truncated) => return Err(not_found()),
                Err(e) => return Err(e),
            };
            let size = match self.read_u32() {
                Ok(size) => size,
                Err(ParseError::Truncated) => return Err(not_found()),
                Err(e) => return Err(e),
            };
            if &tag == id {
                return Ok(size);
            }
            debug!("Skipping '{}' chunk ({} bytes)", String::from_utf8_lossy(&tag), size);
            self.skip(size as i64)?;
        }
    }

    fn position(&mut self) -> Result<u64, ParseError> {
        Ok(self.source.stream_position()?)
    }

    fn skip(&mut self, bytes: i64) -> Result<(), ParseError> {
        self.source.seek(SeekFrom::Current(bytes))?;
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), ParseError> {
        self.source.read_exact(buf)?;
        Ok(())
    }

    fn read_tag(&mut self) -> Result<[u8; 4], ParseError> {
        let mut tag = [0u8; 4];
        self.read_bytes(&mut tag)?;
        Ok(tag)
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(match self.byte_order {
            ByteOrder::LittleEndian => u16::from_le_bytes(buf),
            ByteOrder::BigEndian => u16::from_be_bytes(buf),
        })
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(match self.byte_order {
            ByteOrder::LittleEndian => u32::from_le_bytes(buf),
            ByteOrder::BigEndian => u32::from_be_bytes(buf),
        })
    }
}

fn unsupported_bits(bits: u16) -> ParseError {
    ParseError::UnsupportedEncoding(format!("{}-bit samples", bits))
}

/// Decode an AIFF sample rate stored as an 80-bit extended float.
///
/// Layout: sign bit, 15-bit biased exponent, then a 64-bit significand whose
/// top bit is the explicit integer bit.
pub fn decode_f80_rate(bytes: &[u8; 10]) -> Result<u32, ParseError> {
    if bytes[0] & 0x80 != 0 {
        return Err(ParseError::UnsupportedEncoding("negative sample rate".to_string()));
    }
    let exponent = (u16::from_be_bytes([bytes[0], bytes[1]]) & 0x7fff) as i32 - F80_BIAS;

    let mut significand = [0u8; 8];
    significand.copy_from_slice(&bytes[2..]);
    let significand = u64::from_be_bytes(significand);
    if significand & (1 << 63) == 0 {
        return Err(ParseError::UnsupportedEncoding("denormal sample rate".to_string()));
    }
    if !(0..32).contains(&exponent) {
        return Err(ParseError::UnsupportedEncoding(format!(
            "sample rate exponent {} out of range",
            exponent
        )));
    }

    let fraction = (significand & !(1 << 63)) as f64 / 2f64.powi(63);
    let rate = 2f64.powi(exponent) * (1.0 + fraction);
    Ok(rate.round() as u32)
}
