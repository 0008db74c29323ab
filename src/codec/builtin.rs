//! Codecs that need no external library.

use crate::codec::{SampleDecoder, SampleEncoder};
use crate::error::AudioError;
use crate::format::{f32_to_i16, i16_to_f32};

/// Splits `pending + data` into `N`-byte units, keeping any tail for later.
fn for_each_unit<const N: usize>(pending: &mut Vec<u8>, data: &[u8], mut unit: impl FnMut([u8; N])) {
    pending.extend_from_slice(data);
    let mut chunks = pending.chunks_exact(N);
    for chunk in &mut chunks {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(chunk);
        unit(bytes);
    }
    let whole = pending.len() - chunks.remainder().len();
    pending.drain(..whole);
}

/// Sends only the number of samples, as little-endian `u16` counts.
///
/// Useful for keeping a link's timing alive without transferring audio.
#[derive(Debug, Default)]
pub struct NullEncoder;

impl SampleEncoder for NullEncoder {
    fn name(&self) -> &'static str {
        "NULL"
    }

    fn encode(&mut self, samples: &[f32], out: &mut Vec<u8>) {
        let mut count = samples.len();
        while count > 0 {
            let n = count.min(usize::from(u16::MAX));
            out.extend_from_slice(&(n as u16).to_le_bytes());
            count -= n;
        }
    }
}

/// Turns sample counts back into silence.
#[derive(Debug, Default)]
pub struct NullDecoder {
    pending: Vec<u8>,
}

impl SampleDecoder for NullDecoder {
    fn name(&self) -> &'static str {
        "NULL"
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<f32>) {
        for_each_unit::<2>(&mut self.pending, data, |bytes| {
            let count = usize::from(u16::from_le_bytes(bytes));
            out.resize(out.len() + count, 0.0);
        });
    }
}

/// Native `f32` samples, little-endian.
#[derive(Debug, Default)]
pub struct RawEncoder;

impl SampleEncoder for RawEncoder {
    fn name(&self) -> &'static str {
        "RAW"
    }

    fn encode(&mut self, samples: &[f32], out: &mut Vec<u8>) {
        out.reserve(samples.len() * 4);
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

/// Decoder for [`RawEncoder`] output.
#[derive(Debug, Default)]
pub struct RawDecoder {
    pending: Vec<u8>,
}

impl SampleDecoder for RawDecoder {
    fn name(&self) -> &'static str {
        "RAW"
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<f32>) {
        for_each_unit::<4>(&mut self.pending, data, |bytes| {
            out.push(f32::from_le_bytes(bytes));
        });
    }
}

/// 16-bit signed PCM, little-endian.
///
/// With the `FRAME_SIZE` option set, output is produced in frames of that
/// many samples; the last partial frame is sent on flush.
#[derive(Debug, Default)]
pub struct S16Encoder {
    frame_size: usize,
    frame: Vec<f32>,
}

impl S16Encoder {
    fn write_pcm(samples: &[f32], out: &mut Vec<u8>) {
        out.reserve(samples.len() * 2);
        for &sample in samples {
            out.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
        }
    }
}

impl SampleEncoder for S16Encoder {
    fn name(&self) -> &'static str {
        "S16"
    }

    fn encode(&mut self, samples: &[f32], out: &mut Vec<u8>) {
        if self.frame_size == 0 {
            Self::write_pcm(samples, out);
            return;
        }
        self.frame.extend_from_slice(samples);
        let whole = self.frame.len() / self.frame_size * self.frame_size;
        Self::write_pcm(&self.frame[..whole], out);
        self.frame.drain(..whole);
    }

    fn flush(&mut self, out: &mut Vec<u8>) {
        Self::write_pcm(&self.frame, out);
        self.frame.clear();
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<(), AudioError> {
        match name {
            "FRAME_SIZE" => {
                self.frame_size = value
                    .trim()
                    .parse()
                    .map_err(|_| AudioError::invalid_option(name, value))?;
                Ok(())
            }
            _ => {
                tracing::warn!(codec = "S16", option = name, value, "unknown codec option ignored");
                Ok(())
            }
        }
    }
}

/// Decoder for [`S16Encoder`] output.
#[derive(Debug, Default)]
pub struct S16Decoder {
    pending: Vec<u8>,
}

impl SampleDecoder for S16Decoder {
    fn name(&self) -> &'static str {
        "S16"
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<f32>) {
        for_each_unit::<2>(&mut self.pending, data, |bytes| {
            out.push(i16_to_f32(i16::from_le_bytes(bytes)));
        });
    }
}

/// Swallows everything.
#[derive(Debug, Default)]
pub struct DummyEncoder;

impl SampleEncoder for DummyEncoder {
    fn name(&self) -> &'static str {
        "DUMMY"
    }

    fn encode(&mut self, _samples: &[f32], _out: &mut Vec<u8>) {}
}

/// Produces nothing.
#[derive(Debug, Default)]
pub struct DummyDecoder;

impl SampleDecoder for DummyDecoder {
    fn name(&self) -> &'static str {
        "DUMMY"
    }

    fn decode(&mut self, _data: &[u8], _out: &mut Vec<f32>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_codec_carries_counts_only() {
        let mut out = Vec::new();
        NullEncoder.encode(&[0.7; 70_000], &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), u16::MAX);

        let mut samples = Vec::new();
        NullDecoder::default().decode(&out, &mut samples);
        assert_eq!(samples.len(), 70_000);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_raw_decoder_reassembles_split_units() {
        let mut bytes = Vec::new();
        RawEncoder.encode(&[0.25, -1.5], &mut bytes);

        let mut decoder = RawDecoder::default();
        let mut samples = Vec::new();
        decoder.decode(&bytes[..3], &mut samples);
        assert!(samples.is_empty());
        decoder.decode(&bytes[3..], &mut samples);
        assert_eq!(samples, vec![0.25, -1.5]);
    }

    #[test]
    fn test_s16_pcm_layout() {
        let mut bytes = Vec::new();
        S16Encoder::default().encode(&[1.0, -1.0, 0.0], &mut bytes);
        assert_eq!(bytes, vec![0xff, 0x7f, 0x01, 0x80, 0x00, 0x00]);

        let mut samples = Vec::new();
        S16Decoder::default().decode(&bytes, &mut samples);
        assert_eq!(samples[2], 0.0);
        assert!((samples[0] - 1.0).abs() < 1e-4);
        assert!((samples[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_s16_frames_and_flush() {
        let mut encoder = S16Encoder::default();
        encoder.set_option("FRAME_SIZE", "4").unwrap();

        let mut out = Vec::new();
        encoder.encode(&[0.0; 6], &mut out);
        assert_eq!(out.len(), 8);
        encoder.encode(&[0.0; 1], &mut out);
        assert_eq!(out.len(), 8);
        encoder.flush(&mut out);
        assert_eq!(out.len(), 14);
    }

    #[test]
    fn test_options() {
        let mut encoder = S16Encoder::default();
        let err = encoder.set_option("FRAME_SIZE", "big").unwrap_err();
        assert!(matches!(err, AudioError::InvalidOption { .. }));
        assert!(encoder.set_option("BITRATE", "8000").is_ok());
        assert!(RawEncoder.set_option("QUALITY", "3").is_ok());
    }
}
