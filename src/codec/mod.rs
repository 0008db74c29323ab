//! Encoding samples to bytes and back.
//!
//! The wire formats live behind two small traits, [`SampleEncoder`] and
//! [`SampleDecoder`]. The pipeline nodes [`AudioEncoder`] and
//! [`AudioDecoder`] wrap them: the encoder is a sink at the end of a chain,
//! the decoder a source at the start of one. Codecs are created by name
//! through a [`CodecRegistry`]:
//!
//! ```
//! use audio_pipe::codec::CodecRegistry;
//! use audio_pipe::{AudioSink, AudioSource, CodecOptions, MockSink};
//!
//! let registry = CodecRegistry::with_builtin();
//! let encoder = registry.create_encoder("RAW", &CodecOptions::new())?;
//! let decoder = registry.create_decoder("RAW", &CodecOptions::new())?;
//!
//! // Loop the encoded bytes straight back into the decoder
//! let dec = decoder.clone();
//! encoder.encoded().connect(move |bytes| dec.write_encoded_samples(bytes));
//!
//! let out = MockSink::new();
//! decoder.register_sink(out.clone());
//! encoder.write_samples(&[0.5, -0.5]);
//! assert_eq!(out.received(), vec![0.5, -0.5]);
//! # Ok::<(), audio_pipe::AudioError>(())
//! ```

mod builtin;
mod decoder;
mod encoder;
mod registry;

use crate::error::AudioError;

pub use builtin::{
    DummyDecoder, DummyEncoder, NullDecoder, NullEncoder, RawDecoder, RawEncoder, S16Decoder,
    S16Encoder,
};
pub use decoder::AudioDecoder;
pub use encoder::AudioEncoder;
pub use registry::{CodecRegistry, KNOWN_CODECS};

/// Turns samples into encoded bytes.
pub trait SampleEncoder {
    /// Codec name, e.g. `"S16"`.
    fn name(&self) -> &'static str;

    /// Encodes `samples`, appending the result to `out`. An encoder working
    /// on fixed frames may keep samples back until a frame is complete.
    fn encode(&mut self, samples: &[f32], out: &mut Vec<u8>);

    /// Emits whatever was kept back. Called when the stream is flushed.
    fn flush(&mut self, _out: &mut Vec<u8>) {}

    /// Applies a codec option. Options the codec does not know are logged
    /// and ignored.
    fn set_option(&mut self, name: &str, value: &str) -> Result<(), AudioError> {
        tracing::warn!(codec = self.name(), option = name, value, "unknown codec option ignored");
        Ok(())
    }
}

/// Turns encoded bytes back into samples.
pub trait SampleDecoder {
    /// Codec name, e.g. `"S16"`.
    fn name(&self) -> &'static str;

    /// Decodes `data`, appending the samples to `out`. Bytes that do not
    /// make up a whole unit are kept for the next call.
    fn decode(&mut self, data: &[u8], out: &mut Vec<f32>);

    /// Applies a codec option. Options the codec does not know are logged
    /// and ignored.
    fn set_option(&mut self, name: &str, value: &str) -> Result<(), AudioError> {
        tracing::warn!(codec = self.name(), option = name, value, "unknown codec option ignored");
        Ok(())
    }
}
