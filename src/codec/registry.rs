use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::codec::builtin::{
    DummyDecoder, DummyEncoder, NullDecoder, NullEncoder, RawDecoder, RawEncoder, S16Decoder,
    S16Encoder,
};
use crate::codec::{AudioDecoder, AudioEncoder, SampleDecoder, SampleEncoder};
use crate::config::CodecOptions;
use crate::error::AudioError;

/// Codec names the registry recognises. Those without a built-in
/// implementation need a constructor registered by the application.
pub const KNOWN_CODECS: &[&str] = &["NULL", "RAW", "S16", "DUMMY", "GSM", "SPEEX", "OPUS"];

type EncoderCtor = Rc<dyn Fn() -> Box<dyn SampleEncoder>>;
type DecoderCtor = Rc<dyn Fn() -> Box<dyn SampleDecoder>>;

/// Creates encoders and decoders by name.
///
/// # Example
///
/// ```
/// use audio_pipe::codec::{CodecRegistry, S16Decoder, S16Encoder};
/// use audio_pipe::{AudioError, CodecOptions};
///
/// let mut registry = CodecRegistry::with_builtin();
/// assert!(!registry.is_available("OPUS"));
/// assert!(matches!(
///     registry.create_encoder("OPUS", &CodecOptions::new()),
///     Err(AudioError::CodecUnavailable { .. })
/// ));
///
/// // Bindings to an external library would be registered the same way
/// registry.register_encoder("OPUS", || Box::new(S16Encoder::default()));
/// registry.register_decoder("OPUS", || Box::new(S16Decoder::default()));
/// assert!(registry.is_available("OPUS"));
/// ```
#[derive(Default)]
pub struct CodecRegistry {
    encoders: BTreeMap<String, EncoderCtor>,
    decoders: BTreeMap<String, DecoderCtor>,
}

impl CodecRegistry {
    /// Creates a registry with no codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `NULL`, `RAW`, `S16` and `DUMMY`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_encoder("NULL", || Box::new(NullEncoder));
        registry.register_decoder("NULL", || Box::new(NullDecoder::default()));
        registry.register_encoder("RAW", || Box::new(RawEncoder));
        registry.register_decoder("RAW", || Box::new(RawDecoder::default()));
        registry.register_encoder("S16", || Box::new(S16Encoder::default()));
        registry.register_decoder("S16", || Box::new(S16Decoder::default()));
        registry.register_encoder("DUMMY", || Box::new(DummyEncoder));
        registry.register_decoder("DUMMY", || Box::new(DummyDecoder));
        registry
    }

    /// Registers an encoder constructor, replacing any previous one.
    pub fn register_encoder<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn SampleEncoder> + 'static,
    {
        self.encoders.insert(name.to_ascii_uppercase(), Rc::new(ctor));
    }

    /// Registers a decoder constructor, replacing any previous one.
    pub fn register_decoder<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn SampleDecoder> + 'static,
    {
        self.decoders.insert(name.to_ascii_uppercase(), Rc::new(ctor));
    }

    /// Returns `true` if both an encoder and a decoder can be created for
    /// `name`.
    pub fn is_available(&self, name: &str) -> bool {
        let name = name.to_ascii_uppercase();
        self.encoders.contains_key(&name) && self.decoders.contains_key(&name)
    }

    /// Creates an encoder and applies `options` to it.
    pub fn create_encoder(
        &self,
        name: &str,
        options: &CodecOptions,
    ) -> Result<Rc<AudioEncoder>, AudioError> {
        let ctor = lookup(&self.encoders, name)?;
        let mut codec = ctor();
        for (option, value) in options.iter() {
            codec.set_option(option, value)?;
        }
        tracing::debug!(codec = codec.name(), "encoder created");
        Ok(AudioEncoder::new(codec))
    }

    /// Creates a decoder and applies `options` to it.
    pub fn create_decoder(
        &self,
        name: &str,
        options: &CodecOptions,
    ) -> Result<Rc<AudioDecoder>, AudioError> {
        let ctor = lookup(&self.decoders, name)?;
        let mut codec = ctor();
        for (option, value) in options.iter() {
            codec.set_option(option, value)?;
        }
        tracing::debug!(codec = codec.name(), "decoder created");
        Ok(AudioDecoder::new(codec))
    }
}

fn lookup<'a, C>(table: &'a BTreeMap<String, C>, name: &str) -> Result<&'a C, AudioError> {
    let key = name.to_ascii_uppercase();
    if let Some(ctor) = table.get(&key) {
        return Ok(ctor);
    }
    if KNOWN_CODECS.contains(&key.as_str()) {
        Err(AudioError::CodecUnavailable { name: key })
    } else {
        Err(AudioError::UnknownCodec {
            name: name.to_string(),
        })
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{AudioSink, MockSink};
    use crate::source::AudioSource;
    use std::cell::RefCell;

    #[test]
    fn test_builtin_codecs_available() {
        let registry = CodecRegistry::with_builtin();
        for name in ["NULL", "RAW", "S16", "DUMMY", "s16"] {
            assert!(registry.is_available(name), "{name}");
        }
        for name in ["GSM", "SPEEX", "OPUS", "AMR"] {
            assert!(!registry.is_available(name), "{name}");
        }
    }

    #[test]
    fn test_unknown_and_unavailable() {
        let registry = CodecRegistry::with_builtin();
        let options = CodecOptions::new();
        assert!(matches!(
            registry.create_decoder("AMR", &options),
            Err(AudioError::UnknownCodec { .. })
        ));
        assert!(matches!(
            registry.create_decoder("gsm", &options),
            Err(AudioError::CodecUnavailable { ref name }) if name == "GSM"
        ));
    }

    #[test]
    fn test_options_are_applied() {
        let registry = CodecRegistry::with_builtin();
        let options: CodecOptions = [("FRAME_SIZE", "160"), ("UNHEARD_OF", "1")]
            .into_iter()
            .collect();
        let encoder = registry.create_encoder("S16", &options).unwrap();

        let packets = Rc::new(RefCell::new(Vec::new()));
        let sink = packets.clone();
        encoder
            .encoded()
            .connect(move |bytes| sink.borrow_mut().push(bytes.len()));

        encoder.write_samples(&[0.0; 400]);
        encoder.flush_samples();
        assert_eq!(*packets.borrow(), vec![640, 160]);

        let bad: CodecOptions = [("FRAME_SIZE", "-1")].into_iter().collect();
        assert!(matches!(
            registry.create_encoder("S16", &bad),
            Err(AudioError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_null_codec_end_to_end() {
        let registry = CodecRegistry::with_builtin();
        let encoder = registry.create_encoder("NULL", &CodecOptions::new()).unwrap();
        let decoder = registry.create_decoder("NULL", &CodecOptions::new()).unwrap();
        let output = MockSink::new();
        decoder.register_sink(output.clone());

        let dec = decoder.clone();
        encoder
            .encoded()
            .connect(move |bytes| dec.write_encoded_samples(bytes));
        encoder.write_samples(&[0.9; 240]);
        assert_eq!(output.received(), vec![0.0; 240]);
    }
}
