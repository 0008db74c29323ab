use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::codec::SampleDecoder;
use crate::event::Signal;
use crate::sink::AudioSink;
use crate::source::{AudioSource, CallbackSource, SourcePort};

/// Post-processing stages between the decoder and its sink.
struct PostChain {
    feed: Rc<CallbackSource>,
    _head: Rc<dyn AudioSink>,
    _tail: Rc<dyn AudioSource>,
}

/// A source producing the samples decoded from incoming bytes.
///
/// Encoded data arrives at whatever pace the network or file delivers it,
/// so the decoder cannot be held back: [`resume_output`] is ignored and
/// samples the sink refuses are lost. When the sink reports a completed
/// flush, [`all_encoded_samples_flushed`](AudioDecoder::all_encoded_samples_flushed)
/// fires so the far end can be told.
///
/// A chain of nodes may be inserted after the decoder with
/// [`set_post_processing`](AudioDecoder::set_post_processing). Its tail takes
/// over the decoder's source face, so the sink registered on the decoder
/// receives the processed samples.
///
/// [`resume_output`]: AudioSource::resume_output
pub struct AudioDecoder {
    port: SourcePort,
    codec: RefCell<Box<dyn SampleDecoder>>,
    chain: RefCell<Option<PostChain>>,
    all_encoded_samples_flushed: Rc<Signal<()>>,
}

impl AudioDecoder {
    /// Wraps `codec` in a pipeline source.
    pub fn new(codec: Box<dyn SampleDecoder>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SourcePort::new(me.clone()),
            codec: RefCell::new(codec),
            chain: RefCell::new(None),
            all_encoded_samples_flushed: Rc::new(Signal::new()),
        })
    }

    /// Name of the wrapped codec.
    pub fn name(&self) -> &'static str {
        self.codec.borrow().name()
    }

    /// Emitted when every sample decoded before the last
    /// [`flush_encoded_samples`](AudioDecoder::flush_encoded_samples) has
    /// been played out.
    pub fn all_encoded_samples_flushed(&self) -> &Signal<()> {
        &self.all_encoded_samples_flushed
    }

    /// Decodes `data` and writes the samples downstream.
    pub fn write_encoded_samples(&self, data: &[u8]) {
        let mut samples = Vec::new();
        self.codec.borrow_mut().decode(data, &mut samples);
        if samples.is_empty() {
            return;
        }

        let feed = self.chain.borrow().as_ref().map(|chain| chain.feed.clone());
        let written = match feed {
            Some(feed) => feed.write_samples(&samples),
            None => self.port.sink_write_samples(&samples),
        };
        if written < samples.len() {
            tracing::trace!(
                codec = self.name(),
                dropped = samples.len() - written,
                "decoded samples not accepted"
            );
        }
    }

    /// Marks the end of a stream: flushes downstream.
    pub fn flush_encoded_samples(&self) {
        let feed = self.chain.borrow().as_ref().map(|chain| chain.feed.clone());
        match feed {
            Some(feed) => feed.flush_samples(),
            None => self.port.sink_flush_samples(),
        }
    }

    /// Inserts the chain running from `head` to `tail` after the decoder.
    ///
    /// Replaces any previous chain. Returns `false` if the tail cannot take
    /// over the current sink registration.
    pub fn set_post_processing(&self, head: Rc<dyn AudioSink>, tail: Rc<dyn AudioSource>) -> bool {
        self.clear_post_processing();

        let feed = CallbackSource::new();
        if !feed.register_sink(head.clone()) || !self.port.set_handler(tail.clone()) {
            return false;
        }
        let signal = Rc::clone(&self.all_encoded_samples_flushed);
        feed.samples_flushed().connect(move |_| signal.emit(&()));

        *self.chain.borrow_mut() = Some(PostChain {
            feed,
            _head: head,
            _tail: tail,
        });
        true
    }

    /// Removes the post-processing chain; samples go straight to the sink
    /// again.
    pub fn clear_post_processing(&self) {
        self.port.clear_handler();
        let chain = self.chain.borrow_mut().take();
        drop(chain);
    }
}

impl AudioSource for AudioDecoder {
    fn source_port(&self) -> &SourcePort {
        &self.port
    }

    fn resume_output(&self) {
        if let Some(handler) = self.port.handler() {
            handler.resume_output();
        }
    }

    fn all_samples_flushed(&self) {
        match self.port.handler() {
            Some(handler) => handler.source_port().handle_all_samples_flushed(),
            None => self.all_encoded_samples_flushed.emit(&()),
        }
    }
}

impl fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("codec", &self.name())
            .field("port", &self.port)
            .field("post_processing", &self.chain.borrow().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NullDecoder, RawDecoder, RawEncoder, SampleEncoder};
    use crate::dsp::Amplifier;
    use crate::pipeline::AudioProcessor;
    use crate::sink::MockSink;
    use std::cell::Cell;

    fn raw(samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        RawEncoder.encode(samples, &mut bytes);
        bytes
    }

    #[test]
    fn test_decodes_to_sink() {
        let decoder = AudioDecoder::new(Box::new(NullDecoder::default()));
        let output = MockSink::new();
        decoder.register_sink(output.clone());

        decoder.write_encoded_samples(&160u16.to_le_bytes());
        assert_eq!(output.received(), vec![0.0; 160]);
    }

    #[test]
    fn test_refused_samples_are_dropped() {
        let decoder = AudioDecoder::new(Box::new(RawDecoder::default()));
        let output = MockSink::limited(1);
        decoder.register_sink(output.clone());

        decoder.write_encoded_samples(&raw(&[0.1, 0.2, 0.3]));
        output.resume();
        assert_eq!(output.received(), vec![0.1]);
    }

    #[test]
    fn test_flush_completion_signal() {
        let decoder = AudioDecoder::new(Box::new(RawDecoder::default()));
        let output = MockSink::new();
        output.set_manual_flush(true);
        decoder.register_sink(output.clone());

        let flushed = Rc::new(Cell::new(0));
        let count = flushed.clone();
        decoder
            .all_encoded_samples_flushed()
            .connect(move |_| count.set(count.get() + 1));

        decoder.write_encoded_samples(&raw(&[0.5]));
        decoder.flush_encoded_samples();
        assert_eq!(flushed.get(), 0);
        output.complete_flush();
        assert_eq!(flushed.get(), 1);
    }

    #[test]
    fn test_post_processing_chain() {
        let decoder = AudioDecoder::new(Box::new(RawDecoder::default()));
        let output = MockSink::new();
        decoder.register_sink(output.clone());

        let amp = AudioProcessor::new(Amplifier::new(20.0));
        assert!(decoder.set_post_processing(amp.clone(), amp.clone()));
        assert!(amp.has_sink());

        let flushed = Rc::new(Cell::new(false));
        let flag = flushed.clone();
        decoder
            .all_encoded_samples_flushed()
            .connect(move |_| flag.set(true));

        decoder.write_encoded_samples(&raw(&[0.01, -0.02]));
        let received = output.received();
        assert!((received[0] - 0.1).abs() < 1e-6);
        assert!((received[1] + 0.2).abs() < 1e-6);

        decoder.flush_encoded_samples();
        assert!(flushed.get());

        decoder.clear_post_processing();
        assert!(!amp.has_sink());
        decoder.write_encoded_samples(&raw(&[0.01]));
        assert_eq!(output.received().len(), 3);
        assert_eq!(output.received()[2], 0.01);
    }
}
