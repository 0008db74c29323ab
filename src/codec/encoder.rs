use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::codec::SampleEncoder;
use crate::event::Signal;
use crate::sink::{AudioSink, SinkPort};

/// A sink that encodes everything written to it.
///
/// The encoder always accepts every sample. Encoded bytes are handed out
/// through the [`encoded`](AudioEncoder::encoded) signal. A flush request
/// from upstream is passed on through
/// [`flush_requested`](AudioEncoder::flush_requested); once the receiving
/// end has played out the data, it calls
/// [`all_encoded_samples_flushed`](AudioEncoder::all_encoded_samples_flushed)
/// to complete the flush upstream.
pub struct AudioEncoder {
    port: SinkPort,
    codec: RefCell<Box<dyn SampleEncoder>>,
    encoded: Signal<Vec<u8>>,
    flush_requested: Signal<()>,
}

impl AudioEncoder {
    /// Wraps `codec` in a pipeline sink.
    pub fn new(codec: Box<dyn SampleEncoder>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SinkPort::new(me.clone()),
            codec: RefCell::new(codec),
            encoded: Signal::new(),
            flush_requested: Signal::new(),
        })
    }

    /// Name of the wrapped codec.
    pub fn name(&self) -> &'static str {
        self.codec.borrow().name()
    }

    /// Emitted with each block of encoded bytes.
    pub fn encoded(&self) -> &Signal<Vec<u8>> {
        &self.encoded
    }

    /// Emitted when upstream asks for a flush, after any held-back data has
    /// been encoded.
    pub fn flush_requested(&self) -> &Signal<()> {
        &self.flush_requested
    }

    /// Completes the pending flush upstream.
    pub fn all_encoded_samples_flushed(&self) {
        self.port.source_all_samples_flushed();
    }

    fn emit_encoded(&self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            tracing::trace!(codec = self.name(), bytes = bytes.len(), "encoded block");
            self.encoded.emit(&bytes);
        }
    }
}

impl AudioSink for AudioEncoder {
    fn sink_port(&self) -> &SinkPort {
        &self.port
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        let mut bytes = Vec::new();
        self.codec.borrow_mut().encode(samples, &mut bytes);
        self.emit_encoded(bytes);
        samples.len()
    }

    fn flush_samples(&self) {
        let mut bytes = Vec::new();
        self.codec.borrow_mut().flush(&mut bytes);
        self.emit_encoded(bytes);
        self.flush_requested.emit(&());
    }
}

impl fmt::Debug for AudioEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEncoder")
            .field("codec", &self.name())
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
