//! Source adapter driven by application code.

use std::rc::Rc;

use crate::event::Signal;
use crate::source::{AudioSource, SourcePort};

/// An [`AudioSource`] fed by the application.
///
/// Application code calls [`write_samples`](CallbackSource::write_samples)
/// and [`flush_samples`](CallbackSource::flush_samples); the downstream
/// notifications come back through the
/// [`output_resumed`](CallbackSource::output_resumed) and
/// [`samples_flushed`](CallbackSource::samples_flushed) signals.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSource, CallbackSource, MockSink};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let input = CallbackSource::new();
/// let sink = MockSink::new();
/// input.register_sink(sink.clone());
///
/// let flushed = Rc::new(Cell::new(false));
/// let done = flushed.clone();
/// input.samples_flushed().connect(move |_| done.set(true));
///
/// assert_eq!(input.write_samples(&[0.5; 4]), 4);
/// input.flush_samples();
/// assert!(flushed.get());
/// ```
#[derive(Debug)]
pub struct CallbackSource {
    port: SourcePort,
    output_resumed: Signal<()>,
    samples_flushed: Signal<()>,
}

impl CallbackSource {
    /// Creates an unconnected source.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SourcePort::new(me.clone()),
            output_resumed: Signal::new(),
            samples_flushed: Signal::new(),
        })
    }

    /// Writes samples downstream and returns how many were accepted.
    pub fn write_samples(&self, samples: &[f32]) -> usize {
        self.port.sink_write_samples(samples)
    }

    /// Requests a flush downstream.
    pub fn flush_samples(&self) {
        self.port.sink_flush_samples();
    }

    /// Returns `true` while a flush is outstanding.
    pub fn is_flushing(&self) -> bool {
        self.port.is_flushing()
    }

    /// Emitted when the sink can take more samples.
    pub fn output_resumed(&self) -> &Signal<()> {
        &self.output_resumed
    }

    /// Emitted when a flush has completed.
    pub fn samples_flushed(&self) -> &Signal<()> {
        &self.samples_flushed
    }
}

impl AudioSource for CallbackSource {
    fn source_port(&self) -> &SourcePort {
        &self.port
    }

    fn resume_output(&self) {
        self.output_resumed.emit(&());
    }

    fn all_samples_flushed(&self) {
        self.samples_flushed.emit(&());
    }
}
