//! Sink adapter that hands samples to application code.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::event::Signal;
use crate::sink::{AudioSink, SinkPort};

type Writer = Rc<dyn Fn(&[f32]) -> usize>;

/// An [`AudioSink`] terminating a chain in application code.
///
/// Written samples go to the closure installed with
/// [`set_writer`](CallbackSink::set_writer), which returns how many it took.
/// Without a writer everything is accepted and dropped. Flush requests are
/// announced on [`flush_requested`](CallbackSink::flush_requested); the
/// application answers them with
/// [`all_samples_flushed`](CallbackSink::all_samples_flushed).
pub struct CallbackSink {
    port: SinkPort,
    writer: RefCell<Option<Writer>>,
    flush_requested: Signal<()>,
}

impl CallbackSink {
    /// Creates a sink without a writer.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SinkPort::new(me.clone()),
            writer: RefCell::new(None),
            flush_requested: Signal::new(),
        })
    }

    /// Installs the closure receiving written samples.
    pub fn set_writer<F>(&self, writer: F)
    where
        F: Fn(&[f32]) -> usize + 'static,
    {
        *self.writer.borrow_mut() = Some(Rc::new(writer));
    }

    /// Emitted when the source asks for a flush.
    pub fn flush_requested(&self) -> &Signal<()> {
        &self.flush_requested
    }

    /// Tells the source that more samples can be written.
    pub fn resume_output(&self) {
        self.port.source_resume_output();
    }

    /// Tells the source that the requested flush has completed.
    pub fn all_samples_flushed(&self) {
        self.port.source_all_samples_flushed();
    }
}

impl AudioSink for CallbackSink {
    fn sink_port(&self) -> &SinkPort {
        &self.port
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        let writer = self.writer.borrow().clone();
        match writer {
            Some(writer) => writer(samples),
            None => samples.len(),
        }
    }

    fn flush_samples(&self) {
        self.flush_requested.emit(&());
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("port", &self.port)
            .field("has_writer", &self.writer.borrow().is_some())
            .field("flush_requested", &self.flush_requested)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AudioSource, CallbackSource};
    use std::cell::Cell;

    #[test]
    fn test_writer_decides_accepted_count() {
        let output = CallbackSink::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        output.set_writer(move |samples| {
            log.borrow_mut().extend_from_slice(&samples[..1]);
            1
        });

        let input = CallbackSource::new();
        input.register_sink(output.clone());
        assert_eq!(input.write_samples(&[0.3, 0.4]), 1);
        assert_eq!(*seen.borrow(), vec![0.3]);
    }

    #[test]
    fn test_without_writer_discards() {
        let output = CallbackSink::new();
        assert_eq!(output.write_samples(&[0.0; 8]), 8);
    }

    #[test]
    fn test_flush_round_trip() {
        let output = CallbackSink::new();
        let input = CallbackSource::new();
        input.register_sink(output.clone());

        let requests = Rc::new(Cell::new(0));
        let r = requests.clone();
        output.flush_requested().connect(move |_| r.set(r.get() + 1));
        let flushed = Rc::new(Cell::new(false));
        let f = flushed.clone();
        input.samples_flushed().connect(move |_| f.set(true));

        input.flush_samples();
        assert_eq!(requests.get(), 1);
        assert!(!flushed.get());

        output.all_samples_flushed();
        assert!(flushed.get());
    }
}
