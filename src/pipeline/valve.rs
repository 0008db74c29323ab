//! A node that can cut an audio stream.

use std::cell::Cell;
use std::rc::Rc;

use crate::sink::{AudioSink, SinkPort};
use crate::source::{AudioSource, SourcePort};

/// Opens and closes a stream.
///
/// While open, everything is forwarded. Closing the valve flushes
/// downstream. While closed, writes are either discarded (all samples
/// accepted) or blocked (none accepted) depending on
/// [`set_block_when_closed`](AudioValve::set_block_when_closed).
///
/// A flush arriving while closed completes at once in discarding mode. In
/// blocking mode it completes after the valve is reopened, once downstream
/// has flushed.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSource, AudioValve, MockSink, MockSource};
///
/// let mic = MockSource::new(8000);
/// let valve = AudioValve::new(false);
/// let out = MockSink::new();
/// mic.register_sink(valve.clone());
/// valve.register_sink(out.clone());
///
/// valve.set_open(false);
/// mic.add_samples(&[0.5; 4]);
/// mic.pump();
/// assert!(out.received().is_empty());
/// ```
#[derive(Debug)]
pub struct AudioValve {
    source: SourcePort,
    sink: SinkPort,
    is_open: Cell<bool>,
    block_when_closed: Cell<bool>,
    flush_pending: Cell<bool>,
    downstream_flushed: Cell<bool>,
}

impl AudioValve {
    /// Creates an open valve.
    pub fn new(block_when_closed: bool) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            source: SourcePort::new(me.clone()),
            sink: SinkPort::new(me.clone()),
            is_open: Cell::new(true),
            block_when_closed: Cell::new(block_when_closed),
            flush_pending: Cell::new(false),
            downstream_flushed: Cell::new(false),
        })
    }

    /// Returns `true` if samples pass.
    pub fn is_open(&self) -> bool {
        self.is_open.get()
    }

    /// Opens or closes the valve.
    pub fn set_open(&self, do_open: bool) {
        if self.is_open.replace(do_open) == do_open {
            return;
        }
        tracing::debug!(open = do_open, "valve state changed");

        if do_open {
            self.sink.source_resume_output();
            if self.flush_pending.get() && self.downstream_flushed.get() {
                self.complete_flush();
            }
        } else {
            self.downstream_flushed.set(false);
            self.source.sink_flush_samples();
            if !self.block_when_closed.get() {
                if self.flush_pending.get() {
                    self.complete_flush();
                }
                self.sink.source_resume_output();
            }
        }
    }

    /// Chooses between blocking and discarding while closed.
    pub fn set_block_when_closed(&self, block: bool) {
        if self.block_when_closed.replace(block) == block || block || self.is_open.get() {
            return;
        }
        // Switched to discarding while closed: nothing holds the input back
        if self.flush_pending.get() {
            self.complete_flush();
        }
        self.sink.source_resume_output();
    }

    fn complete_flush(&self) {
        self.flush_pending.set(false);
        self.sink.source_all_samples_flushed();
    }
}

impl AudioSink for AudioValve {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.flush_pending.set(false);
        if self.is_open.get() {
            self.source.sink_write_samples(samples)
        } else if self.block_when_closed.get() {
            0
        } else {
            samples.len()
        }
    }

    fn flush_samples(&self) {
        self.flush_pending.set(true);
        if self.is_open.get() {
            self.source.sink_flush_samples();
        } else if !self.block_when_closed.get() {
            self.complete_flush();
        }
    }
}

impl AudioSource for AudioValve {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }

    fn resume_output(&self) {
        if self.is_open.get() {
            self.sink.source_resume_output();
        }
    }

    fn all_samples_flushed(&self) {
        if self.is_open.get() {
            if self.flush_pending.get() {
                self.complete_flush();
            }
        } else {
            self.downstream_flushed.set(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;
    use crate::source::MockSource;

    fn wire(block: bool) -> (Rc<MockSource>, Rc<AudioValve>, Rc<MockSink>) {
        let input = MockSource::new(8000);
        let valve = AudioValve::new(block);
        let output = MockSink::new();
        input.register_sink(valve.clone());
        valve.register_sink(output.clone());
        (input, valve, output)
    }

    #[test]
    fn test_open_valve_forwards() {
        let (input, valve, output) = wire(false);
        assert!(valve.is_open());
        input.add_samples(&[0.1, 0.2]);
        input.pump();
        input.flush();
        assert_eq!(output.received(), vec![0.1, 0.2]);
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_closing_flushes_downstream() {
        let (_input, valve, output) = wire(false);
        valve.set_open(false);
        assert_eq!(output.flush_requests(), 1);
    }

    #[test]
    fn test_closed_discarding_valve_accepts_and_completes_flush() {
        let (input, valve, output) = wire(false);
        valve.set_open(false);
        assert_eq!(input.offer(&[0.3; 5]), 5);
        input.flush();
        assert_eq!(input.flushes_completed(), 1);
        assert!(output.received().is_empty());
    }

    #[test]
    fn test_closed_blocking_valve_holds_flush_until_open() {
        let (input, valve, output) = wire(true);
        valve.set_open(false);
        assert_eq!(input.offer(&[0.3; 5]), 0);

        input.flush();
        assert_eq!(input.flushes_completed(), 0);

        valve.set_open(true);
        assert_eq!(input.flushes_completed(), 1);
        assert_eq!(output.flush_requests(), 1);
    }

    #[test]
    fn test_blocked_input_resumes_on_open() {
        let (input, valve, output) = wire(true);
        valve.set_open(false);
        input.add_samples(&[0.7; 3]);
        input.pump();
        assert_eq!(input.queued(), 3);

        valve.set_open(true);
        assert_eq!(input.queued(), 0);
        assert_eq!(output.received(), vec![0.7; 3]);
    }

    #[test]
    fn test_switch_to_discarding_releases_input() {
        let (input, valve, _output) = wire(true);
        valve.set_open(false);
        input.add_samples(&[0.7; 3]);
        input.pump();

        valve.set_block_when_closed(false);
        assert_eq!(input.queued(), 0);
    }
}
