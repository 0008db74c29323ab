//! Recording sink for tests and demos.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::sink::{AudioSink, SinkPort};

/// A sink that records every sample it accepts.
///
/// It can be throttled with an accept limit: a write offering more than the
/// limit takes only `limit` samples, after which the sink stays stalled
/// (accepting nothing) until [`resume`](MockSink::resume) is called. Flushes
/// complete immediately unless manual flushing is enabled, in which case
/// [`complete_flush`](MockSink::complete_flush) finishes them.
#[derive(Debug)]
pub struct MockSink {
    port: SinkPort,
    received: RefCell<Vec<f32>>,
    accept_limit: Cell<Option<usize>>,
    stalled: Cell<bool>,
    manual_flush: Cell<bool>,
    flush_pending: Cell<bool>,
    flush_requests: Cell<usize>,
    write_calls: Cell<usize>,
    drop_counter: Option<Rc<Cell<usize>>>,
}

impl MockSink {
    /// Creates a sink that accepts everything.
    pub fn new() -> Rc<Self> {
        Self::build(None, None)
    }

    /// Creates a sink accepting at most `limit` samples per write.
    pub fn limited(limit: usize) -> Rc<Self> {
        Self::build(Some(limit), None)
    }

    /// Creates a sink that increments `counter` when it is dropped.
    pub fn with_drop_counter(counter: Rc<Cell<usize>>) -> Rc<Self> {
        Self::build(None, Some(counter))
    }

    fn build(accept_limit: Option<usize>, drop_counter: Option<Rc<Cell<usize>>>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SinkPort::new(me.clone()),
            received: RefCell::new(Vec::new()),
            accept_limit: Cell::new(accept_limit),
            stalled: Cell::new(false),
            manual_flush: Cell::new(false),
            flush_pending: Cell::new(false),
            flush_requests: Cell::new(0),
            write_calls: Cell::new(0),
            drop_counter,
        })
    }

    /// Changes the per-write accept limit. `None` accepts everything.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        self.accept_limit.set(limit);
    }

    /// When enabled, flush requests stay pending until
    /// [`complete_flush`](MockSink::complete_flush).
    pub fn set_manual_flush(&self, manual: bool) {
        self.manual_flush.set(manual);
    }

    /// Clears the stall and resumes the source.
    pub fn resume(&self) {
        self.stalled.set(false);
        self.port.source_resume_output();
    }

    /// Completes a pending flush. Returns `false` if none was pending.
    pub fn complete_flush(&self) -> bool {
        if !self.flush_pending.replace(false) {
            return false;
        }
        self.port.source_all_samples_flushed();
        true
    }

    /// Returns `true` if a flush request has not been completed yet.
    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }

    /// Returns `true` after a partial accept until [`resume`](MockSink::resume).
    pub fn is_stalled(&self) -> bool {
        self.stalled.get()
    }

    /// All samples accepted so far.
    pub fn received(&self) -> Vec<f32> {
        self.received.borrow().clone()
    }

    /// Takes the accepted samples, clearing the record.
    pub fn take_received(&self) -> Vec<f32> {
        std::mem::take(&mut *self.received.borrow_mut())
    }

    /// Number of flush requests seen.
    pub fn flush_requests(&self) -> usize {
        self.flush_requests.get()
    }

    /// Number of write calls seen, including refused ones.
    pub fn write_calls(&self) -> usize {
        self.write_calls.get()
    }
}

impl AudioSink for MockSink {
    fn sink_port(&self) -> &SinkPort {
        &self.port
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.write_calls.set(self.write_calls.get() + 1);
        self.flush_pending.set(false);
        if self.stalled.get() {
            return 0;
        }

        let count = self
            .accept_limit
            .get()
            .map_or(samples.len(), |limit| limit.min(samples.len()));
        self.received
            .borrow_mut()
            .extend_from_slice(&samples[..count]);
        if count < samples.len() {
            self.stalled.set(true);
        }
        count
    }

    fn flush_samples(&self) {
        self.flush_requests.set(self.flush_requests.get() + 1);
        if self.manual_flush.get() {
            self.flush_pending.set(true);
        } else {
            self.port.source_all_samples_flushed();
        }
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        if let Some(counter) = &self.drop_counter {
            counter.set(counter.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_stalls_until_resume() {
        let sink = MockSink::limited(4);
        assert_eq!(sink.write_samples(&[1.0; 6]), 4);
        assert!(sink.is_stalled());
        assert_eq!(sink.write_samples(&[1.0; 2]), 0);

        sink.resume();
        assert_eq!(sink.write_samples(&[2.0; 2]), 2);
        assert_eq!(sink.received().len(), 6);
        assert_eq!(sink.write_calls(), 3);
    }

    #[test]
    fn test_manual_flush() {
        let sink = MockSink::new();
        sink.set_manual_flush(true);
        sink.flush_samples();
        assert!(sink.is_flush_pending());
        assert!(sink.complete_flush());
        assert!(!sink.complete_flush());
    }

    #[test]
    fn test_write_cancels_pending_flush() {
        let sink = MockSink::new();
        sink.set_manual_flush(true);
        sink.flush_samples();
        sink.write_samples(&[0.0]);
        assert!(!sink.is_flush_pending());
    }
}
