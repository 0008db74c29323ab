//! A passthrough that reports whether audio is currently flowing.

use std::cell::Cell;
use std::rc::Rc;

use crate::event::Signal;
use crate::sink::{AudioSink, SinkPort};
use crate::source::{AudioSource, SourcePort};

/// Where a stream is in its write/flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Nothing written since the last completed flush.
    #[default]
    Idle,
    /// Samples are being written.
    Active,
    /// A flush was requested and has not completed yet.
    Flushing,
}

/// Forwards everything unchanged and tracks the [`StreamState`] of the
/// stream passing through.
///
/// The state becomes `Active` on a write, `Flushing` on a flush request and
/// `Idle` once the flush has completed downstream. A write during a flush
/// cancels it and makes the stream active again. Every change is announced
/// on [`state_changed`](Self::state_changed) after the state is updated and
/// before the call is forwarded.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSource, AudioStreamStateDetector, CallbackSource, MockSink, StreamState};
///
/// let input = CallbackSource::new();
/// let detector = AudioStreamStateDetector::new();
/// let output = MockSink::new();
/// input.register_sink(detector.clone());
/// detector.register_sink(output.clone());
///
/// input.write_samples(&[0.1; 4]);
/// assert_eq!(detector.state(), StreamState::Active);
/// input.flush_samples();
/// assert!(detector.is_idle());
/// ```
#[derive(Debug)]
pub struct AudioStreamStateDetector {
    source: SourcePort,
    sink: SinkPort,
    state: Cell<StreamState>,
    state_changed: Signal<StreamState>,
}

impl AudioStreamStateDetector {
    /// Creates an unconnected detector in the idle state.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            source: SourcePort::new(me.clone()),
            sink: SinkPort::new(me.clone()),
            state: Cell::new(StreamState::Idle),
            state_changed: Signal::new(),
        })
    }

    /// Emitted with the new state whenever it changes.
    pub fn state_changed(&self) -> &Signal<StreamState> {
        &self.state_changed
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == StreamState::Idle
    }

    pub fn is_active(&self) -> bool {
        self.state() == StreamState::Active
    }

    pub fn is_flushing(&self) -> bool {
        self.state() == StreamState::Flushing
    }

    fn enter(&self, state: StreamState) {
        let old = self.state.replace(state);
        if old != state {
            tracing::trace!(from = ?old, to = ?state, "stream state changed");
            self.state_changed.emit(&state);
        }
    }
}

impl AudioSink for AudioStreamStateDetector {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        if !samples.is_empty() {
            self.enter(StreamState::Active);
        }
        self.source.sink_write_samples(samples)
    }

    fn flush_samples(&self) {
        self.enter(StreamState::Flushing);
        self.source.sink_flush_samples();
    }
}

impl AudioSource for AudioStreamStateDetector {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }

    fn resume_output(&self) {
        self.sink.source_resume_output();
    }

    fn all_samples_flushed(&self) {
        self.enter(StreamState::Idle);
        self.sink.source_all_samples_flushed();
    }
}
