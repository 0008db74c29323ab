//! Sample FIFO between a bursty producer and a paced consumer.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ringbuf::traits::{Consumer, Observer, Producer, RingBuffer};
use ringbuf::HeapRb;

use crate::config::PipelineConfig;
use crate::sink::{AudioSink, SinkPort};
use crate::source::{AudioSource, SourcePort};

/// Largest block written downstream from the buffer in one call.
const MAX_WRITE_SIZE: usize = 800;

/// A bounded sample queue.
///
/// Writes go straight through while the FIFO is empty and the sink keeps
/// up; whatever the sink does not take is buffered and written out as the
/// sink resumes. When the buffer is full the input is stalled, or, in
/// overwrite mode, the oldest samples are dropped.
///
/// With a prebuffer configured, output starts only after that many samples
/// have been collected (or a flush arrives), which smooths out jitter on the
/// input side.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioFifo, AudioSource, MockSink, MockSource};
///
/// let input = MockSource::new(8000);
/// let fifo = AudioFifo::new(1000);
/// let output = MockSink::limited(100);
/// input.register_sink(fifo.clone());
/// fifo.register_sink(output.clone());
///
/// input.add_samples(&[0.25; 400]);
/// input.pump();
/// assert_eq!(output.received().len(), 100);
/// assert_eq!(fifo.samples_in_fifo(false), 300);
/// ```
pub struct AudioFifo {
    source: SourcePort,
    sink: SinkPort,
    buffer: RefCell<HeapRb<f32>>,
    overwrite: Cell<bool>,
    prebuf_samples: Cell<usize>,
    prebuf: Cell<bool>,
    output_stopped: Cell<bool>,
    input_stopped: Cell<bool>,
    is_flushing: Cell<bool>,
    buffering_enabled: Cell<bool>,
    disable_buffering_when_flushed: Cell<bool>,
    writing: Cell<bool>,
    resumed_while_writing: Cell<bool>,
}

impl AudioFifo {
    /// Creates a FIFO sized and prebuffered from `config`.
    pub fn from_config(config: &PipelineConfig) -> Rc<Self> {
        let fifo = Self::new(config.fifo_size());
        fifo.set_prebuf_samples(config.prebuf_samples());
        fifo
    }

    /// Creates a FIFO holding at most `size` samples.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Rc<Self> {
        assert!(size > 0, "FIFO size must be non-zero");
        Rc::new_cyclic(|me| Self {
            source: SourcePort::new(me.clone()),
            sink: SinkPort::new(me.clone()),
            buffer: RefCell::new(HeapRb::new(size)),
            overwrite: Cell::new(false),
            prebuf_samples: Cell::new(0),
            prebuf: Cell::new(false),
            output_stopped: Cell::new(false),
            input_stopped: Cell::new(false),
            is_flushing: Cell::new(false),
            buffering_enabled: Cell::new(true),
            disable_buffering_when_flushed: Cell::new(false),
            writing: Cell::new(false),
            resumed_while_writing: Cell::new(false),
        })
    }

    /// Replaces the buffer with one of `size` samples. Buffered samples are
    /// lost.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn set_size(&self, size: usize) {
        assert!(size > 0, "FIFO size must be non-zero");
        let was_empty = self.is_empty();
        *self.buffer.borrow_mut() = HeapRb::new(size);
        self.reset(was_empty);
    }

    /// Capacity in samples.
    pub fn size(&self) -> usize {
        self.buffer.borrow().capacity().get()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }

    /// Returns `true` if the buffer is full and the input is refused.
    /// Never true in overwrite mode.
    pub fn is_full(&self) -> bool {
        !self.overwrite.get() && self.buffer.borrow().is_full()
    }

    /// Number of buffered samples.
    ///
    /// While prebuffering (and not flushing) this reports zero until the
    /// prebuffer level is reached, unless `ignore_prebuf` is set.
    pub fn samples_in_fifo(&self, ignore_prebuf: bool) -> usize {
        let buffered = self.buffer.borrow().occupied_len();
        if !ignore_prebuf
            && self.prebuf.get()
            && !self.is_flushing.get()
            && buffered < self.prebuf_samples.get()
        {
            return 0;
        }
        buffered
    }

    /// Free space in samples.
    pub fn space_avail(&self) -> usize {
        self.buffer.borrow().vacant_len()
    }

    /// In overwrite mode a full buffer drops its oldest samples instead of
    /// refusing input.
    pub fn set_overwrite(&self, overwrite: bool) {
        self.overwrite.set(overwrite);
    }

    /// Returns `true` in overwrite mode.
    pub fn overwrite(&self) -> bool {
        self.overwrite.get()
    }

    /// Sets how many samples to collect before output starts. Clamped to
    /// one less than the capacity.
    pub fn set_prebuf_samples(&self, samples: usize) {
        let samples = samples.min(self.size() - 1);
        self.prebuf_samples.set(samples);
        if self.is_empty() {
            self.prebuf.set(samples > 0);
        }
    }

    /// Turns buffering on or off.
    ///
    /// Without buffering the FIFO is a plain passthrough. Disabling takes
    /// effect once the buffer has been flushed empty.
    pub fn enable_buffering(&self, enable: bool) {
        if enable {
            self.disable_buffering_when_flushed.set(false);
            if !self.buffering_enabled.replace(true) && self.input_stopped.replace(false) {
                self.sink.source_resume_output();
            }
        } else if self.buffering_enabled.get() {
            if self.is_empty() {
                self.buffering_enabled.set(false);
            } else {
                self.disable_buffering_when_flushed.set(true);
            }
        }
    }

    /// Returns `true` if buffering is on.
    pub fn buffering_enabled(&self) -> bool {
        self.buffering_enabled.get()
    }

    /// Drops everything buffered.
    pub fn clear(&self) {
        let was_empty = self.is_empty();
        self.buffer.borrow_mut().clear();
        self.reset(was_empty);
    }

    fn reset(&self, was_empty: bool) {
        self.prebuf.set(self.prebuf_samples.get() > 0);
        self.output_stopped.set(false);
        if self.is_flushing.get() && !was_empty {
            self.source.sink_flush_samples();
        }
        if self.input_stopped.replace(false) {
            self.sink.source_resume_output();
        }
    }

    fn write_from_fifo(&self) {
        if self.output_stopped.get() || self.samples_in_fifo(false) == 0 {
            return;
        }
        if self.writing.replace(true) {
            return;
        }

        loop {
            self.resumed_while_writing.set(false);
            let block: Vec<f32> = {
                let buffer = self.buffer.borrow();
                let (head, _) = buffer.as_slices();
                head[..head.len().min(MAX_WRITE_SIZE)].to_vec()
            };
            if block.is_empty() {
                break;
            }

            let written = self.source.sink_write_samples(&block);
            self.buffer.borrow_mut().skip(written);
            if written < block.len() && !self.resumed_while_writing.get() {
                self.output_stopped.set(true);
                break;
            }
        }
        self.writing.set(false);

        if self.input_stopped.get() && !self.is_full() {
            self.input_stopped.set(false);
            self.sink.source_resume_output();
        }

        if self.is_flushing.get() && self.is_empty() {
            self.source.sink_flush_samples();
        }
    }
}

impl AudioSink for AudioFifo {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.is_flushing.set(false);
        self.input_stopped.set(false);

        if self.is_full() {
            self.input_stopped.set(true);
            return 0;
        }

        let mut written = 0;
        if self.is_empty() && !self.prebuf.get() {
            written = self.source.sink_write_samples(samples);
        }

        if self.buffering_enabled.get() {
            while !self.is_full() && written < samples.len() {
                let rest = &samples[written..];
                {
                    let mut buffer = self.buffer.borrow_mut();
                    if self.overwrite.get() {
                        buffer.push_slice_overwrite(rest);
                        written = samples.len();
                    } else {
                        written += buffer.push_slice(rest);
                    }
                }
                if self.prebuf.get() && self.samples_in_fifo(false) > 0 {
                    self.prebuf.set(false);
                }
                self.write_from_fifo();
            }
        } else {
            self.output_stopped.set(written < samples.len());
        }

        if written < samples.len() {
            self.input_stopped.set(true);
        }
        tracing::trace!(
            offered = samples.len(),
            accepted = written,
            buffered = self.buffer.borrow().occupied_len(),
            "fifo write"
        );
        written
    }

    fn flush_samples(&self) {
        self.is_flushing.set(true);
        self.prebuf.set(self.prebuf_samples.get() > 0);
        if self.is_empty() {
            self.source.sink_flush_samples();
        } else {
            self.write_from_fifo();
        }
    }
}

impl AudioSource for AudioFifo {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }

    fn resume_output(&self) {
        if self.writing.get() {
            self.resumed_while_writing.set(true);
            return;
        }
        if !self.output_stopped.replace(false) {
            return;
        }
        if self.buffering_enabled.get() {
            self.write_from_fifo();
        } else if self.input_stopped.replace(false) {
            self.sink.source_resume_output();
        }
    }

    fn all_samples_flushed(&self) {
        if !self.is_empty() {
            return;
        }
        if self.disable_buffering_when_flushed.replace(false) {
            self.buffering_enabled.set(false);
        }
        if self.is_flushing.replace(false) {
            self.sink.source_all_samples_flushed();
        }
    }
}

impl fmt::Debug for AudioFifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFifo")
            .field("size", &self.size())
            .field("buffered", &self.samples_in_fifo(true))
            .field("overwrite", &self.overwrite.get())
            .field("prebuf_samples", &self.prebuf_samples.get())
            .field("buffering_enabled", &self.buffering_enabled.get())
            .field("is_flushing", &self.is_flushing.get())
            .finish_non_exhaustive()
    }
}
