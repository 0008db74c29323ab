//! Mock audio source for testing without hardware.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::source::{AudioSource, SourcePort};

/// Largest block handed to the sink in one write.
const PUMP_BLOCK_SIZE: usize = 256;

/// A source that generates synthetic audio and plays by the flow-control
/// rules.
///
/// Generated samples are queued. [`pump`](MockSource::pump) writes the queue
/// downstream until the sink accepts less than offered, and picks up again
/// by itself when the sink resumes output. A [`flush`](MockSource::flush) is
/// sent once the queue has drained.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSource, MockSink, MockSource};
///
/// let mock = MockSource::new(16000);
/// let sink = MockSink::new();
/// mock.register_sink(sink.clone());
///
/// // 100ms of silence followed by 100ms of a 440Hz sine wave
/// mock.generate_silence(100);
/// mock.generate_sine(440.0, 100);
/// mock.flush();
///
/// assert_eq!(mock.pump(), 3200);
/// assert_eq!(mock.flushes_completed(), 1);
/// ```
#[derive(Debug)]
pub struct MockSource {
    port: SourcePort,
    sample_rate: u32,
    queue: RefCell<VecDeque<f32>>,
    flush_pending: Cell<bool>,
    flushes_completed: Cell<usize>,
    resumes: Cell<usize>,
    written: Cell<usize>,
    pumping: Cell<bool>,
    resumed_while_pumping: Cell<bool>,
}

impl MockSource {
    /// Creates a mock source producing audio at `sample_rate`.
    pub fn new(sample_rate: u32) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SourcePort::new(me.clone()),
            sample_rate,
            queue: RefCell::new(VecDeque::new()),
            flush_pending: Cell::new(false),
            flushes_completed: Cell::new(0),
            resumes: Cell::new(0),
            written: Cell::new(0),
            pumping: Cell::new(false),
            resumed_while_pumping: Cell::new(false),
        })
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queues silence for the given duration in milliseconds.
    pub fn generate_silence(&self, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        self.queue
            .borrow_mut()
            .extend(std::iter::repeat(0.0).take(num_samples));
    }

    /// Queues a full-scale sine wave at the given frequency.
    pub fn generate_sine(&self, frequency: f64, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        let sample_rate = f64::from(self.sample_rate);
        let mut queue = self.queue.borrow_mut();
        for i in 0..num_samples {
            let t = i as f64 / sample_rate;
            queue.push_back((2.0 * std::f64::consts::PI * frequency * t).sin() as f32);
        }
    }

    /// Queues white noise with the given peak amplitude.
    pub fn generate_noise(&self, duration_ms: u64, amplitude: f32) {
        let num_samples = self.samples_for_duration(duration_ms);
        let mut queue = self.queue.borrow_mut();

        // Simple LCG for deterministic "random" noise
        let mut seed: u32 = 12345;
        for _ in 0..num_samples {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let random = f32::from((seed >> 16) as u16) / 32768.0 - 1.0;
            queue.push_back(random * amplitude);
        }
    }

    /// Queues raw samples.
    pub fn add_samples(&self, samples: &[f32]) {
        self.queue.borrow_mut().extend(samples.iter().copied());
    }

    /// Number of samples waiting to be written.
    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Duration of the queued samples.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.queued() as f64 / f64::from(self.sample_rate))
    }

    /// Writes queued samples downstream until the queue is empty or the sink
    /// stalls. Returns the number of samples written by this call.
    pub fn pump(&self) -> usize {
        if self.pumping.replace(true) {
            self.resumed_while_pumping.set(true);
            return 0;
        }

        let mut total = 0;
        loop {
            self.resumed_while_pumping.set(false);
            let block: Vec<f32> = self
                .queue
                .borrow()
                .iter()
                .take(PUMP_BLOCK_SIZE)
                .copied()
                .collect();
            if block.is_empty() {
                break;
            }

            let written = self.port.sink_write_samples(&block);
            self.queue.borrow_mut().drain(..written);
            total += written;
            if written < block.len() && !self.resumed_while_pumping.get() {
                break;
            }
        }
        self.pumping.set(false);
        self.written.set(self.written.get() + total);

        if self.flush_pending.get() && self.queue.borrow().is_empty() {
            self.flush_pending.set(false);
            self.port.sink_flush_samples();
        }
        total
    }

    /// Writes `samples` directly, bypassing the queue, and returns how many
    /// the sink took.
    pub fn offer(&self, samples: &[f32]) -> usize {
        let written = self.port.sink_write_samples(samples);
        self.written.set(self.written.get() + written);
        written
    }

    /// Requests a flush. It is sent downstream once the queue has drained.
    pub fn flush(&self) {
        self.flush_pending.set(true);
        if self.queue.borrow().is_empty() && !self.pumping.get() {
            self.flush_pending.set(false);
            self.port.sink_flush_samples();
        }
    }

    /// Number of completed flushes.
    pub fn flushes_completed(&self) -> usize {
        self.flushes_completed.get()
    }

    /// Number of times the sink resumed output.
    pub fn resume_count(&self) -> usize {
        self.resumes.get()
    }

    /// Total number of samples accepted downstream.
    pub fn samples_written(&self) -> usize {
        self.written.get()
    }

    fn samples_for_duration(&self, duration_ms: u64) -> usize {
        (u64::from(self.sample_rate) * duration_ms / 1000) as usize
    }
}

impl AudioSource for MockSource {
    fn source_port(&self) -> &SourcePort {
        &self.port
    }

    fn resume_output(&self) {
        self.resumes.set(self.resumes.get() + 1);
        if self.pumping.get() {
            self.resumed_while_pumping.set(true);
        } else if self.queued() > 0 {
            self.pump();
        }
    }

    fn all_samples_flushed(&self) {
        self.flushes_completed.set(self.flushes_completed.get() + 1);
    }
}
