//! Adapts block transforms to the flow-control contract.

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::sink::{AudioSink, SinkPort};
use crate::source::{AudioSource, SourcePort};

/// Default output buffer size, in samples.
pub const DEFAULT_PROCESSOR_BUFFER: usize = 256;

/// A synchronous sample transform.
///
/// `process` must transform every sample it is given. A rate-changing
/// transform reports its ratio through [`rate_ratio`](SampleProcessor::rate_ratio);
/// it is then only handed whole multiples of the input side of the ratio.
pub trait SampleProcessor {
    /// Transforms `src` into `dst`.
    ///
    /// `dst.len()` is `src.len() / input * output` for the ratio
    /// `(input, output)`.
    fn process(&mut self, dst: &mut [f32], src: &[f32]);

    /// Input to output sample ratio, as `(input, output)`. One of the two
    /// must divide the other.
    fn rate_ratio(&self) -> (usize, usize) {
        (1, 1)
    }
}

/// Runs a [`SampleProcessor`] inside the pipeline.
///
/// Transformed samples go to a fixed-size output buffer which is written
/// downstream as fast as the sink takes it. A write is accepted only as far
/// as its output fits in the buffer; once the buffer has drained below full
/// the input is resumed. A flush is held back until the buffer is empty.
///
/// When decimating, input that does not make up a whole output sample is
/// kept until the next write. A flush discards it.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioProcessor, AudioSource, MockSink, MockSource, SampleProcessor};
///
/// struct Invert;
///
/// impl SampleProcessor for Invert {
///     fn process(&mut self, dst: &mut [f32], src: &[f32]) {
///         for (d, s) in dst.iter_mut().zip(src) {
///             *d = -s;
///         }
///     }
/// }
///
/// let input = MockSource::new(8000);
/// let invert = AudioProcessor::new(Invert);
/// let output = MockSink::new();
/// input.register_sink(invert.clone());
/// invert.register_sink(output.clone());
///
/// input.add_samples(&[0.25, -0.5]);
/// input.pump();
/// assert_eq!(output.received(), vec![-0.25, 0.5]);
/// ```
pub struct AudioProcessor<P> {
    sink: SinkPort,
    source: SourcePort,
    processor: RefCell<P>,
    capacity: usize,
    buf: RefCell<Vec<f32>>,
    residual: RefCell<Vec<f32>>,
    do_flush: Cell<bool>,
    buf_full: Cell<bool>,
    writing: Cell<bool>,
    resumed_while_writing: Cell<bool>,
}

impl<P: SampleProcessor + 'static> AudioProcessor<P> {
    /// Wraps `processor` with the default buffer size.
    pub fn new(processor: P) -> Rc<Self> {
        Self::with_buffer_size(processor, DEFAULT_PROCESSOR_BUFFER)
    }

    /// Wraps `processor` with an output buffer of `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if the processor's rate ratio is not an integer decimation or
    /// interpolation, or if `capacity` cannot hold the output of a single
    /// input sample.
    pub fn with_buffer_size(processor: P, capacity: usize) -> Rc<Self> {
        let (input, output) = processor.rate_ratio();
        assert!(
            input > 0 && output > 0 && (input % output == 0 || output % input == 0),
            "unsupported rate ratio {input}:{output}"
        );
        assert!(
            capacity >= output,
            "processor buffer of {capacity} samples is smaller than the interpolation factor {output}"
        );
        Rc::new_cyclic(|me| Self {
            sink: SinkPort::new(me.clone()),
            source: SourcePort::new(me.clone()),
            processor: RefCell::new(processor),
            capacity,
            buf: RefCell::new(Vec::with_capacity(capacity)),
            residual: RefCell::new(Vec::new()),
            do_flush: Cell::new(false),
            buf_full: Cell::new(false),
            writing: Cell::new(false),
            resumed_while_writing: Cell::new(false),
        })
    }

    /// Mutable access to the wrapped processor, e.g. to change its
    /// parameters between writes.
    pub fn processor(&self) -> RefMut<'_, P> {
        self.processor.borrow_mut()
    }

    /// Number of processed samples waiting for the sink.
    pub fn buffered(&self) -> usize {
        self.buf.borrow().len()
    }

    fn transform(&self, samples: &[f32]) {
        let (input, output) = self.processor.borrow().rate_ratio();

        let mut src = std::mem::take(&mut *self.residual.borrow_mut());
        src.extend_from_slice(samples);
        let whole = src.len() / input * input;
        if whole > 0 {
            let mut dst = vec![0.0; whole / input * output];
            self.processor.borrow_mut().process(&mut dst, &src[..whole]);
            self.buf.borrow_mut().extend_from_slice(&dst);
        }
        src.drain(..whole);
        *self.residual.borrow_mut() = src;
    }

    fn write_from_buf(&self) {
        if self.buf.borrow().is_empty() || self.writing.replace(true) {
            return;
        }

        loop {
            self.resumed_while_writing.set(false);
            let block = self.buf.borrow().clone();
            if block.is_empty() {
                break;
            }
            let written = self.source.sink_write_samples(&block);
            self.buf.borrow_mut().drain(..written);
            if written < block.len() && !self.resumed_while_writing.get() {
                break;
            }
        }
        self.writing.set(false);

        let buffered = self.buffered();
        if self.do_flush.get() && buffered == 0 {
            self.source.sink_flush_samples();
        }
        if self.buf_full.get() && buffered < self.capacity {
            self.buf_full.set(false);
            self.sink.source_resume_output();
        }
    }
}

impl<P: SampleProcessor + 'static> AudioSink for AudioProcessor<P> {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.do_flush.set(false);
        self.buf_full.set(false);
        self.write_from_buf();

        let (input, output) = self.processor.borrow().rate_ratio();
        let avail = self.capacity - self.buffered();
        let max_in = (avail * input / output).saturating_sub(self.residual.borrow().len());

        let mut len = samples.len();
        if max_in < len {
            len = max_in;
            self.buf_full.set(true);
        }
        if len > 0 {
            self.transform(&samples[..len]);
            self.write_from_buf();
        }
        len
    }

    fn flush_samples(&self) {
        self.do_flush.set(true);
        self.residual.borrow_mut().clear();
        if self.buf.borrow().is_empty() {
            self.source.sink_flush_samples();
        }
    }
}

impl<P: SampleProcessor + 'static> AudioSource for AudioProcessor<P> {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }

    fn resume_output(&self) {
        if self.writing.get() {
            self.resumed_while_writing.set(true);
        } else {
            self.write_from_buf();
        }
    }

    fn all_samples_flushed(&self) {
        self.do_flush.set(false);
        self.sink.source_all_samples_flushed();
    }
}

impl<P> fmt::Debug for AudioProcessor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioProcessor")
            .field("capacity", &self.capacity)
            .field("buffered", &self.buf.borrow().len())
            .field("do_flush", &self.do_flush.get())
            .field("buf_full", &self.buf_full.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;
    use crate::source::MockSource;

    struct Double;

    impl SampleProcessor for Double {
        fn process(&mut self, dst: &mut [f32], src: &[f32]) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = s * 2.0;
            }
        }
    }

    /// Keeps every second sample.
    struct Halve;

    impl SampleProcessor for Halve {
        fn process(&mut self, dst: &mut [f32], src: &[f32]) {
            for (d, pair) in dst.iter_mut().zip(src.chunks_exact(2)) {
                *d = pair[0];
            }
        }

        fn rate_ratio(&self) -> (usize, usize) {
            (2, 1)
        }
    }

    /// Repeats every sample.
    struct Repeat;

    impl SampleProcessor for Repeat {
        fn process(&mut self, dst: &mut [f32], src: &[f32]) {
            for (pair, s) in dst.chunks_exact_mut(2).zip(src) {
                pair.fill(*s);
            }
        }

        fn rate_ratio(&self) -> (usize, usize) {
            (1, 2)
        }
    }

    fn wire<P: SampleProcessor + 'static>(
        processor: P,
        capacity: usize,
        limit: Option<usize>,
    ) -> (Rc<MockSource>, Rc<AudioProcessor<P>>, Rc<MockSink>) {
        let input = MockSource::new(8000);
        let node = AudioProcessor::with_buffer_size(processor, capacity);
        let output = MockSink::new();
        output.set_accept_limit(limit);
        input.register_sink(node.clone());
        node.register_sink(output.clone());
        (input, node, output)
    }

    #[test]
    fn test_transforms_everything_when_sink_keeps_up() {
        let (input, _node, output) = wire(Double, 16, None);
        input.add_samples(&[0.1; 40]);
        input.pump();
        assert_eq!(output.received(), vec![0.2; 40]);
    }

    #[test]
    fn test_full_buffer_limits_accepted_input() {
        let (input, node, output) = wire(Double, 16, Some(0));
        assert_eq!(input.offer(&[0.1; 40]), 16);
        assert_eq!(node.buffered(), 16);
        assert_eq!(input.offer(&[0.1; 4]), 0);

        output.set_accept_limit(None);
        input.add_samples(&[0.3; 4]);
        output.resume();
        assert_eq!(node.buffered(), 0);
        assert_eq!(output.received().len(), 20);
        assert!(input.resume_count() >= 1);
    }

    #[test]
    fn test_flush_waits_for_buffer() {
        let (input, node, output) = wire(Double, 16, Some(4));
        input.add_samples(&[0.1; 8]);
        input.pump();
        input.flush();
        assert_eq!(output.flush_requests(), 0);
        assert_eq!(node.buffered(), 4);

        output.set_accept_limit(None);
        output.resume();
        assert_eq!(output.flush_requests(), 1);
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_decimation_keeps_residual() {
        let (input, _node, output) = wire(Halve, 16, None);
        assert_eq!(input.offer(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(output.received(), vec![1.0]);
        assert_eq!(input.offer(&[4.0, 5.0, 6.0]), 3);
        assert_eq!(output.received(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_interpolation_limits_input_by_output_space() {
        let (input, node, _output) = wire(Repeat, 8, Some(0));
        assert_eq!(input.offer(&[1.0; 10]), 4);
        assert_eq!(node.buffered(), 8);
    }

    #[test]
    #[should_panic(expected = "unsupported rate ratio")]
    fn test_rejects_fractional_ratio() {
        struct Odd;

        impl SampleProcessor for Odd {
            fn process(&mut self, _dst: &mut [f32], _src: &[f32]) {}

            fn rate_ratio(&self) -> (usize, usize) {
                (3, 2)
            }
        }

        let _ = AudioProcessor::new(Odd);
    }

    #[test]
    #[should_panic(expected = "smaller than the interpolation factor")]
    fn test_rejects_buffer_smaller_than_interpolation_factor() {
        let _ = AudioProcessor::with_buffer_size(Repeat, 1);
    }

    #[test]
    #[should_panic(expected = "smaller than the interpolation factor")]
    fn test_rejects_empty_buffer() {
        let _ = AudioProcessor::with_buffer_size(Double, 0);
    }

    #[test]
    fn test_buffer_of_one_interpolation_step_makes_progress() {
        let (input, node, output) = wire(Repeat, 2, None);
        input.add_samples(&[0.5; 3]);
        input.pump();
        assert_eq!(output.received(), vec![0.5; 6]);
        assert_eq!(node.buffered(), 0);
    }
}
