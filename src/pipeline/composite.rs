//! Wraps a privately wired chain of nodes as a single node.

use std::fmt;
use std::rc::Rc;

use crate::sink::{AudioSink, SinkPort};
use crate::source::{AudioSource, SourcePort};

/// A chain of nodes presented as one sink and one source.
///
/// The caller wires the chain from `head` to `tail` before handing it over.
/// The pipeline's sink face delegates to `head` and its source face to
/// `tail`, so upstream writes land on the head and the tail writes straight
/// to whatever is registered downstream of the pipeline. Resume and flush
/// notifications take the same routes in reverse.
///
/// # Example
///
/// ```
/// use audio_pipe::{
///     AudioPassthrough, AudioPipeline, AudioSource, AudioValve, MockSink, MockSource,
/// };
///
/// let head = AudioPassthrough::new();
/// let tail = AudioValve::new(false);
/// head.register_sink(tail.clone());
/// let pipeline = AudioPipeline::new(head, tail.clone());
///
/// let mic = MockSource::new(8000);
/// let out = MockSink::new();
/// mic.register_sink(pipeline.clone());
/// pipeline.register_sink(out.clone());
///
/// mic.add_samples(&[0.5; 4]);
/// mic.pump();
/// assert_eq!(out.received().len(), 4);
///
/// tail.set_open(false);
/// mic.add_samples(&[0.5; 4]);
/// mic.pump();
/// assert_eq!(out.received().len(), 4);
/// ```
pub struct AudioPipeline {
    sink: SinkPort,
    source: SourcePort,
    head: Rc<dyn AudioSink>,
    tail: Rc<dyn AudioSource>,
}

impl AudioPipeline {
    /// Wraps the chain running from `head` to `tail`.
    ///
    /// Both ends must still be unconnected on their outer faces.
    pub fn new(head: Rc<dyn AudioSink>, tail: Rc<dyn AudioSource>) -> Rc<Self> {
        let pipeline = Rc::new_cyclic(|me| Self {
            sink: SinkPort::new(me.clone()),
            source: SourcePort::new(me.clone()),
            head,
            tail,
        });
        let head_attached = pipeline.sink.set_handler(pipeline.head.clone());
        let tail_attached = pipeline.source.set_handler(pipeline.tail.clone());
        debug_assert!(head_attached && tail_attached);
        pipeline
    }

    /// First node of the chain.
    pub fn head(&self) -> &Rc<dyn AudioSink> {
        &self.head
    }

    /// Last node of the chain.
    pub fn tail(&self) -> &Rc<dyn AudioSource> {
        &self.tail
    }
}

impl AudioSink for AudioPipeline {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }
}

impl AudioSource for AudioPipeline {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }
}

impl fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("sink", &self.sink)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AudioPassthrough, AudioProcessor, SampleProcessor};
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

    fn wrapped() -> (Rc<AudioPassthrough>, Rc<AudioProcessor<Double>>, Rc<AudioPipeline>) {
        let head = AudioPassthrough::new();
        let tail = AudioProcessor::new(Double);
        head.register_sink(tail.clone());
        let pipeline = AudioPipeline::new(head.clone(), tail.clone());
        (head, tail, pipeline)
    }

    #[test]
    fn test_outer_faces_delegate_to_chain_ends() {
        let (head, tail, pipeline) = wrapped();
        let input = MockSource::new(8000);
        let output = MockSink::new();
        input.register_sink(pipeline.clone());
        pipeline.register_sink(output.clone());

        assert!(head.has_source());
        assert!(tail.has_sink());
        assert!(same_sink(&output, &tail.sink()));
    }

    fn same_sink(expected: &Rc<MockSink>, actual: &Option<Rc<dyn AudioSink>>) -> bool {
        actual
            .as_ref()
            .is_some_and(|sink| crate::source::same_node(sink, expected))
    }

    #[test]
    fn test_flow_control_crosses_the_composite() {
        let (_head, _tail, pipeline) = wrapped();
        let input = MockSource::new(8000);
        let output = MockSink::limited(3);
        input.register_sink(pipeline.clone());
        pipeline.register_sink(output.clone());

        input.add_samples(&[0.1; 5]);
        input.pump();
        assert_eq!(output.received(), vec![0.2; 3]);

        output.set_accept_limit(None);
        output.resume();
        assert_eq!(output.received(), vec![0.2; 5]);

        input.flush();
        assert_eq!(output.flush_requests(), 1);
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_unregister_detaches_both_ends() {
        let (head, tail, pipeline) = wrapped();
        let input = MockSource::new(8000);
        let output = MockSink::new();
        input.register_sink(pipeline.clone());
        pipeline.register_sink(output.clone());

        pipeline.unregister_sink();
        input.unregister_sink();
        assert!(!tail.has_sink());
        assert!(!head.has_source());
        assert!(!output.has_source());
    }
}
