//! A node that forwards everything unchanged.

use std::rc::Rc;

use crate::sink::{AudioSink, SinkPort};
use crate::source::{AudioSource, SourcePort};

/// Forwards samples, flushes, resumes and flush completions in both
/// directions without touching them.
///
/// Useful as a fixed connection point: the node can be wired up before the
/// stages on either side exist.
#[derive(Debug)]
pub struct AudioPassthrough {
    source: SourcePort,
    sink: SinkPort,
}

impl AudioPassthrough {
    /// Creates an unconnected passthrough.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            source: SourcePort::new(me.clone()),
            sink: SinkPort::new(me.clone()),
        })
    }
}

impl AudioSink for AudioPassthrough {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.source.sink_write_samples(samples)
    }

    fn flush_samples(&self) {
        self.source.sink_flush_samples();
    }
}

impl AudioSource for AudioPassthrough {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }

    fn resume_output(&self) {
        self.sink.source_resume_output();
    }

    fn all_samples_flushed(&self) {
        self.sink.source_all_samples_flushed();
    }
}
