//! # audio-pipe
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Push-based audio pipelines with flow control.
//!
//! `audio-pipe` connects audio producers and consumers through a small
//! contract: a source writes samples to its sink, the sink says how many it
//! took, and a sink that took fewer than offered tells the source when to
//! resume. Flushes travel downstream and their completion travels back up.
//! Every node in between (valves, FIFOs, processors, splitters, codecs)
//! honours the same contract, so back-pressure from the slowest consumer
//! reaches the producer without buffers growing without bound.
//!
//! ## Quick Start
//!
//! ```rust
//! use audio_pipe::dsp::Amplifier;
//! use audio_pipe::{AudioFifo, AudioProcessor, AudioSource, MockSink, MockSource};
//!
//! let mic = MockSource::new(8000);
//! let fifo = AudioFifo::new(800);
//! let gain = AudioProcessor::new(Amplifier::new(-6.0));
//! let speaker = MockSink::limited(160);
//!
//! mic.register_sink(fifo.clone());
//! fifo.register_sink(gain.clone());
//! gain.register_sink(speaker.clone());
//!
//! mic.generate_sine(440.0, 100);
//! mic.flush();
//! mic.pump();
//!
//! // The speaker stalls after 160 samples; the rest waits in the pipeline
//! assert_eq!(speaker.received().len(), 160);
//! speaker.set_accept_limit(None);
//! speaker.resume();
//! assert_eq!(speaker.received().len(), 800);
//! assert_eq!(mic.flushes_completed(), 1);
//! ```
//!
//! ## Threading
//!
//! Nodes are reference counted with `Rc` and keep their state in cells.
//! Nothing is `Send`: a pipeline is built and driven from one thread,
//! typically an event loop. Crossing into async code happens at the edges,
//! e.g. through [`ChannelSink`].

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]
// Nodes are always handed out as Rc, so a Default impl would be misleading
#![allow(clippy::new_ret_no_self, clippy::new_without_default)]

mod chunk;
pub mod codec;
mod config;
pub mod dsp;
mod error;
mod event;
pub mod format;
mod pipeline;
mod reactor;
pub mod sink;
pub mod source;

pub use chunk::AudioChunk;
pub use config::{CodecOptions, PipelineConfig};
pub use error::AudioError;
pub use event::{Signal, SlotId};
pub use pipeline::{
    AudioFifo, AudioPassthrough, AudioPipeline, AudioProcessor, AudioSplitter,
    AudioStreamStateDetector, AudioValve, SampleProcessor, StreamState, DEFAULT_PROCESSOR_BUFFER,
};
pub use reactor::Reactor;
pub use sink::{AudioSink, CallbackSink, ChannelSink, MockSink, SinkPort, WavFileSink};
pub use source::{AudioSource, CallbackSource, MockSource, SourcePort};
