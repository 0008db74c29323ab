//! Pipeline nodes.
//!
//! Every node here is both a sink (for the stage before it) and a source
//! (for the stage after it):
//!
//! ```text
//! source → AudioValve → AudioFifo → AudioProcessor → AudioSplitter ─┬→ sink
//!                                                                    └→ sink
//! ```
//!
//! - **Passthrough**: forwards everything, a fixed connection point
//! - **Valve**: cuts the stream, discarding or blocking while closed
//! - **Fifo**: ring buffer absorbing bursts, with prebuffering
//! - **Processor**: runs a [`SampleProcessor`] behind an output buffer
//! - **Splitter**: fans one stream out to several sinks
//! - **State detector**: tracks where the stream is in its write/flush cycle
//! - **Pipeline**: presents a wired chain as a single node

mod composite;
mod fifo;
mod passthrough;
mod processor;
mod splitter;
mod state_detector;
mod valve;

pub use composite::AudioPipeline;
pub use fifo::AudioFifo;
pub use passthrough::AudioPassthrough;
pub use processor::{AudioProcessor, SampleProcessor, DEFAULT_PROCESSOR_BUFFER};
pub use splitter::AudioSplitter;
pub use state_detector::{AudioStreamStateDetector, StreamState};
pub use valve::AudioValve;
