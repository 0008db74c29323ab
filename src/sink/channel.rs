//! Tokio mpsc channel sink implementation.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::sink::{AudioSink, SinkPort};
use crate::AudioChunk;

/// A sink that hands audio to a tokio mpsc channel.
///
/// This is the bridge out of the single-threaded pipeline: each write
/// becomes one [`AudioChunk`] on the channel, so the receiving side can live
/// on another task or thread.
///
/// The channel's capacity is the flow control. When it is full the write is
/// refused and the sink stalls; [`poll`](ChannelSink::poll), called once per
/// event-loop tick, resumes the source as soon as the receiver has made
/// room. A flush completes, again from `poll`, once the receiver has taken
/// every chunk. If the receiver is gone, samples are discarded.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioChunk, AudioSource, ChannelSink, MockSource};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<AudioChunk>(100);
/// let sink = ChannelSink::new(tx, 8000);
///
/// let mock = MockSource::new(8000);
/// mock.register_sink(sink.clone());
/// mock.generate_silence(20);
/// mock.pump();
///
/// let chunk = rx.try_recv().unwrap();
/// assert_eq!(chunk.len(), 160);
/// ```
#[derive(Debug)]
pub struct ChannelSink {
    port: SinkPort,
    sender: mpsc::Sender<AudioChunk>,
    sample_rate: u32,
    position: Cell<u64>,
    stalled: Cell<bool>,
    flush_pending: Cell<bool>,
    closed_reported: Cell<bool>,
}

impl ChannelSink {
    /// Creates a sink sending chunks stamped with `sample_rate`.
    ///
    /// The sender's buffer capacity bounds how far the pipeline may run
    /// ahead of the receiver.
    pub fn new(sender: mpsc::Sender<AudioChunk>, sample_rate: u32) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SinkPort::new(me.clone()),
            sender,
            sample_rate,
            position: Cell::new(0),
            stalled: Cell::new(false),
            flush_pending: Cell::new(false),
            closed_reported: Cell::new(false),
        })
    }

    /// Delivers the notifications owed to the source.
    ///
    /// Resumes a stalled source once the channel has room again, and
    /// completes a pending flush once the receiver has drained the channel
    /// (or dropped it).
    pub fn poll(&self) {
        let closed = self.sender.is_closed();

        if self.stalled.get() && (closed || self.sender.capacity() > 0) {
            self.stalled.set(false);
            tracing::trace!("channel sink has room again, resuming source");
            self.port.source_resume_output();
        }

        if self.flush_pending.get()
            && (closed || self.sender.capacity() == self.sender.max_capacity())
        {
            self.flush_pending.set(false);
            tracing::debug!("channel drained, flush complete");
            self.port.source_all_samples_flushed();
        }
    }

    /// Returns `true` while a write has been refused and not yet resumed.
    pub fn is_stalled(&self) -> bool {
        self.stalled.get()
    }

    /// Returns `true` while a flush waits for the receiver.
    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }

    fn timestamp(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.position.get() as f64 / f64::from(self.sample_rate))
    }
}

impl AudioSink for ChannelSink {
    fn sink_port(&self) -> &SinkPort {
        &self.port
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.flush_pending.set(false);

        let chunk = AudioChunk::new(samples.to_vec(), self.timestamp(), self.sample_rate);
        match self.sender.try_send(chunk) {
            Ok(()) => {
                self.position
                    .set(self.position.get() + samples.len() as u64);
                samples.len()
            }
            Err(TrySendError::Full(_)) => {
                tracing::trace!("channel full, stalling");
                self.stalled.set(true);
                0
            }
            Err(TrySendError::Closed(_)) => {
                if !self.closed_reported.replace(true) {
                    tracing::warn!("channel receiver dropped, discarding audio");
                }
                samples.len()
            }
        }
    }

    fn flush_samples(&self) {
        self.flush_pending.set(true);
    }
}
