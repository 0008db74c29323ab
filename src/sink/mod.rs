//! The consuming half of the audio pipe contract.
//!
//! A component that takes samples implements [`AudioSink`] and embeds a
//! [`SinkPort`]. The sink may accept fewer samples than offered; it then owes
//! its source a call to [`SinkPort::source_resume_output`] once it can take
//! more. After a flush request it owes exactly one
//! [`SinkPort::source_all_samples_flushed`], unless new samples arrive first.
//!
//! The crate ships a few terminal sinks:
//!
//! - [`CallbackSink`]: forwards samples and flushes to closures
//! - [`ChannelSink`]: sends [`AudioChunk`](crate::AudioChunk)s to a tokio mpsc channel
//! - [`WavFileSink`]: records to a WAV file
//! - [`MockSink`]: records everything it gets, for tests

mod callback;
mod channel;
mod file;
mod mock;

pub use callback::CallbackSink;
pub use channel::ChannelSink;
pub use file::WavFileSink;
pub use mock::MockSink;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::source::{same_node, AudioSource};

/// A component that consumes audio samples.
///
/// [`write_samples`](AudioSink::write_samples) and
/// [`flush_samples`](AudioSink::flush_samples) forward to the handler by
/// default. A sink without a handler must override both.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSink, SinkPort};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Meter {
///     port: SinkPort,
///     peak: Cell<f32>,
/// }
///
/// impl AudioSink for Meter {
///     fn sink_port(&self) -> &SinkPort {
///         &self.port
///     }
///
///     fn write_samples(&self, samples: &[f32]) -> usize {
///         let peak = samples.iter().fold(self.peak.get(), |p, s| p.max(s.abs()));
///         self.peak.set(peak);
///         samples.len()
///     }
///
///     fn flush_samples(&self) {
///         self.port.source_all_samples_flushed();
///     }
/// }
///
/// let meter = Rc::new_cyclic(|me| Meter {
///     port: SinkPort::new(me.clone()),
///     peak: Cell::new(0.0),
/// });
/// assert_eq!(meter.write_samples(&[0.25, -0.5]), 2);
/// assert_eq!(meter.peak.get(), 0.5);
/// ```
pub trait AudioSink {
    /// Registration state of this sink.
    fn sink_port(&self) -> &SinkPort;

    /// Offers samples. Returns how many were accepted, at most
    /// `samples.len()`.
    ///
    /// # Panics
    ///
    /// The default implementation panics if no handler is set.
    fn write_samples(&self, samples: &[f32]) -> usize {
        match self.sink_port().handler() {
            Some(handler) => handler.write_samples(samples),
            None => panic!("write_samples called on a sink without handler or override"),
        }
    }

    /// Requests that every accepted sample be played out, followed by one
    /// call to the source's `all_samples_flushed`.
    ///
    /// # Panics
    ///
    /// The default implementation panics if no handler is set.
    fn flush_samples(&self) {
        match self.sink_port().handler() {
            Some(handler) => handler.flush_samples(),
            None => panic!("flush_samples called on a sink without handler or override"),
        }
    }

    /// Connects `source`. See [`SinkPort::register_source`].
    fn register_source(&self, source: Rc<dyn AudioSource>) -> bool {
        self.sink_port().register_source(source)
    }

    /// Disconnects the registered source, if any.
    fn unregister_source(&self) {
        self.sink_port().unregister_source();
    }

    /// The registered source.
    fn source(&self) -> Option<Rc<dyn AudioSource>> {
        self.sink_port().source()
    }

    /// Returns `true` if a source is registered.
    fn has_source(&self) -> bool {
        self.sink_port().has_source()
    }
}

/// Registration state of an [`AudioSink`].
///
/// A sink never owns its source; ownership only flows downstream.
pub struct SinkPort {
    this: Weak<dyn AudioSink>,
    source: RefCell<Option<Weak<dyn AudioSource>>>,
    handler: RefCell<Option<Weak<dyn AudioSink>>>,
    auto_unreg_sink: Cell<bool>,
}

impl SinkPort {
    /// Creates an unconnected port for the node behind `this`.
    pub fn new<T: AudioSink + 'static>(this: Weak<T>) -> Self {
        let this: Weak<dyn AudioSink> = this;
        Self {
            this,
            source: RefCell::new(None),
            handler: RefCell::new(None),
            auto_unreg_sink: Cell::new(false),
        }
    }

    /// The registered source.
    pub fn source(&self) -> Option<Rc<dyn AudioSource>> {
        self.source.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Returns `true` if a source is registered.
    pub fn has_source(&self) -> bool {
        self.source().is_some()
    }

    /// The sink this port delegates writes and flushes to, if any.
    pub fn handler(&self) -> Option<Rc<dyn AudioSink>> {
        self.handler.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Connects `source`, registering this sink on the source side as well.
    ///
    /// Returns `true` if the source is now registered, including when it
    /// already was, and `false` if another source is registered or the
    /// source side refuses.
    pub fn register_source(&self, source: Rc<dyn AudioSource>) -> bool {
        self.register_source_internal(source, true)
    }

    /// Disconnects the registered source and unregisters it from the
    /// source side and from the handler.
    pub fn unregister_source(&self) {
        let source = self.source.borrow_mut().take();
        let Some(source) = source else {
            return;
        };

        if self.auto_unreg_sink.get() {
            if let Some(source) = source.upgrade() {
                source.source_port().unregister_sink();
            }
        }

        if let Some(handler) = self.handler() {
            handler.sink_port().unregister_source();
        }
    }

    /// Tells the registered source that this sink accepts samples again.
    pub fn source_resume_output(&self) {
        if let Some(source) = self.source() {
            source.resume_output();
        }
    }

    /// Tells the registered source that its flush has completed.
    pub fn source_all_samples_flushed(&self) {
        if let Some(source) = self.source() {
            source.source_port().handle_all_samples_flushed();
        }
    }

    /// Delegates this sink to `handler`.
    ///
    /// The handler gets a one-way registration to the current source (and to
    /// every source registered later), so it can call back into it directly.
    pub fn set_handler(&self, handler: Rc<dyn AudioSink>) -> bool {
        self.clear_handler();
        if let Some(source) = self.source() {
            if !handler.sink_port().register_source_internal(source, false) {
                return false;
            }
        }
        *self.handler.borrow_mut() = Some(Rc::downgrade(&handler));
        true
    }

    /// Removes the handler, unregistering it from the current source.
    pub fn clear_handler(&self) {
        let handler = self.handler.borrow_mut().take();
        let Some(handler) = handler.and_then(|h| h.upgrade()) else {
            return;
        };
        if self.has_source() {
            handler.sink_port().unregister_source();
        }
    }

    pub(crate) fn register_source_internal(
        &self,
        source: Rc<dyn AudioSource>,
        reg_sink: bool,
    ) -> bool {
        if let Some(current) = self.source() {
            return same_node(&current, &source);
        }

        *self.source.borrow_mut() = Some(Rc::downgrade(&source));
        self.auto_unreg_sink.set(reg_sink);

        if reg_sink {
            let registered = match self.this.upgrade() {
                Some(node) => source.source_port().register_sink(node, false),
                None => false,
            };
            if !registered {
                *self.source.borrow_mut() = None;
                return false;
            }
        }

        if let Some(handler) = self.handler() {
            if !handler
                .sink_port()
                .register_source_internal(Rc::clone(&source), false)
            {
                *self.source.borrow_mut() = None;
                if reg_sink {
                    source.source_port().discard_sink();
                }
                tracing::debug!("source registration rejected by handler, rolled back");
                return false;
            }
        }

        true
    }
}

impl Drop for SinkPort {
    fn drop(&mut self) {
        self.unregister_source();
        self.clear_handler();
    }
}

impl fmt::Debug for SinkPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkPort")
            .field("has_source", &self.has_source())
            .field("has_handler", &self.handler().is_some())
            .finish()
    }
}
