//! The producing half of the audio pipe contract.
//!
//! Every component that outputs samples implements [`AudioSource`] and embeds
//! a [`SourcePort`], which holds the registration state: the downstream sink,
//! whether that sink is owned, the optional handler and the flush flag.
//!
//! Samples are pushed downstream with [`SourcePort::sink_write_samples`]. The
//! sink reports how many it took; when that is less than offered the source
//! must stop producing until the sink calls [`AudioSource::resume_output`].
//! A flush requested with [`SourcePort::sink_flush_samples`] completes when
//! the sink calls back into [`SourcePort::handle_all_samples_flushed`].

mod callback;
mod mock;

pub use callback::CallbackSource;
pub use mock::MockSource;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::sink::AudioSink;

/// Returns `true` if both handles point at the same node, ignoring vtables.
pub(crate) fn same_node<T: ?Sized, U: ?Sized>(a: &Rc<T>, b: &Rc<U>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// A component that produces audio samples.
///
/// Implementors only have to return their [`SourcePort`]. The two hooks,
/// [`resume_output`](AudioSource::resume_output) and
/// [`all_samples_flushed`](AudioSource::all_samples_flushed), forward to the
/// handler by default; leaf sources override them.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSink, AudioSource, MockSink, MockSource};
///
/// let source = MockSource::new(8000);
/// let sink = MockSink::new();
/// assert!(source.register_sink(sink.clone()));
/// assert!(sink.has_source());
///
/// source.add_samples(&[0.1, 0.2, 0.3]);
/// source.pump();
/// assert_eq!(sink.received(), vec![0.1, 0.2, 0.3]);
/// ```
pub trait AudioSource {
    /// Registration state of this source.
    fn source_port(&self) -> &SourcePort;

    /// Called by the registered sink when it can accept samples again after
    /// having accepted fewer than offered.
    fn resume_output(&self) {
        if let Some(handler) = self.source_port().handler() {
            handler.resume_output();
        }
    }

    /// Called when the registered sink has played out every sample written
    /// before the last flush request.
    ///
    /// Invoked through [`SourcePort::handle_all_samples_flushed`], which
    /// clears the flushing state first.
    fn all_samples_flushed(&self) {
        if let Some(handler) = self.source_port().handler() {
            handler.source_port().handle_all_samples_flushed();
        }
    }

    /// Connects `sink` to this source. See [`SourcePort::register_sink`].
    fn register_sink(&self, sink: Rc<dyn AudioSink>) -> bool {
        self.source_port().register_sink(sink, false)
    }

    /// Connects `sink` and takes ownership of it: the sink lives at least as
    /// long as this source keeps it registered.
    fn register_managed_sink(&self, sink: Rc<dyn AudioSink>) -> bool {
        self.source_port().register_sink(sink, true)
    }

    /// Disconnects the registered sink, if any.
    fn unregister_sink(&self) {
        self.source_port().unregister_sink();
    }

    /// The registered sink.
    fn sink(&self) -> Option<Rc<dyn AudioSink>> {
        self.source_port().sink()
    }

    /// Returns `true` if a sink is registered.
    fn has_sink(&self) -> bool {
        self.source_port().has_sink()
    }
}

enum SinkLink {
    Managed(Rc<dyn AudioSink>),
    Shared(Weak<dyn AudioSink>),
}

impl SinkLink {
    fn get(&self) -> Option<Rc<dyn AudioSink>> {
        match self {
            Self::Managed(sink) => Some(Rc::clone(sink)),
            Self::Shared(sink) => sink.upgrade(),
        }
    }
}

/// Registration and flush state of an [`AudioSource`].
///
/// A port is created inside `Rc::new_cyclic` so it can hand out references
/// to the node it belongs to:
///
/// ```
/// use audio_pipe::{AudioSource, SourcePort};
/// use std::rc::Rc;
///
/// struct Silence {
///     port: SourcePort,
/// }
///
/// impl AudioSource for Silence {
///     fn source_port(&self) -> &SourcePort {
///         &self.port
///     }
///
///     fn resume_output(&self) {}
///
///     fn all_samples_flushed(&self) {}
/// }
///
/// let node = Rc::new_cyclic(|me| Silence { port: SourcePort::new(me.clone()) });
/// assert!(!node.has_sink());
/// ```
///
/// Dropping the port unregisters from the sink. A managed sink is released
/// with it.
pub struct SourcePort {
    this: Weak<dyn AudioSource>,
    sink: RefCell<Option<SinkLink>>,
    handler: RefCell<Option<Weak<dyn AudioSource>>>,
    auto_unreg_source: Cell<bool>,
    is_flushing: Cell<bool>,
}

impl SourcePort {
    /// Creates an unconnected port for the node behind `this`.
    pub fn new<T: AudioSource + 'static>(this: Weak<T>) -> Self {
        let this: Weak<dyn AudioSource> = this;
        Self {
            this,
            sink: RefCell::new(None),
            handler: RefCell::new(None),
            auto_unreg_source: Cell::new(false),
            is_flushing: Cell::new(false),
        }
    }

    /// The registered sink.
    pub fn sink(&self) -> Option<Rc<dyn AudioSink>> {
        self.sink.borrow().as_ref().and_then(SinkLink::get)
    }

    /// Returns `true` if a sink is registered.
    pub fn has_sink(&self) -> bool {
        self.sink().is_some()
    }

    /// Returns `true` if the registered sink is owned by this port.
    pub fn sink_managed(&self) -> bool {
        matches!(*self.sink.borrow(), Some(SinkLink::Managed(_)))
    }

    /// Returns `true` while a flush request is outstanding downstream.
    pub fn is_flushing(&self) -> bool {
        self.is_flushing.get()
    }

    /// The source this port delegates its hooks to, if any.
    pub fn handler(&self) -> Option<Rc<dyn AudioSource>> {
        self.handler.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Connects `sink`.
    ///
    /// Returns `true` if the sink is now registered, including when it
    /// already was. Returns `false`, leaving the current registration
    /// untouched, if a different sink is registered, if the sink is already
    /// fed by another source, or if the registration cannot be passed on to
    /// the handler. A failed registration leaves no half-made link behind.
    pub fn register_sink(&self, sink: Rc<dyn AudioSink>, managed: bool) -> bool {
        self.register_sink_internal(sink, managed, true)
    }

    /// Disconnects the registered sink.
    ///
    /// A no-op if nothing is registered. Otherwise the sink side and the
    /// handler are unregistered too, and the node is told that nothing
    /// stands in its way any more: a pending flush completes, otherwise
    /// output resumes.
    pub fn unregister_sink(&self) {
        self.unregister_sink_internal(false);
    }

    /// Offers `samples` to the registered sink and returns how many it took.
    ///
    /// With no sink registered the samples are discarded and reported as
    /// written. Any write cancels an outstanding flush.
    ///
    /// # Panics
    ///
    /// Panics if the sink claims to have accepted more samples than offered.
    pub fn sink_write_samples(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        self.is_flushing.set(false);
        let Some(sink) = self.sink() else {
            return samples.len();
        };
        let written = sink.write_samples(samples);
        assert!(
            written <= samples.len(),
            "sink accepted {written} samples, only {} were offered",
            samples.len()
        );
        written
    }

    /// Asks the registered sink to flush. Without a sink the flush completes
    /// immediately.
    pub fn sink_flush_samples(&self) {
        match self.sink() {
            Some(sink) => {
                self.is_flushing.set(true);
                sink.flush_samples();
            }
            None => self.handle_all_samples_flushed(),
        }
    }

    /// Completes a flush: clears the flushing state and runs the node's
    /// [`AudioSource::all_samples_flushed`] hook.
    pub fn handle_all_samples_flushed(&self) {
        self.is_flushing.set(false);
        if let Some(node) = self.this.upgrade() {
            node.all_samples_flushed();
        }
    }

    /// Delegates this source to `handler`.
    ///
    /// The handler gets a one-way registration to the current sink (and to
    /// every sink registered later) so that it can write to it directly,
    /// while the sink keeps seeing this node as its source. The hooks of
    /// this node forward to the handler by default.
    pub fn set_handler(&self, handler: Rc<dyn AudioSource>) -> bool {
        self.clear_handler();
        if let Some(sink) = self.sink() {
            if !handler.source_port().register_sink_internal(sink, false, false) {
                return false;
            }
        }
        *self.handler.borrow_mut() = Some(Rc::downgrade(&handler));
        true
    }

    /// Removes the handler, unregistering it from the current sink.
    pub fn clear_handler(&self) {
        let handler = self.handler.borrow_mut().take();
        let Some(handler) = handler.and_then(|h| h.upgrade()) else {
            return;
        };
        if self.has_sink() {
            handler.source_port().unregister_sink();
        }
    }

    fn register_sink_internal(&self, sink: Rc<dyn AudioSink>, managed: bool, reg: bool) -> bool {
        if let Some(current) = self.sink() {
            return same_node(&current, &sink);
        }

        *self.sink.borrow_mut() = Some(SinkLink::Shared(Rc::downgrade(&sink)));
        self.auto_unreg_source.set(reg);

        if reg {
            let registered = match self.this.upgrade() {
                Some(node) => sink.sink_port().register_source_internal(node, true),
                None => false,
            };
            if !registered {
                *self.sink.borrow_mut() = None;
                return false;
            }
        }

        if let Some(handler) = self.handler() {
            if !handler
                .source_port()
                .register_sink_internal(Rc::clone(&sink), false, false)
            {
                *self.sink.borrow_mut() = None;
                if reg {
                    sink.sink_port().unregister_source();
                }
                tracing::debug!("sink registration rejected by handler, rolled back");
                return false;
            }
        }

        if managed {
            *self.sink.borrow_mut() = Some(SinkLink::Managed(sink));
        }
        true
    }

    /// Drops the link to the sink without telling anyone. Used to undo a
    /// registration that the sink side could not complete, where no flush or
    /// stall can have happened yet.
    pub(crate) fn discard_sink(&self) {
        let link = self.sink.borrow_mut().take();
        if link.is_none() {
            return;
        }
        if let Some(handler) = self.handler() {
            handler.source_port().discard_sink();
        }
        drop(link);
    }

    fn unregister_sink_internal(&self, is_being_destroyed: bool) {
        let link = self.sink.borrow_mut().take();
        let Some(link) = link else {
            return;
        };

        if self.auto_unreg_source.get() {
            if let Some(sink) = link.get() {
                sink.sink_port().unregister_source();
            }
        }

        if let Some(handler) = self.handler() {
            handler.source_port().unregister_sink();
        }

        if !is_being_destroyed {
            if self.is_flushing.get() {
                self.handle_all_samples_flushed();
            } else if let Some(node) = self.this.upgrade() {
                node.resume_output();
            }
        }

        // A managed sink is released only after every callback above has
        // returned.
        drop(link);
    }
}

impl Drop for SourcePort {
    fn drop(&mut self) {
        self.unregister_sink_internal(true);
        self.clear_handler();
    }
}

impl fmt::Debug for SourcePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePort")
            .field("has_sink", &self.has_sink())
            .field("sink_managed", &self.sink_managed())
            .field("has_handler", &self.handler().is_some())
            .field("is_flushing", &self.is_flushing.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MockSink, SinkPort};
    use std::cell::Cell;

    #[test]
    fn test_register_is_symmetric() {
        let source = MockSource::new(8000);
        let sink = MockSink::new();

        assert!(source.register_sink(sink.clone()));
        assert!(same_node(&source.sink().unwrap(), &sink));
        assert!(same_node(&sink.source().unwrap(), &source));

        source.unregister_sink();
        assert!(source.sink().is_none());
        assert!(sink.source().is_none());
    }

    #[test]
    fn test_register_same_sink_twice() {
        let source = MockSource::new(8000);
        let sink = MockSink::new();

        assert!(source.register_sink(sink.clone()));
        assert!(source.register_sink(sink.clone()));
        assert!(same_node(&source.sink().unwrap(), &sink));
    }

    #[test]
    fn test_register_conflicting_sink_fails() {
        let source = MockSource::new(8000);
        let first = MockSink::new();
        let second = MockSink::new();

        assert!(source.register_sink(first.clone()));
        assert!(!source.register_sink(second.clone()));
        assert!(same_node(&source.sink().unwrap(), &first));
        assert!(!second.has_source());
    }

    #[test]
    fn test_sink_already_fed_rejects_second_source() {
        let a = MockSource::new(8000);
        let b = MockSource::new(8000);
        let sink = MockSink::new();

        assert!(a.register_sink(sink.clone()));
        assert!(!b.register_sink(sink.clone()));
        assert!(!b.has_sink());
        assert!(same_node(&sink.source().unwrap(), &a));
    }

    #[test]
    fn test_unregister_without_sink_is_noop() {
        let source = MockSource::new(8000);
        source.unregister_sink();
        assert_eq!(source.resume_count(), 0);
    }

    #[test]
    fn test_unregister_resumes_output() {
        let source = MockSource::new(8000);
        let sink = MockSink::new();
        source.register_sink(sink.clone());

        source.unregister_sink();
        assert_eq!(source.resume_count(), 1);
        assert_eq!(source.flushes_completed(), 0);
    }

    #[test]
    fn test_unregister_while_flushing_completes_flush() {
        let source = MockSource::new(8000);
        let sink = MockSink::new();
        sink.set_manual_flush(true);
        source.register_sink(sink.clone());

        source.flush();
        assert_eq!(source.flushes_completed(), 0);

        source.unregister_sink();
        assert_eq!(source.flushes_completed(), 1);
        assert_eq!(source.resume_count(), 0);
    }

    #[test]
    fn test_write_without_sink_discards() {
        let source = MockSource::new(8000);
        assert_eq!(source.offer(&[0.0; 16]), 16);
    }

    #[test]
    fn test_flush_without_sink_completes_immediately() {
        let source = MockSource::new(8000);
        source.flush();
        assert_eq!(source.flushes_completed(), 1);
    }

    #[test]
    fn test_managed_sink_dropped_with_source() {
        let drops = Rc::new(Cell::new(0));
        let source = MockSource::new(8000);
        source.register_managed_sink(MockSink::with_drop_counter(drops.clone()));
        assert!(source.source_port().sink_managed());

        drop(source);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_unmanaged_sink_survives_source() {
        let drops = Rc::new(Cell::new(0));
        let sink = MockSink::with_drop_counter(drops.clone());
        let source = MockSource::new(8000);
        source.register_sink(sink.clone());

        drop(source);
        assert_eq!(drops.get(), 0);
        assert!(!sink.has_source());
    }

    #[test]
    #[should_panic(expected = "only 2 were offered")]
    fn test_over_accepting_sink_is_fatal() {
        struct Greedy {
            port: SinkPort,
        }

        impl AudioSink for Greedy {
            fn sink_port(&self) -> &SinkPort {
                &self.port
            }

            fn write_samples(&self, samples: &[f32]) -> usize {
                samples.len() + 1
            }

            fn flush_samples(&self) {}
        }

        let greedy = Rc::new_cyclic(|me| Greedy {
            port: SinkPort::new(me.clone()),
        });
        let source = MockSource::new(8000);
        source.register_sink(greedy.clone());
        source.offer(&[0.0, 0.0]);
    }

    #[test]
    fn test_port_debug() {
        let source = MockSource::new(8000);
        let debug = format!("{:?}", source.source_port());
        assert!(debug.contains("has_sink: false"));
    }
}
