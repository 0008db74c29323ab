//! N-way fan-out of one audio stream.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::reactor::Reactor;
use crate::sink::{AudioSink, SinkPort};
use crate::source::{same_node, AudioSource, SourcePort};

/// One output of the splitter.
struct Branch {
    port: SourcePort,
    splitter: Weak<AudioSplitter>,
    is_main: bool,
    /// Samples of the retained buffer this branch has consumed.
    pos: Cell<usize>,
    is_enabled: Cell<bool>,
    is_stopped: Cell<bool>,
    is_flushing: Cell<bool>,
    is_idle: Cell<bool>,
    /// Reported flushed during the current flush of the splitter.
    flushed: Cell<bool>,
}

impl Branch {
    fn new(splitter: Weak<AudioSplitter>, is_main: bool) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            port: SourcePort::new(me.clone()),
            splitter,
            is_main,
            pos: Cell::new(0),
            is_enabled: Cell::new(true),
            is_stopped: Cell::new(false),
            is_flushing: Cell::new(false),
            is_idle: Cell::new(true),
            flushed: Cell::new(false),
        })
    }

    fn write(&self, samples: &[f32]) -> usize {
        self.is_idle.set(false);
        self.is_flushing.set(false);
        if !self.is_enabled.get() {
            self.pos.set(self.pos.get() + samples.len());
            return samples.len();
        }
        if self.is_stopped.get() {
            return 0;
        }

        let written = self.port.sink_write_samples(samples);
        self.is_stopped.set(written < samples.len());
        self.pos.set(self.pos.get() + written);
        written
    }

    fn flush(&self) {
        if self.is_enabled.get() {
            self.is_flushing.set(true);
            self.port.sink_flush_samples();
        } else {
            self.is_idle.set(true);
            self.notify_flushed();
        }
    }

    fn set_enabled(&self, enabled: bool) {
        if self.is_enabled.replace(enabled) == enabled {
            return;
        }
        tracing::debug!(enabled, main = self.is_main, "splitter branch toggled");
        if enabled {
            return;
        }

        if self.is_flushing.replace(false) {
            self.notify_flushed();
        } else if !self.is_idle.get() {
            // The sink must not wait for samples that will never arrive
            self.port.sink_flush_samples();
        }

        if self.is_stopped.replace(false) {
            if let Some(splitter) = self.splitter.upgrade() {
                splitter.branch_resume_output();
            }
        }
    }

    fn notify_flushed(&self) {
        self.flushed.set(true);
        if let Some(splitter) = self.splitter.upgrade() {
            splitter.branch_all_samples_flushed();
        }
    }
}

impl AudioSource for Branch {
    fn source_port(&self) -> &SourcePort {
        &self.port
    }

    fn resume_output(&self) {
        self.is_stopped.set(false);
        if self.is_enabled.get() {
            if let Some(splitter) = self.splitter.upgrade() {
                splitter.branch_resume_output();
            }
        }
    }

    fn all_samples_flushed(&self) {
        let was_flushing = self.is_flushing.replace(false);
        self.is_idle.set(true);
        if self.is_enabled.get() && was_flushing {
            self.notify_flushed();
        }
    }
}

/// Feeds one input stream to any number of sinks.
///
/// Sinks are attached with [`add_sink`](AudioSplitter::add_sink). The
/// splitter is also an [`AudioSource`] in its own right: a sink registered
/// on it directly is served by a permanent main branch, just like the added
/// ones.
///
/// Every branch receives exactly the same samples. When some branch takes
/// less than a full write, the write is copied once into a retained buffer
/// and each branch catches up from it at its own pace. Until all branches
/// have caught up the splitter refuses new input (returns 0), so there is
/// never more than one generation of samples in flight; the input is resumed
/// as soon as the buffer is drained.
///
/// A flush waits for the retained buffer to drain, then flushes every
/// branch. The input is told the flush completed once all of them have.
///
/// # Example
///
/// ```
/// use audio_pipe::{AudioSink, AudioSource, AudioSplitter, MockSink, MockSource, Reactor};
///
/// let reactor = Reactor::new();
/// let input = MockSource::new(8000);
/// let splitter = AudioSplitter::new(&reactor);
/// input.register_sink(splitter.clone());
///
/// let fast = MockSink::new();
/// let slow = MockSink::limited(10);
/// splitter.add_sink(fast.clone(), false);
/// splitter.add_sink(slow.clone(), false);
///
/// input.add_samples(&[0.5; 16]);
/// input.pump();
/// assert_eq!(fast.received().len(), 16);
/// assert_eq!(slow.received().len(), 10);
///
/// slow.resume();
/// assert_eq!(slow.received().len(), 16);
/// ```
pub struct AudioSplitter {
    sink: SinkPort,
    source: SourcePort,
    me: Weak<AudioSplitter>,
    reactor: Reactor,
    main_branch: Rc<Branch>,
    branches: RefCell<Vec<Rc<Branch>>>,
    retained: RefCell<Option<Rc<[f32]>>>,
    do_flush: Cell<bool>,
    input_stopped: Cell<bool>,
    writing: Cell<bool>,
    cleanup_scheduled: Cell<bool>,
}

impl AudioSplitter {
    /// Creates a splitter. Removed branches are erased on a later tick of
    /// `reactor`.
    pub fn new(reactor: &Reactor) -> Rc<Self> {
        let splitter = Rc::new_cyclic(|me: &Weak<Self>| {
            let main_branch = Branch::new(me.clone(), true);
            Self {
                sink: SinkPort::new(me.clone()),
                source: SourcePort::new(me.clone()),
                me: me.clone(),
                reactor: reactor.clone(),
                branches: RefCell::new(vec![Rc::clone(&main_branch)]),
                main_branch,
                retained: RefCell::new(None),
                do_flush: Cell::new(false),
                input_stopped: Cell::new(false),
                writing: Cell::new(false),
                cleanup_scheduled: Cell::new(false),
            }
        });
        let main: Rc<dyn AudioSource> = splitter.main_branch.clone();
        splitter.source.set_handler(main);
        splitter
    }

    /// Adds a branch feeding `sink`. With `managed` the splitter owns the
    /// sink and drops it when the branch goes away.
    ///
    /// Returns `false` if the sink already has a source. A branch added
    /// while a partial write is still draining starts with the next write.
    pub fn add_sink(&self, sink: Rc<dyn AudioSink>, managed: bool) -> bool {
        let branch = Branch::new(self.me.clone(), false);
        if !branch.port.register_sink(sink, managed) {
            return false;
        }
        if let Some(retained) = self.retained.borrow().as_ref() {
            branch.pos.set(retained.len());
        }
        self.branches.borrow_mut().push(Rc::clone(&branch));
        tracing::debug!(branches = self.branch_count(), "splitter branch added");

        if self.do_flush.get() && self.retained.borrow().is_none() {
            branch.flush();
        }
        true
    }

    /// Adds a branch that owns `sink`.
    pub fn add_managed_sink(&self, sink: Rc<dyn AudioSink>) -> bool {
        self.add_sink(sink, true)
    }

    /// Disconnects the branch feeding `sink`. A managed sink is dropped.
    ///
    /// The branch itself is erased on the next reactor tick, so this is safe
    /// to call from within a pipeline callback.
    pub fn remove_sink(&self, sink: &Rc<dyn AudioSink>) {
        let Some(branch) = self.find_branch(sink).filter(|b| !b.is_main) else {
            return;
        };
        branch.port.unregister_sink();
        self.schedule_cleanup();
    }

    /// Disconnects every added branch. The main branch stays.
    pub fn remove_all_sinks(&self) {
        let branches = self.snapshot();
        for branch in branches.iter().filter(|b| !b.is_main) {
            branch.port.unregister_sink();
        }
        self.schedule_cleanup();
    }

    /// Enables or disables the branch feeding `sink`.
    ///
    /// A disabled branch drops its samples without holding the others back,
    /// and any flush it owed counts as completed.
    pub fn enable_sink(&self, sink: &Rc<dyn AudioSink>, enable: bool) {
        if let Some(branch) = self.find_branch(sink) {
            branch.set_enabled(enable);
        }
    }

    /// Number of connected branches, not counting the main branch.
    pub fn branch_count(&self) -> usize {
        self.branches
            .borrow()
            .iter()
            .filter(|b| !b.is_main && b.port.has_sink())
            .count()
    }

    /// Returns `true` while a partial write is retained for slow branches.
    pub fn is_draining(&self) -> bool {
        self.retained.borrow().is_some()
    }

    fn find_branch(&self, sink: &Rc<dyn AudioSink>) -> Option<Rc<Branch>> {
        self.branches
            .borrow()
            .iter()
            .find(|b| b.port.sink().is_some_and(|s| same_node(&s, sink)))
            .cloned()
    }

    fn snapshot(&self) -> Vec<Rc<Branch>> {
        self.branches.borrow().clone()
    }

    fn write_from_buffer(&self) {
        if self.writing.replace(true) {
            return;
        }

        loop {
            let Some(retained) = self.retained.borrow().clone() else {
                break;
            };

            let mut progress = false;
            let mut all_written = true;
            for branch in self.snapshot() {
                let pos = branch.pos.get();
                if pos < retained.len() {
                    progress |= branch.write(&retained[pos..]) > 0;
                }
                all_written &= branch.pos.get() >= retained.len();
            }

            if all_written {
                self.retained.borrow_mut().take();
                tracing::trace!("splitter buffer drained");
                if self.do_flush.get() {
                    self.flush_all_branches();
                }
                break;
            }
            if !progress {
                break;
            }
        }
        self.writing.set(false);

        if self.retained.borrow().is_none() && self.input_stopped.replace(false) {
            self.sink.source_resume_output();
        }
    }

    fn flush_all_branches(&self) {
        for branch in self.snapshot() {
            branch.flush();
        }
    }

    fn branch_resume_output(&self) {
        self.write_from_buffer();
    }

    fn branch_all_samples_flushed(&self) {
        self.check_flush_complete();
    }

    /// Completes the flush once every live branch has flushed. Branches
    /// that lost their sink no longer count, whether or not they have been
    /// erased yet.
    fn check_flush_complete(&self) {
        if !self.do_flush.get() || self.retained.borrow().is_some() {
            return;
        }
        let all_flushed = self
            .branches
            .borrow()
            .iter()
            .filter(|b| b.is_main || b.port.has_sink())
            .all(|b| b.flushed.get());
        if all_flushed {
            self.do_flush.set(false);
            tracing::debug!("all splitter branches flushed");
            self.sink.source_all_samples_flushed();
        }
    }

    fn schedule_cleanup(&self) {
        if self.cleanup_scheduled.replace(true) {
            return;
        }
        let me = self.me.clone();
        self.reactor.defer(move || {
            if let Some(splitter) = me.upgrade() {
                splitter.cleanup_branches();
            }
        });
    }

    fn cleanup_branches(&self) {
        self.cleanup_scheduled.set(false);
        let removed: Vec<Rc<Branch>> = {
            let mut branches = self.branches.borrow_mut();
            let (keep, removed) = std::mem::take(&mut *branches)
                .into_iter()
                .partition(|b| b.is_main || b.port.has_sink());
            *branches = keep;
            removed
        };
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "erased splitter branches");
        }
        drop(removed);
        self.check_flush_complete();
    }
}

impl AudioSink for AudioSplitter {
    fn sink_port(&self) -> &SinkPort {
        &self.sink
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        self.do_flush.set(false);
        if samples.is_empty() {
            return 0;
        }
        if self.retained.borrow().is_some() || self.writing.get() {
            self.input_stopped.set(true);
            return 0;
        }

        let branches = self.snapshot();
        for branch in &branches {
            branch.pos.set(0);
        }

        self.writing.set(true);
        for branch in &branches {
            let written = branch.write(samples);
            if written != samples.len() && self.retained.borrow().is_none() {
                *self.retained.borrow_mut() = Some(Rc::from(samples));
            }
        }
        self.writing.set(false);

        self.write_from_buffer();
        samples.len()
    }

    fn flush_samples(&self) {
        if self.do_flush.replace(true) {
            return;
        }
        for branch in self.branches.borrow().iter() {
            branch.flushed.set(false);
        }
        if self.retained.borrow().is_some() {
            return;
        }
        self.flush_all_branches();
    }
}

impl AudioSource for AudioSplitter {
    fn source_port(&self) -> &SourcePort {
        &self.source
    }
}

impl fmt::Debug for AudioSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSplitter")
            .field("branches", &self.branch_count())
            .field("draining", &self.is_draining())
            .field("do_flush", &self.do_flush.get())
            .field("input_stopped", &self.input_stopped.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;
    use crate::source::MockSource;
    use std::cell::Cell;

    fn input_with_splitter() -> (Reactor, Rc<MockSource>, Rc<AudioSplitter>) {
        let reactor = Reactor::new();
        let input = MockSource::new(8000);
        let splitter = AudioSplitter::new(&reactor);
        assert!(input.register_sink(splitter.clone()));
        (reactor, input, splitter)
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    #[test]
    fn test_all_branches_get_identical_samples() {
        let (_reactor, input, splitter) = input_with_splitter();
        let sinks: Vec<_> = [None, Some(3), Some(7)]
            .into_iter()
            .map(|limit| {
                let sink = MockSink::new();
                sink.set_accept_limit(limit);
                splitter.add_sink(sink.clone(), false);
                sink
            })
            .collect();

        let data = ramp(20);
        input.add_samples(&data);
        input.pump();
        assert!(splitter.is_draining());

        for _ in 0..10 {
            for sink in &sinks {
                sink.resume();
            }
        }
        for sink in &sinks {
            assert_eq!(sink.received(), data);
        }
        assert!(!splitter.is_draining());
    }

    #[test]
    fn test_input_refused_while_draining() {
        let (_reactor, input, splitter) = input_with_splitter();
        let slow = MockSink::limited(4);
        splitter.add_sink(slow.clone(), false);

        assert_eq!(input.offer(&[0.1; 8]), 8);
        assert_eq!(input.offer(&[0.2; 8]), 0);
        assert_eq!(slow.received().len(), 4);

        slow.set_accept_limit(None);
        slow.resume();
        assert_eq!(slow.received(), vec![0.1; 8]);
        assert_eq!(input.resume_count(), 1);
    }

    #[test]
    fn test_flush_deferred_until_drained() {
        let (_reactor, input, splitter) = input_with_splitter();
        let fast = MockSink::new();
        let slow = MockSink::limited(5);
        splitter.add_sink(fast.clone(), false);
        splitter.add_sink(slow.clone(), false);

        input.add_samples(&[0.3; 10]);
        input.flush();
        input.pump();
        assert_eq!(fast.flush_requests(), 0);
        assert_eq!(input.flushes_completed(), 0);

        slow.resume();
        assert_eq!(fast.flush_requests(), 1);
        assert_eq!(slow.flush_requests(), 1);
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_flush_completes_after_every_branch() {
        let (_reactor, input, splitter) = input_with_splitter();
        let a = MockSink::new();
        let b = MockSink::new();
        a.set_manual_flush(true);
        b.set_manual_flush(true);
        splitter.add_sink(a.clone(), false);
        splitter.add_sink(b.clone(), false);

        input.flush();
        a.complete_flush();
        assert_eq!(input.flushes_completed(), 0);
        b.complete_flush();
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_no_branches_flush_completes() {
        let (_reactor, input, _splitter) = input_with_splitter();
        input.flush();
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_main_branch_serves_registered_sink() {
        let (_reactor, input, splitter) = input_with_splitter();
        let direct = MockSink::limited(2);
        let added = MockSink::new();
        assert!(splitter.register_sink(direct.clone()));
        splitter.add_sink(added.clone(), false);
        assert!(same_node(&direct.source().unwrap(), &splitter));

        input.add_samples(&[0.4; 5]);
        input.pump();
        assert_eq!(direct.received().len(), 2);

        direct.set_accept_limit(None);
        direct.resume();
        assert_eq!(direct.received().len(), 5);
        assert_eq!(added.received().len(), 5);
    }

    #[test]
    fn test_disable_stalled_branch_releases_input() {
        let (_reactor, input, splitter) = input_with_splitter();
        let stuck = MockSink::limited(0);
        let other = MockSink::new();
        splitter.add_sink(stuck.clone(), false);
        splitter.add_sink(other.clone(), false);

        input.add_samples(&[0.5; 30]);
        input.pump();
        input.add_samples(&[0.6; 6]);
        assert_eq!(input.pump(), 0);
        assert!(splitter.is_draining());
        assert_eq!(input.queued(), 6);

        let stuck_dyn: Rc<dyn AudioSink> = stuck.clone();
        splitter.enable_sink(&stuck_dyn, false);
        assert!(!splitter.is_draining());
        assert_eq!(input.queued(), 0);
        assert_eq!(other.received().len(), 36);
        assert!(stuck.received().is_empty());
    }

    #[test]
    fn test_disable_flushing_branch_counts_as_flushed() {
        let (_reactor, input, splitter) = input_with_splitter();
        let silent = MockSink::new();
        silent.set_manual_flush(true);
        splitter.add_sink(silent.clone(), false);

        input.flush();
        assert_eq!(input.flushes_completed(), 0);

        let silent_dyn: Rc<dyn AudioSink> = silent.clone();
        splitter.enable_sink(&silent_dyn, false);
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_remove_sink_is_deferred_to_next_tick() {
        let (reactor, _input, splitter) = input_with_splitter();
        let drops = Rc::new(Cell::new(0));
        let owned: Rc<dyn AudioSink> = MockSink::with_drop_counter(drops.clone());
        splitter.add_managed_sink(Rc::clone(&owned));
        assert_eq!(splitter.branch_count(), 1);

        splitter.remove_sink(&owned);
        drop(owned);
        assert_eq!(drops.get(), 1);
        assert_eq!(splitter.branches.borrow().len(), 2);

        assert_eq!(reactor.run_once(), 1);
        assert_eq!(splitter.branches.borrow().len(), 1);
        assert_eq!(splitter.branch_count(), 0);
    }

    #[test]
    fn test_removing_flushing_branch_completes_flush() {
        let (reactor, input, splitter) = input_with_splitter();
        let a = MockSink::new();
        let b = MockSink::new();
        b.set_manual_flush(true);
        splitter.add_sink(a.clone(), false);
        splitter.add_sink(b.clone(), false);

        input.flush();
        assert_eq!(input.flushes_completed(), 0);

        let b_dyn: Rc<dyn AudioSink> = b.clone();
        splitter.remove_sink(&b_dyn);
        reactor.run_until_idle();
        assert_eq!(input.flushes_completed(), 1);
        assert!(!b.has_source());
    }

    #[test]
    fn test_removed_branch_does_not_stand_in_for_pending_one() {
        let (reactor, input, splitter) = input_with_splitter();
        let a = MockSink::new();
        let b = MockSink::new();
        a.set_manual_flush(true);
        b.set_manual_flush(true);
        splitter.add_sink(a.clone(), false);
        splitter.add_sink(b.clone(), false);

        input.flush();
        let b_dyn: Rc<dyn AudioSink> = b.clone();
        splitter.remove_sink(&b_dyn);
        assert_eq!(input.flushes_completed(), 0);

        reactor.run_until_idle();
        assert_eq!(splitter.branch_count(), 1);
        assert_eq!(input.flushes_completed(), 0, "a has not flushed yet");

        assert!(a.complete_flush());
        assert_eq!(input.flushes_completed(), 1);
    }

    #[test]
    fn test_each_flush_waits_for_every_branch_again() {
        let (_reactor, input, splitter) = input_with_splitter();
        let a = MockSink::new();
        let b = MockSink::new();
        a.set_manual_flush(true);
        b.set_manual_flush(true);
        splitter.add_sink(a.clone(), false);
        splitter.add_sink(b.clone(), false);

        input.flush();
        a.complete_flush();
        b.complete_flush();
        assert_eq!(input.flushes_completed(), 1);

        input.offer(&[0.1; 4]);
        input.flush();
        a.complete_flush();
        assert_eq!(input.flushes_completed(), 1);
        b.complete_flush();
        assert_eq!(input.flushes_completed(), 2);
    }

    #[test]
    fn test_add_sink_rejects_connected_sink() {
        let (_reactor, _input, splitter) = input_with_splitter();
        let other = MockSource::new(8000);
        let sink = MockSink::new();
        other.register_sink(sink.clone());
        assert!(!splitter.add_sink(sink, false));
        assert_eq!(splitter.branch_count(), 0);
    }
}
