// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Epoch based grace-period detection.
//!
//! The domain keeps a global epoch and one slot per reader thread. A pinned thread publishes the
//! epoch it observed when entering its read-side section; an unpinned thread publishes
//! [`INACTIVE`]. Work deferred at epoch `e` may run once every published epoch is greater than
//! `e`, i.e. once all readers that could have seen the object before it was unlinked are gone.

use concurrency::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};
use concurrency::sync::{Arc, Mutex};
use concurrency::thread::{current, park_timeout};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Epoch published by threads outside of any read-side section
const INACTIVE: u64 = u64::MAX;

/// Longest pause of [`Domain::synchronize`] between two sweeps
const SYNC_MAX_BACKOFF: Duration = Duration::from_millis(10);

struct Slot {
    epoch: AtomicU64,
}

/// Per-thread state. Pins are counted so that read-side sections nest.
struct Local {
    slot: Arc<Slot>,
    pins: Cell<usize>,
}

#[cfg(not(any(feature = "loom", feature = "shuttle")))]
type Locals = thread_local::ThreadLocal<Local>;

#[cfg(any(feature = "loom", feature = "shuttle"))]
type Locals = model::Locals;

/// Model checkers run their threads as coroutines of a single OS thread, which `thread_local`
/// cannot tell apart. Locals are keyed by the thread id of the checker instead.
#[cfg(any(feature = "loom", feature = "shuttle"))]
mod model {
    use super::Local;
    use concurrency::sync::Mutex;
    use concurrency::thread::current;

    #[cfg(feature = "loom")]
    use loom::thread::ThreadId;
    #[cfg(all(feature = "shuttle", not(feature = "loom")))]
    use shuttle::thread::ThreadId;

    pub(super) struct Locals {
        entries: Mutex<Vec<(ThreadId, Box<Local>)>>,
    }

    impl Locals {
        pub(super) fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }

        fn find(entries: &[(ThreadId, Box<Local>)], id: &ThreadId) -> Option<*const Local> {
            entries
                .iter()
                .find(|(owner, _)| owner == id)
                .map(|(_, local)| &raw const **local)
        }

        pub(super) fn get(&self) -> Option<&Local> {
            let local = Self::find(&self.entries.lock(), &current().id())?;
            // SAFETY: boxed locals are neither moved nor dropped before `self` is
            unsafe { local.as_ref() }
        }

        pub(super) fn get_or(&self, create: impl FnOnce() -> Local) -> &Local {
            let id = current().id();
            let mut entries = self.entries.lock();
            let local = match Self::find(&entries, &id) {
                Some(local) => local,
                None => {
                    entries.push((id, Box::new(create())));
                    let (_, local) = &entries[entries.len() - 1];
                    &raw const **local
                }
            };
            drop(entries);
            // SAFETY: as above, and only the owner thread ever gets this entry
            unsafe { &*local }
        }
    }
}

struct Deferred {
    epoch: u64,
    call: Box<dyn FnOnce() + Send>,
}

struct Shared {
    epoch: AtomicU64,
    slots: Mutex<Vec<Arc<Slot>>>,
    locals: Locals,
    garbage: Mutex<VecDeque<Deferred>>,
    pending: AtomicUsize,
    deferred: AtomicU64,
    reclaimed: AtomicU64,
}

/// A grace-period domain. Cloning yields another handle to the same domain.
#[derive(Clone)]
pub struct Domain {
    shared: Arc<Shared>,
}

/// Counters describing a [`Domain`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DomainStats {
    pub epoch: u64,
    pub participants: usize,
    pub pending: usize,
    pub deferred: u64,
    pub reclaimed: u64,
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("epoch", &self.epoch())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Display for DomainStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "epoch: {} readers: {} pending: {} deferred: {} reclaimed: {}",
            self.epoch, self.participants, self.pending, self.deferred, self.reclaimed
        )
    }
}

/// Proof that the current thread is inside a read-side section of a [`Domain`].
///
/// Objects loaded while the guard lives stay valid until it is dropped. Guards cannot leave the
/// thread that created them.
#[must_use]
pub struct Guard<'d> {
    domain: &'d Domain,
    local: &'d Local,
}

impl Guard<'_> {
    /// Tell if this guard protects reads of objects retired to `domain`
    #[must_use]
    pub fn is_from(&self, domain: &Domain) -> bool {
        self.domain.same_as(domain)
    }
}

impl Clone for Guard<'_> {
    fn clone(&self) -> Self {
        let pins = self.local.pins.get();
        debug_assert!(pins > 0, "cloning a guard of an unpinned thread");
        self.local.pins.set(pins + 1);
        Guard {
            domain: self.domain,
            local: self.local,
        }
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        let pins = self.local.pins.get();
        debug_assert!(pins > 0, "dropping a guard of an unpinned thread");
        if pins == 1 {
            self.local.slot.epoch.store(INACTIVE, Ordering::SeqCst);
        }
        self.local.pins.set(pins - 1);
    }
}

#[allow(clippy::new_without_default)]
impl Domain {
    /// Create a new domain with no readers and no deferred work
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                epoch: AtomicU64::new(0),
                slots: Mutex::new(Vec::new()),
                locals: Locals::new(),
                garbage: Mutex::new(VecDeque::new()),
                pending: AtomicUsize::new(0),
                deferred: AtomicU64::new(0),
                reclaimed: AtomicU64::new(0),
            }),
        }
    }

    fn local(&self) -> &Local {
        self.shared.locals.get_or(|| {
            let slot = Arc::new(Slot {
                epoch: AtomicU64::new(INACTIVE),
            });
            self.shared.slots.lock().push(slot.clone());
            trace!("Registered reader thread {:?}", current().id());
            Local {
                slot,
                pins: Cell::new(0),
            }
        })
    }

    /// Enter a read-side section. Sections nest: the thread stays pinned until the last guard
    /// is dropped.
    pub fn pin(&self) -> Guard<'_> {
        let local = self.local();
        let pins = local.pins.get();
        if pins == 0 {
            let epoch = self.shared.epoch.load(Ordering::SeqCst);
            local.slot.epoch.store(epoch, Ordering::SeqCst);
            // the published epoch must be visible before any load the reader does next
            fence(Ordering::SeqCst);
        }
        local.pins.set(pins + 1);
        Guard {
            domain: self,
            local,
        }
    }

    /// Tell if two handles refer to the same domain
    #[must_use]
    pub fn same_as(&self, other: &Domain) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Tell if the calling thread is inside a read-side section of this domain
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.shared
            .locals
            .get()
            .is_some_and(|local| local.pins.get() > 0)
    }

    /// Run `call` once all current readers have left their read-side sections.
    ///
    /// The object `call` destroys must already be unreachable for new readers. This never runs
    /// `call` inline.
    pub fn defer(&self, call: impl FnOnce() + Send + 'static) {
        // the unlink done by the caller must be ordered before the epoch we tag the work with
        fence(Ordering::SeqCst);
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.shared.deferred.fetch_add(1, Ordering::Relaxed);
        self.shared.garbage.lock().push_back(Deferred {
            epoch,
            call: Box::new(call),
        });
    }

    /// Advance the epoch and run the deferred work whose grace period has elapsed. Returns the
    /// number of calls that ran.
    pub fn try_reclaim(&self) -> usize {
        let shared = &*self.shared;
        if shared.pending.load(Ordering::Acquire) == 0 {
            return 0;
        }
        let current = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        fence(Ordering::SeqCst);
        let oldest = shared
            .slots
            .lock()
            .iter()
            .map(|slot| slot.epoch.load(Ordering::SeqCst))
            .fold(current, u64::min);

        let ready: VecDeque<Deferred> = {
            let mut garbage = shared.garbage.lock();
            let (ready, keep): (VecDeque<_>, VecDeque<_>) =
                garbage.drain(..).partition(|d| d.epoch < oldest);
            *garbage = keep;
            ready
        };
        if ready.is_empty() {
            trace!("Nothing to reclaim at epoch {current}: oldest reader at epoch {oldest}");
            return 0;
        }

        let count = ready.len();
        for deferred in ready {
            (deferred.call)();
            shared.pending.fetch_sub(1, Ordering::AcqRel);
            shared.reclaimed.fetch_add(1, Ordering::Relaxed);
        }
        debug!("Reclaimed {count} objects at epoch {current}");
        count
    }

    /// Block until the deferred queue is empty, reclaiming from the calling thread. Work
    /// deferred while waiting is waited for as well.
    ///
    /// Must not be called from inside a read-side section of this domain: the caller would wait
    /// for itself.
    pub fn synchronize(&self) -> usize {
        if self.is_pinned() {
            warn!("synchronize() called from a pinned thread: not waiting");
            return self.try_reclaim();
        }
        let mut count = 0;
        let mut backoff = Duration::from_micros(10);
        while self.pending() > 0 {
            let done = self.try_reclaim();
            if done == 0 {
                park_timeout(backoff);
                backoff = (backoff * 2).min(SYNC_MAX_BACKOFF);
            }
            count += done;
        }
        count
    }

    /// Number of deferred calls that did not run yet
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> DomainStats {
        DomainStats {
            epoch: self.epoch(),
            participants: self.shared.slots.lock().len(),
            pending: self.pending(),
            deferred: self.shared.deferred.load(Ordering::Relaxed),
            reclaimed: self.shared.reclaimed.load(Ordering::Relaxed),
        }
    }
}

static_assertions::assert_impl_all!(Domain: Send, Sync, Clone);
static_assertions::assert_not_impl_any!(Guard<'static>: Send, Sync);

#[cfg(all(test, not(any(feature = "loom", feature = "shuttle"))))]
mod test {
    use super::*;
    use std::sync::mpsc;

    fn counting(domain: &Domain, counter: &Arc<AtomicUsize>) {
        let counter = counter.clone();
        domain.defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    #[test]
    fn deferred_work_waits_for_local_guard() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let guard = domain.pin();
        counting(&domain, &counter);
        assert_eq!(domain.try_reclaim(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(domain.pending(), 1);

        drop(guard);
        assert_eq!(domain.try_reclaim(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(domain.pending(), 0);
    }

    #[test]
    fn nested_guards_keep_thread_pinned() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let outer = domain.pin();
        let inner = outer.clone();
        let third = domain.pin();
        counting(&domain, &counter);

        drop(outer);
        drop(third);
        assert!(domain.is_pinned());
        assert_eq!(domain.try_reclaim(), 0);

        drop(inner);
        assert!(!domain.is_pinned());
        assert_eq!(domain.try_reclaim(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_work_waits_for_remote_reader() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let reader = std::thread::spawn({
            let domain = domain.clone();
            move || {
                let _guard = domain.pin();
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            }
        });
        entered_rx.recv().unwrap();

        counting(&domain, &counter);
        for _ in 0..10 {
            assert_eq!(domain.try_reclaim(), 0);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        reader.join().unwrap();
        assert_eq!(domain.try_reclaim(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(domain.stats().participants, 1);
    }

    #[test]
    fn work_deferred_inside_a_section_waits_for_it() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        counting(&domain, &counter);
        // first sweep moves the epoch past the deferred work
        assert_eq!(domain.try_reclaim(), 1);

        counting(&domain, &counter);
        domain.try_reclaim();
        let _guard = domain.pin();
        counting(&domain, &counter);
        assert_eq!(domain.try_reclaim(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn synchronize_drains_queue() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            counting(&domain, &counter);
        }
        assert_eq!(domain.synchronize(), 100);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        let stats = domain.stats();
        assert_eq!(stats.deferred, 100);
        assert_eq!(stats.reclaimed, 100);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn synchronize_waits_for_remote_reader() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = mpsc::channel();

        let reader = std::thread::spawn({
            let domain = domain.clone();
            let counter = counter.clone();
            move || {
                let _guard = domain.pin();
                entered_tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(30));
                assert_eq!(counter.load(Ordering::SeqCst), 0);
            }
        });
        entered_rx.recv().unwrap();

        counting(&domain, &counter);
        assert_eq!(domain.synchronize(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        reader.join().unwrap();
    }

    #[test]
    fn synchronize_from_pinned_thread_does_not_wait() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _guard = domain.pin();
        counting(&domain, &counter);
        assert_eq!(domain.synchronize(), 0);
        assert_eq!(domain.pending(), 1);
    }

    #[test]
    fn guards_know_their_domain() {
        let domain = Domain::new();
        let other = Domain::new();
        let guard = domain.pin();
        assert!(guard.is_from(&domain));
        assert!(guard.is_from(&domain.clone()));
        assert!(!guard.is_from(&other));
    }

    #[test]
    fn sweep_without_readers_runs_everything() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|count: u8| {
                let domain = Domain::new();
                let counter = Arc::new(AtomicUsize::new(0));
                for _ in 0..count {
                    counting(&domain, &counter);
                }
                assert_eq!(domain.try_reclaim(), usize::from(count));
                assert_eq!(counter.load(Ordering::SeqCst), usize::from(count));
            });
    }
}

#[cfg(test)]
mod model_test {
    use super::Domain;
    use concurrency::stress;
    use concurrency::sync::Arc;
    use concurrency::sync::atomic::{AtomicBool, Ordering};
    use concurrency::thread::spawn;

    // A reader that found the object before it was unlinked keeps it alive until it unpins,
    // whatever the interleaving with the writer and the sweep.
    #[test]
    fn reader_pinned_before_unlink_never_sees_reclaimed_object() {
        stress::model(|| {
            let domain = Domain::new();
            let linked = Arc::new(AtomicBool::new(true));
            let reclaimed = Arc::new(AtomicBool::new(false));

            let reader = spawn({
                let domain = domain.clone();
                let linked = linked.clone();
                let reclaimed = reclaimed.clone();
                move || {
                    let guard = domain.pin();
                    if linked.load(Ordering::SeqCst) {
                        assert!(!reclaimed.load(Ordering::SeqCst));
                    }
                    drop(guard);
                }
            });

            linked.store(false, Ordering::SeqCst);
            let flag = reclaimed.clone();
            domain.defer(move || flag.store(true, Ordering::SeqCst));
            domain.try_reclaim();

            reader.join().unwrap();
            domain.try_reclaim();
            assert!(reclaimed.load(Ordering::SeqCst));
            assert_eq!(domain.pending(), 0);
        });
    }

    #[test]
    fn nested_sections_of_two_readers() {
        stress::model(|| {
            let domain = Domain::new();
            let reclaimed = Arc::new(AtomicBool::new(false));

            let reader = spawn({
                let domain = domain.clone();
                move || {
                    let outer = domain.pin();
                    let inner = domain.pin();
                    drop(outer);
                    assert!(domain.is_pinned());
                    drop(inner);
                    assert!(!domain.is_pinned());
                }
            });

            let guard = domain.pin();
            let flag = reclaimed.clone();
            domain.defer(move || flag.store(true, Ordering::SeqCst));
            assert_eq!(domain.try_reclaim(), 0);
            drop(guard);

            reader.join().unwrap();
            assert_eq!(domain.try_reclaim(), 1);
            assert!(reclaimed.load(Ordering::SeqCst));
        });
    }
}
