// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deferred destruction of route entries.
//!
//! Readers look entries up inside a read-side section, opened with
//! [`ReclaimScheduler::pin`]. Once an entry is unlinked, it is handed to
//! [`ReclaimScheduler::schedule_deferred`], and destroyed when every section that
//! might have seen it is over. Destroying an entry gives its nexthop reference
//! back, from within the context that owns the nexthop, and then returns its
//! storage to the pool of the entry.

mod shared;
mod ticket;

pub use shared::{EntryCell, SharedEntry};
pub(crate) use ticket::{ReclaimTicket, destroy};

use crate::errors::RtError;
use crate::rtentry::RtEntryBox;
use concurrency::sync::atomic::{AtomicU64, Ordering};
use derive_builder::Builder;
use quiescent::{Domain, Guard, Reclaimer};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, trace, warn};

use tracectl::trace_target;
trace_target!("rt-reclaim", LevelFilter::INFO, &["routing"]);

pub const DEFAULT_RECLAIMER_NAME: &str = "rt-reclaim";
pub const DEFAULT_WORKER_INTERVAL_MS: u64 = 10;
pub const DEFAULT_BATCH_THRESHOLD: usize = 64;

/// Parameters of a [`ReclaimScheduler`]
#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimParams {
    /// Name of the worker thread
    #[builder(setter(into), default = DEFAULT_RECLAIMER_NAME.to_string())]
    pub name: String,

    /// Run deferred destructions on a worker thread. Without one, they only run
    /// on [`ReclaimScheduler::poll`] and [`ReclaimScheduler::barrier`].
    #[builder(default = true)]
    pub worker: bool,

    #[builder(default = DEFAULT_WORKER_INTERVAL_MS)]
    pub worker_interval_ms: u64,

    /// Number of pending destructions that wakes the worker before its interval expires
    #[builder(default = DEFAULT_BATCH_THRESHOLD)]
    pub batch_threshold: usize,
}

impl Default for ReclaimParams {
    fn default() -> Self {
        Self {
            name: DEFAULT_RECLAIMER_NAME.to_string(),
            worker: true,
            worker_interval_ms: DEFAULT_WORKER_INTERVAL_MS,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
        }
    }
}

impl Display for ReclaimParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reclamation config")?;
        writeln!(f, "  name      : {}", self.name)?;
        writeln!(f, "  worker    : {}", self.worker)?;
        writeln!(f, "  interval  : {} ms", self.worker_interval_ms)?;
        writeln!(f, "  threshold : {}", self.batch_threshold)
    }
}

/// Counters of a [`ReclaimScheduler`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    pub epoch: u64,
    pub readers: usize,
    pub scheduled: u64,
    pub reclaimed: u64,
    pub pending: usize,
    pub immediate: u64,
}

/// Scheduler of entry destructions
pub struct ReclaimScheduler {
    domain: Domain,
    params: ReclaimParams,
    worker: Option<Reclaimer>,
    immediate: AtomicU64,
}

impl ReclaimScheduler {
    /// Create a scheduler, starting its worker thread if configured to have one
    pub fn new(params: ReclaimParams) -> Result<Self, RtError> {
        let domain = Domain::new();
        let worker = if params.worker {
            let interval = Duration::from_millis(params.worker_interval_ms);
            Some(Reclaimer::start(domain.clone(), &params.name, interval)?)
        } else {
            None
        };
        debug!("Created reclamation scheduler '{}'", params.name);
        Ok(Self {
            domain,
            params,
            worker,
            immediate: AtomicU64::new(0),
        })
    }

    /// Enter a read-side section. Entries loaded while the guard lives are not
    /// destroyed before it is dropped.
    pub fn pin(&self) -> Guard<'_> {
        self.domain.pin()
    }

    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    #[must_use]
    pub fn params(&self) -> &ReclaimParams {
        &self.params
    }

    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.worker.as_ref().is_some_and(Reclaimer::is_running)
    }

    /// Destroy an unlinked entry once the readers that may still see it are gone.
    /// The entry must no longer be reachable by new lookups.
    pub fn schedule_deferred(&self, entry: SharedEntry) {
        trace!("Retiring entry {}", *entry);
        let ticket = ReclaimTicket::new(entry);
        self.domain.defer(move || drop(ticket));
        if self.domain.pending() >= self.params.batch_threshold {
            if let Some(worker) = &self.worker {
                worker.wake();
            }
        }
    }

    /// Destroy an entry right away. Entries that were never published are the only
    /// ones that can be destroyed this way.
    pub fn destroy_immediate(&self, entry: RtEntryBox) {
        trace!("Destroying entry {} now", *entry);
        self.immediate.fetch_add(1, Ordering::Relaxed);
        destroy(entry.into_box());
    }

    /// Run the destructions whose grace period is over. Returns how many ran.
    pub fn poll(&self) -> usize {
        self.domain.try_reclaim()
    }

    /// Wait until everything scheduled so far is destroyed. Returns how many
    /// destructions ran on this thread.
    pub fn barrier(&self) -> usize {
        self.domain.synchronize()
    }

    /// Number of destructions waiting for their grace period
    #[must_use]
    pub fn pending(&self) -> usize {
        self.domain.pending()
    }

    #[must_use]
    pub fn stats(&self) -> ReclaimStats {
        let domain = self.domain.stats();
        ReclaimStats {
            epoch: domain.epoch,
            readers: domain.participants,
            scheduled: domain.deferred,
            reclaimed: domain.reclaimed,
            pending: domain.pending,
            immediate: self.immediate.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ReclaimScheduler {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.domain.synchronize();
        let pending = self.domain.pending();
        if pending > 0 {
            warn!(
                "Reclamation scheduler '{}' dropped with {pending} pending destructions",
                self.params.name
            );
        } else {
            debug!("Reclamation scheduler '{}' drained", self.params.name);
        }
    }
}

static_assertions::assert_impl_all!(ReclaimScheduler: Send, Sync);
static_assertions::assert_impl_all!(SharedEntry: Send, Sync);
static_assertions::assert_impl_all!(EntryCell: Send, Sync);
static_assertions::assert_impl_all!(ReclaimTicket: Send);
