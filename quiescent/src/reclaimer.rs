// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Background thread that runs deferred work of a [`Domain`]

use crate::Domain;
use concurrency::sync::Arc;
use concurrency::sync::atomic::{AtomicBool, Ordering};
use concurrency::thread::{Builder, JoinHandle, park_timeout};
use std::time::Duration;
use tracing::{debug, error, trace};

#[derive(Debug, thiserror::Error)]
pub enum ReclaimerError {
    #[error("Failed to spawn reclaimer thread '{0}': {1}")]
    Spawn(String, std::io::Error),
}

/// Handle to a reclaimer thread. The thread is stopped when the handle is dropped.
pub struct Reclaimer {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

fn reclaimer_loop(name: &str, domain: &Domain, stop: &AtomicBool, interval: Duration) {
    debug!("Reclaimer '{name}' started");
    while !stop.load(Ordering::Acquire) {
        let done = domain.try_reclaim();
        if done > 0 {
            trace!("Reclaimer '{name}' ran {done} deferred calls");
        } else {
            park_timeout(interval);
        }
    }
    // last sweep: readers that left in the meantime release whatever they were holding back
    let done = domain.try_reclaim();
    debug!(
        "Reclaimer '{name}' stopped (last sweep: {done}, still pending: {})",
        domain.pending()
    );
}

impl Reclaimer {
    /// Spawn a thread that sweeps `domain` every `interval`, or earlier when woken up.
    pub fn start(domain: Domain, name: &str, interval: Duration) -> Result<Self, ReclaimerError> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = Builder::new()
            .name(name.to_owned())
            .spawn({
                let name = name.to_owned();
                let stop = stop.clone();
                move || reclaimer_loop(&name, &domain, &stop, interval)
            })
            .map_err(|e| ReclaimerError::Spawn(name.to_owned(), e))?;
        Ok(Self {
            name: name.to_owned(),
            stop,
            handle: Some(handle),
        })
    }

    /// Ask for a sweep without waiting for the interval to expire
    pub fn wake(&self) {
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            error!("Reclaimer '{}' panicked", self.name);
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use concurrency::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tracing_test::traced_test;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    #[traced_test]
    fn reclaimer_runs_deferred_work() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut reclaimer =
            Reclaimer::start(domain.clone(), "test-reclaimer", Duration::from_millis(1)).unwrap();
        assert!(reclaimer.is_running());

        for _ in 0..10 {
            let counter = counter.clone();
            domain.defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        reclaimer.wake();
        assert!(wait_for(|| counter.load(Ordering::SeqCst) == 10));

        reclaimer.stop();
        assert!(!reclaimer.is_running());
        assert_eq!(reclaimer.name(), "test-reclaimer");
    }

    #[test]
    fn reclaimer_respects_pinned_readers() {
        let domain = Domain::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _reclaimer =
            Reclaimer::start(domain.clone(), "test-reclaimer", Duration::from_millis(1)).unwrap();

        let guard = domain.pin();
        let c = counter.clone();
        domain.defer(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        drop(guard);
        assert!(wait_for(|| counter.load(Ordering::SeqCst) == 1));
    }
}
