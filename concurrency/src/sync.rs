// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Locks, atomics and shared ownership.
//!
//! With the `loom` or `shuttle` feature the primitives come from the model checker, so that code
//! built on them can be explored under every interleaving the checker generates.

#[cfg(feature = "loom")]
pub use loom::sync::Arc;
#[cfg(not(feature = "loom"))]
pub use std::sync::Arc;

// Process-wide statics live outside of any model run.
pub use std::sync::{LazyLock, OnceLock};

pub mod atomic {
    //! Atomic integers, pointers and fences.
    #[cfg(feature = "loom")]
    pub use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, fence};
    #[cfg(all(feature = "shuttle", not(feature = "loom")))]
    pub use shuttle::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, fence};
    #[cfg(not(any(feature = "loom", feature = "shuttle")))]
    pub use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, fence};

    pub use std::sync::atomic::Ordering;
}

#[cfg(all(feature = "parking_lot", not(any(feature = "loom", feature = "shuttle"))))]
pub use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(all(feature = "parking_lot", not(any(feature = "loom", feature = "shuttle")))))]
pub use poison_free::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(all(feature = "parking_lot", not(any(feature = "loom", feature = "shuttle")))))]
mod poison_free {
    //! Locks of `std` or of a model checker, with the poison-free signature of `parking_lot`.
    use std::fmt::{Debug, Formatter};
    use std::sync::PoisonError;

    #[cfg(feature = "loom")]
    use loom::sync as backend;
    #[cfg(all(feature = "shuttle", not(feature = "loom")))]
    use shuttle::sync as backend;
    #[cfg(not(any(feature = "loom", feature = "shuttle")))]
    use std::sync as backend;

    pub use backend::{MutexGuard, RwLockReadGuard, RwLockWriteGuard};

    pub struct Mutex<T>(backend::Mutex<T>);

    impl<T> Mutex<T> {
        pub fn new(value: T) -> Self {
            Self(backend::Mutex::new(value))
        }
        pub fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl<T: Default> Default for Mutex<T> {
        fn default() -> Self {
            Self::new(T::default())
        }
    }

    impl<T> Debug for Mutex<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Mutex").finish_non_exhaustive()
        }
    }

    pub struct RwLock<T>(backend::RwLock<T>);

    impl<T> RwLock<T> {
        pub fn new(value: T) -> Self {
            Self(backend::RwLock::new(value))
        }
        pub fn read(&self) -> RwLockReadGuard<'_, T> {
            self.0.read().unwrap_or_else(PoisonError::into_inner)
        }
        pub fn write(&self) -> RwLockWriteGuard<'_, T> {
            self.0.write().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl<T: Default> Default for RwLock<T> {
        fn default() -> Self {
            Self::new(T::default())
        }
    }

    impl<T> Debug for RwLock<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RwLock").finish_non_exhaustive()
        }
    }
}

static_assertions::assert_impl_all!(Mutex<()>: Send, Sync);
static_assertions::assert_impl_all!(RwLock<()>: Send, Sync);

#[cfg(test)]
mod test {
    use super::atomic::{AtomicUsize, Ordering};
    use super::{Arc, Mutex, RwLock};
    use crate::stress;
    use crate::thread::spawn;

    #[test]
    fn mutex_is_shared_across_threads() {
        stress::model(|| {
            let counter = Arc::new(Mutex::new(0u32));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let counter = counter.clone();
                    spawn(move || {
                        for _ in 0..2 {
                            *counter.lock() += 1;
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(*counter.lock(), 4);
        });
    }

    #[test]
    fn rwlock_readers_see_writes() {
        stress::model(|| {
            let lock = RwLock::new(vec![1, 2]);
            lock.write().push(3);
            assert_eq!(lock.read().as_slice(), &[1, 2, 3]);
            let n = AtomicUsize::new(0);
            n.fetch_add(lock.read().len(), Ordering::Relaxed);
            assert_eq!(n.load(Ordering::Relaxed), 3);
        });
    }
}
