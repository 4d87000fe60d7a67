// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Thread spawning and parking.

#[cfg(not(any(feature = "loom", feature = "shuttle")))]
pub use std::thread::{Builder, JoinHandle, current, park_timeout, spawn, yield_now};

#[cfg(feature = "loom")]
pub use loom::thread::{JoinHandle, current, spawn, yield_now};
#[cfg(all(feature = "shuttle", not(feature = "loom")))]
pub use shuttle::thread::{JoinHandle, current, spawn, yield_now};

/// Model checkers have no clock: waiting with a timeout is a yield to their scheduler.
#[cfg(any(feature = "loom", feature = "shuttle"))]
pub fn park_timeout(_timeout: std::time::Duration) {
    yield_now();
}
