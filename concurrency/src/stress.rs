// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Run a test body under the model checker selected by the crate features.
//!
//! The same body runs once on real threads when no model checker is enabled, so tests written
//! with [`model`] are exercised by every build.

/// Schedules explored by the random and PCT shuttle schedulers
pub const SHUTTLE_ITERATIONS: usize = 1000;

/// Number of priority change points of the PCT scheduler
pub const SHUTTLE_PCT_DEPTH: usize = 3;

/// Run `body` under every interleaving the enabled model checker explores
#[allow(clippy::needless_pass_by_value)]
pub fn model<F>(body: F)
where
    F: Fn() + Send + Sync + 'static,
{
    #[cfg(feature = "loom")]
    loom::model(body);

    #[cfg(all(feature = "shuttle_dfs", not(feature = "loom")))]
    shuttle::check_dfs(body, None);

    #[cfg(all(
        feature = "shuttle_pct",
        not(any(feature = "loom", feature = "shuttle_dfs"))
    ))]
    shuttle::check_pct(body, SHUTTLE_ITERATIONS, SHUTTLE_PCT_DEPTH);

    #[cfg(all(
        feature = "shuttle",
        not(any(feature = "loom", feature = "shuttle_pct"))
    ))]
    shuttle::check_random(body, SHUTTLE_ITERATIONS);

    #[cfg(not(any(feature = "loom", feature = "shuttle")))]
    body();
}
