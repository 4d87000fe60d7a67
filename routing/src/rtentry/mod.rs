// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route entries and the per-context store they are allocated from

mod entry;
mod store;

pub use entry::{RT_DEFAULT_WEIGHT, RouteEntry, RtFlags};
pub use store::{
    DEFAULT_CACHE_SIZE, EntryStore, EntryStoreParams, EntryStoreParamsBuilder, PoolStats, RtEntryBox,
};
pub(crate) use store::{EntryPool, dismantle};

use tracectl::trace_target;
trace_target!("rt-entry", LevelFilter::INFO, &["routing"]);
