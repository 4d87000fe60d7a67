// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route entry lifecycle management.
//!
//! Route entries are created from a per-context [`EntryStore`], adopt a counted
//! reference to a [`NexthopRef`], get published to readers, and once unlinked are
//! destroyed by a [`ReclaimScheduler`] after every reader that might still see
//! them has moved on. The index structure that links entries is not part of this
//! crate: it is expected to publish entries through [`EntryCell`]s or an
//! equivalent, and to retire every unlinked entry exactly once.

#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::similar_names,
    clippy::struct_field_names,
    clippy::collapsible_if,
    clippy::missing_errors_doc
)]

mod context;
mod display;
mod errors;
pub mod nexthop;
pub mod prefix;
pub mod reclaim;
pub mod rtentry;


// re-exports
pub use context::{ArenaStats, ContextArena, ContextId, NetContext};
pub use errors::RtError;
pub use nexthop::{Nexthop, NexthopHandle, NexthopRef, NhopFlags, NhopGroup, NhopSpec, Weighted};
pub use prefix::{
    AddressFamily, MaskRef, MaskTable, PrefixMask, RtKey, RtMask, SockAddr, get_plen, get_pmask,
};
pub use reclaim::{
    EntryCell, ReclaimParams, ReclaimParamsBuilder, ReclaimScheduler, ReclaimStats, SharedEntry,
};
pub use rtentry::{
    EntryStore, EntryStoreParams, EntryStoreParamsBuilder, PoolStats, RouteEntry, RtEntryBox,
    RtFlags,
};

// main trace target for routing
use tracectl::trace_target;
trace_target!("routing", LevelFilter::INFO, &["routing-full"]);
