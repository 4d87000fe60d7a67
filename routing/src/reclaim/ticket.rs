// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::reclaim::SharedEntry;
use crate::rtentry::{RouteEntry, dismantle};
use std::ptr::NonNull;
use tracing::trace;

/// Tear an entry down: switch to the context that owns its nexthop, give the
/// nexthop reference back from there, then return the storage to its pool.
pub(crate) fn destroy(entry: Box<RouteEntry>) {
    let (entry, slot) = dismantle(entry);
    let RouteEntry {
        key, nexthop, pool, ..
    } = entry;
    let ctx = nexthop.owner_context().clone();
    nexthop.release_in(&ctx);
    pool.free_now(slot);
    trace!("Destroyed entry {} of {}", key.to_ip(), pool.context().id());
}

/// The pending destruction of an unlinked entry. The entry is destroyed when the
/// ticket is dropped, which the reclamation domain does once no reader can see it.
#[derive(Debug)]
pub(crate) struct ReclaimTicket {
    entry: NonNull<RouteEntry>,
}

// SAFETY: the ticket is the sole owner of the entry
unsafe impl Send for ReclaimTicket {}

impl ReclaimTicket {
    pub(crate) fn new(entry: SharedEntry) -> Self {
        Self {
            entry: entry.into_raw(),
        }
    }
}

impl Drop for ReclaimTicket {
    fn drop(&mut self) {
        // SAFETY: the entry came from a Box, and the grace period of its retirement is over
        let entry = unsafe { Box::from_raw(self.entry.as_ptr()) };
        destroy(entry);
    }
}
