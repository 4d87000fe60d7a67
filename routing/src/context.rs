// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network contexts. A context owns the nexthops created in it, and their teardown
//! is accounted against it.

use concurrency::sync::Arc;
use concurrency::sync::atomic::{AtomicU64, Ordering};
use std::fmt::Display;

/// Identifier of a network context
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    pub const DEFAULT: ContextId = ContextId(0);

    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// The kind of objects a context keeps count of
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ObjKind {
    Nexthop,
    Group,
}

/// Per-context accounting of nexthop objects
#[derive(Debug, Default)]
pub struct ContextArena {
    nhops_alloc: AtomicU64,
    nhops_freed: AtomicU64,
    groups_alloc: AtomicU64,
    groups_freed: AtomicU64,
}

/// Snapshot of the counters of a [`ContextArena`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub nhops_alloc: u64,
    pub nhops_freed: u64,
    pub groups_alloc: u64,
    pub groups_freed: u64,
}

impl ArenaStats {
    #[must_use]
    pub fn nhops_live(&self) -> u64 {
        self.nhops_alloc.saturating_sub(self.nhops_freed)
    }
    #[must_use]
    pub fn groups_live(&self) -> u64 {
        self.groups_alloc.saturating_sub(self.groups_freed)
    }
}

impl ContextArena {
    pub(crate) fn alloc(&self, kind: ObjKind) {
        match kind {
            ObjKind::Nexthop => self.nhops_alloc.fetch_add(1, Ordering::Relaxed),
            ObjKind::Group => self.groups_alloc.fetch_add(1, Ordering::Relaxed),
        };
    }
    pub(crate) fn free(&self, kind: ObjKind) {
        match kind {
            ObjKind::Nexthop => self.nhops_freed.fetch_add(1, Ordering::Relaxed),
            ObjKind::Group => self.groups_freed.fetch_add(1, Ordering::Relaxed),
        };
    }
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            nhops_alloc: self.nhops_alloc.load(Ordering::Relaxed),
            nhops_freed: self.nhops_freed.load(Ordering::Relaxed),
            groups_alloc: self.groups_alloc.load(Ordering::Relaxed),
            groups_freed: self.groups_freed.load(Ordering::Relaxed),
        }
    }
}

/// A network context (a network stack instance)
#[derive(Debug)]
pub struct NetContext {
    id: ContextId,
    name: String,
    arena: ContextArena,
}

impl NetContext {
    #[must_use]
    pub fn new(id: ContextId, name: &str) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.to_owned(),
            arena: ContextArena::default(),
        })
    }
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn arena(&self) -> &ContextArena {
        &self.arena
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arena_counts_objects_per_kind() {
        let ctx = NetContext::new(ContextId::new(7), "blue");
        ctx.arena().alloc(ObjKind::Nexthop);
        ctx.arena().alloc(ObjKind::Nexthop);
        ctx.arena().alloc(ObjKind::Group);
        ctx.arena().free(ObjKind::Nexthop);

        let stats = ctx.arena().stats();
        assert_eq!(stats.nhops_live(), 1);
        assert_eq!(stats.groups_live(), 1);
        assert_eq!(stats.nhops_freed, 1);
        assert_eq!(ctx.id().to_string(), "ctx-7");
        assert_eq!(ctx.name(), "blue");
    }
}
