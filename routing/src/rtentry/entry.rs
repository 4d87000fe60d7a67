// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::context::ContextId;
use crate::nexthop::{NexthopHandle, NexthopRef, NhopFlags};
use crate::prefix::{AddressFamily, MaskRef, RtKey};
use crate::rtentry::EntryPool;
use bitflags::bitflags;
use concurrency::sync::Arc;

/// Weight of entries that were not given one
pub const RT_DEFAULT_WEIGHT: u32 = 1;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RtFlags: u32 {
        const UP        = 0x0000_0001;
        const GATEWAY   = 0x0000_0002;
        const HOST      = 0x0000_0004;
        const REJECT    = 0x0000_0008;
        const STATIC    = 0x0000_0800;
        const BLACKHOLE = 0x0000_1000;
        const PINNED    = 0x0010_0000;
    }
}

impl RtFlags {
    /// Flags that owners may set on an entry before publishing it
    pub const SETTABLE: RtFlags = RtFlags::STATIC.union(RtFlags::PINNED);

    pub(crate) fn from_nexthop(flags: NhopFlags) -> Self {
        let mut out = RtFlags::empty();
        out.set(RtFlags::GATEWAY, flags.contains(NhopFlags::GATEWAY));
        out.set(RtFlags::BLACKHOLE, flags.contains(NhopFlags::BLACKHOLE));
        out.set(RtFlags::REJECT, flags.contains(NhopFlags::REJECT));
        out
    }
}

/// A route entry. The key, mask and nexthop are set at creation and never
/// change afterwards.
#[derive(Debug)]
pub struct RouteEntry {
    pub(crate) flags: RtFlags,
    pub(crate) key: RtKey,
    pub(crate) mask: Option<MaskRef>,
    pub(crate) nexthop: NexthopRef,
    pub(crate) weight: u32,
    pub(crate) expire: u64,
    pub(crate) pool: Arc<EntryPool>,
}

impl RouteEntry {
    #[must_use]
    pub fn flags(&self) -> RtFlags {
        self.flags
    }
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.flags.contains(RtFlags::HOST)
    }
    #[must_use]
    pub fn family(&self) -> AddressFamily {
        self.key.family()
    }
    /// The stored key, masked, with the zone of scoped addresses embedded
    #[must_use]
    pub fn key(&self) -> &RtKey {
        &self.key
    }
    #[must_use]
    pub fn mask(&self) -> Option<MaskRef> {
        self.mask
    }
    /// The nexthop, without taking a reference to it. The view must not outlive
    /// the read-side section the entry was obtained in.
    #[must_use]
    pub fn raw_nexthop(&self) -> NexthopHandle<'_> {
        self.nexthop.handle()
    }
    /// The reference the entry holds. Readers that need the nexthop beyond their
    /// read-side section acquire their own reference from it.
    #[must_use]
    pub fn nexthop(&self) -> &NexthopRef {
        &self.nexthop
    }
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }
    /// Expiration time, in seconds. 0 means the entry never expires.
    #[must_use]
    pub fn expire(&self) -> u64 {
        self.expire
    }
    /// The context whose pool the entry was allocated from
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.pool.context().id()
    }
}
