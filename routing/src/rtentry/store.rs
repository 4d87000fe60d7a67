// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Allocation of route entries from per-context pools

use crate::context::NetContext;
use crate::errors::RtError;
use crate::nexthop::NexthopRef;
use crate::prefix::{MaskRef, RtKey, SockAddr};
use crate::reclaim::{SharedEntry, destroy};
use crate::rtentry::{RT_DEFAULT_WEIGHT, RouteEntry, RtFlags};
use concurrency::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use concurrency::sync::{Arc, Mutex};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::Deref;
use std::ptr::NonNull;
use tracing::debug;

/// Default number of freed slots a pool keeps for reuse
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// Parameters of an [`EntryStore`]
#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryStoreParams {
    /// Maximum number of entries alive at once. Unbounded if unset.
    #[builder(setter(strip_option), default)]
    pub capacity: Option<usize>,

    /// Freed slots kept for reuse
    #[builder(default = DEFAULT_CACHE_SIZE)]
    pub cache_size: usize,
}

impl Default for EntryStoreParams {
    fn default() -> Self {
        Self {
            capacity: None,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl Display for EntryStoreParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Entry store config")?;
        match self.capacity {
            Some(capacity) => writeln!(f, "  capacity   : {capacity}")?,
            None => writeln!(f, "  capacity   : unbounded")?,
        }
        writeln!(f, "  cache size : {}", self.cache_size)
    }
}

/// Counters of an entry pool
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub in_use: usize,
    pub allocated: u64,
    pub freed: u64,
    pub cached: usize,
}

/// Storage of one entry
pub(crate) type EntrySlot = Box<MaybeUninit<RouteEntry>>;

/// Move an entry out of its box, keeping the storage
pub(crate) fn dismantle(entry: Box<RouteEntry>) -> (RouteEntry, EntrySlot) {
    let raw = Box::into_raw(entry).cast::<MaybeUninit<RouteEntry>>();
    // SAFETY: MaybeUninit<T> has the layout of T and the pointer comes from a Box
    let slot = unsafe { Box::from_raw(raw) };
    // SAFETY: the slot is initialized and is only read once; it holds no value afterwards
    let entry = unsafe { slot.assume_init_read() };
    (entry, slot)
}

/// The pool of a context. Entries hold on to the pool they were allocated from.
#[derive(Debug)]
pub(crate) struct EntryPool {
    ctx: Arc<NetContext>,
    capacity: Option<usize>,
    cache_size: usize,
    cache: Mutex<Vec<EntrySlot>>,
    in_use: AtomicUsize,
    allocated: AtomicU64,
    freed: AtomicU64,
}

impl EntryPool {
    fn new(ctx: &Arc<NetContext>, params: &EntryStoreParams) -> Self {
        Self {
            ctx: ctx.clone(),
            capacity: params.capacity,
            cache_size: params.cache_size,
            cache: Mutex::new(Vec::with_capacity(params.cache_size)),
            in_use: AtomicUsize::new(0),
            allocated: AtomicU64::new(0),
            freed: AtomicU64::new(0),
        }
    }

    pub(crate) fn context(&self) -> &Arc<NetContext> {
        &self.ctx
    }

    fn reserve(&self) -> Result<(), RtError> {
        match self.capacity {
            None => {
                self.in_use.fetch_add(1, Ordering::AcqRel);
            }
            Some(capacity) => {
                self.in_use
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < capacity).then_some(n + 1)
                    })
                    .map_err(|_| RtError::OutOfMemory {
                        context: self.ctx.id(),
                        capacity,
                    })?;
            }
        }
        Ok(())
    }

    fn take_slot(&self) -> EntrySlot {
        self.cache.lock().pop().unwrap_or_else(Box::new_uninit)
    }

    /// Give storage back to the pool. Nothing may refer to the entry that lived in it.
    pub(crate) fn free_now(&self, slot: EntrySlot) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        self.freed.fetch_add(1, Ordering::Relaxed);
        let mut cache = self.cache.lock();
        if cache.len() < self.cache_size {
            cache.push(slot);
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use.load(Ordering::Acquire),
            allocated: self.allocated.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
            cached: self.cache.lock().len(),
        }
    }
}

/// Allocator of the route entries of a context
#[derive(Debug)]
pub struct EntryStore {
    pool: Arc<EntryPool>,
}

impl EntryStore {
    #[must_use]
    pub fn new(ctx: &Arc<NetContext>, params: &EntryStoreParams) -> Self {
        debug!("Creating entry store for {}", ctx.id());
        Self {
            pool: Arc::new(EntryPool::new(ctx, params)),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<NetContext> {
        self.pool.context()
    }

    /// Create an entry for `dst` pointing to `nexthop`. The entry takes its own reference
    /// to the nexthop. If a mask is given, the key is stored masked; otherwise the entry
    /// is a host route.
    pub fn create(
        &self,
        dst: &SockAddr,
        mask: Option<MaskRef>,
        nexthop: &NexthopRef,
    ) -> Result<RtEntryBox, RtError> {
        let mut key = RtKey::embed(dst)?;
        if let Some(mask) = mask {
            if mask.family() != key.family() {
                return Err(RtError::MaskFamilyMismatch {
                    dst: key.family(),
                    mask: mask.family(),
                });
            }
            key.apply_mask(&mask);
        }
        self.pool.reserve()?;

        let mut flags = RtFlags::UP | RtFlags::from_nexthop(nexthop.target().flags());
        flags.set(RtFlags::HOST, mask.is_none());
        let entry = RouteEntry {
            flags,
            key,
            mask,
            nexthop: nexthop.acquire(),
            weight: RT_DEFAULT_WEIGHT,
            expire: 0,
            pool: self.pool.clone(),
        };
        let mut slot = self.pool.take_slot();
        slot.write(entry);
        // SAFETY: just written
        let entry = unsafe { slot.assume_init() };
        self.pool.allocated.fetch_add(1, Ordering::Relaxed);
        debug!("Created entry {entry}");
        Ok(RtEntryBox::from_box(entry))
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// An entry nobody else can see yet. It can be adjusted until it is published.
/// Dropping it destroys the entry.
#[derive(Debug)]
pub struct RtEntryBox {
    ptr: NonNull<RouteEntry>,
}

// SAFETY: an RtEntryBox owns its entry exclusively, like a Box
unsafe impl Send for RtEntryBox {}
// SAFETY: shared access only hands out &RouteEntry, which is Sync
unsafe impl Sync for RtEntryBox {}

impl RtEntryBox {
    pub(crate) fn from_box(entry: Box<RouteEntry>) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(entry)),
        }
    }

    pub(crate) fn into_box(self) -> Box<RouteEntry> {
        let this = ManuallyDrop::new(self);
        // SAFETY: the pointer comes from a Box and ownership moves out of `this`
        unsafe { Box::from_raw(this.ptr.as_ptr()) }
    }

    fn entry_mut(&mut self) -> &mut RouteEntry {
        // SAFETY: the box is the only owner of the entry
        unsafe { self.ptr.as_mut() }
    }

    pub fn set_weight(&mut self, weight: u32) -> Result<(), RtError> {
        if weight == 0 {
            return Err(RtError::InvalidWeight(weight));
        }
        self.entry_mut().weight = weight;
        Ok(())
    }

    pub fn set_expire(&mut self, expire: u64) {
        self.entry_mut().expire = expire;
    }

    /// Set flags. Only the flags in [`RtFlags::SETTABLE`] are considered.
    pub fn set_flags(&mut self, flags: RtFlags) {
        self.entry_mut().flags |= flags & RtFlags::SETTABLE;
    }

    /// Clear flags. Only the flags in [`RtFlags::SETTABLE`] are considered.
    pub fn clear_flags(&mut self, flags: RtFlags) {
        self.entry_mut().flags &= !(flags & RtFlags::SETTABLE);
    }

    /// Make the entry shareable with readers. From now on it can only be destroyed
    /// through the reclamation scheduler.
    #[must_use]
    pub fn publish(self) -> SharedEntry {
        SharedEntry::from_box(self.into_box())
    }
}

impl Deref for RtEntryBox {
    type Target = RouteEntry;
    fn deref(&self) -> &Self::Target {
        // SAFETY: the entry lives as long as the box
        unsafe { self.ptr.as_ref() }
    }
}

impl Drop for RtEntryBox {
    fn drop(&mut self) {
        // SAFETY: the entry was never published, so no reader may refer to it
        let entry = unsafe { Box::from_raw(self.ptr.as_ptr()) };
        destroy(entry);
    }
}

static_assertions::assert_impl_all!(RouteEntry: Send, Sync);
static_assertions::assert_impl_all!(RtEntryBox: Send, Sync);
static_assertions::assert_impl_all!(EntryStore: Send, Sync);

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::ContextId;
    use crate::nexthop::NhopSpec;
    use crate::prefix::{AddressFamily, RtMask};
    use std::net::{IpAddr, Ipv4Addr};

    fn setup(params: &EntryStoreParams) -> (EntryStore, NexthopRef) {
        let ctx = NetContext::new(ContextId::new(1), "store");
        let store = EntryStore::new(&ctx, params);
        let nhop = NexthopRef::new(&ctx, NhopSpec::via(1, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        (store, nhop)
    }

    fn dst(a: u8, b: u8, c: u8, d: u8) -> SockAddr {
        SockAddr::Inet(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn create_masks_the_key_and_sets_flags() {
        let (store, nhop) = setup(&EntryStoreParams::default());
        let mask = RtMask::from_plen(AddressFamily::Inet, 16).unwrap();
        let entry = store.create(&dst(10, 1, 2, 3), Some(mask), &nhop).unwrap();
        assert_eq!(entry.key().octets(), &[10, 1, 0, 0]);
        assert_eq!(entry.flags(), RtFlags::UP | RtFlags::GATEWAY);
        assert!(!entry.is_host());
        assert_eq!(entry.weight(), RT_DEFAULT_WEIGHT);
        assert_eq!(entry.expire(), 0);
        assert_eq!(entry.context_id(), ContextId::new(1));
        assert_eq!(nhop.refcount(), 2);

        let host = store.create(&dst(10, 1, 2, 3), None, &nhop).unwrap();
        assert_eq!(host.key().octets(), &[10, 1, 2, 3]);
        assert!(host.is_host());
        assert_eq!(nhop.refcount(), 3);

        drop(entry);
        drop(host);
        assert_eq!(nhop.refcount(), 1);
    }

    #[test]
    fn mask_of_another_family_is_rejected() {
        let (store, nhop) = setup(&EntryStoreParams::default());
        let mask = RtMask::from_plen(AddressFamily::Inet6, 64).unwrap();
        let err = store.create(&dst(10, 0, 0, 0), Some(mask), &nhop).unwrap_err();
        assert!(matches!(err, RtError::MaskFamilyMismatch { .. }));
        assert_eq!(nhop.refcount(), 1);
        assert_eq!(store.stats().in_use, 0);
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let params = EntryStoreParamsBuilder::default()
            .capacity(2)
            .build()
            .unwrap();
        let (store, nhop) = setup(&params);
        let first = store.create(&dst(10, 0, 0, 1), None, &nhop).unwrap();
        let _second = store.create(&dst(10, 0, 0, 2), None, &nhop).unwrap();
        let err = store.create(&dst(10, 0, 0, 3), None, &nhop).unwrap_err();
        assert!(matches!(
            err,
            RtError::OutOfMemory { capacity: 2, context } if context == ContextId::new(1)
        ));
        assert_eq!(nhop.refcount(), 3);

        drop(first);
        assert!(store.create(&dst(10, 0, 0, 3), None, &nhop).is_ok());
    }

    #[test]
    fn freed_slots_are_recycled() {
        let params = EntryStoreParamsBuilder::default()
            .cache_size(1)
            .build()
            .unwrap();
        let (store, nhop) = setup(&params);
        let a = store.create(&dst(10, 0, 0, 1), None, &nhop).unwrap();
        let b = store.create(&dst(10, 0, 0, 2), None, &nhop).unwrap();
        drop(a);
        drop(b);
        assert_eq!(
            store.stats(),
            PoolStats {
                in_use: 0,
                allocated: 2,
                freed: 2,
                cached: 1,
            }
        );
        let _c = store.create(&dst(10, 0, 0, 3), None, &nhop).unwrap();
        assert_eq!(store.stats().cached, 0);
        assert_eq!(store.stats().in_use, 1);
    }

    #[test]
    fn attributes_are_settable_before_publication() {
        let (store, nhop) = setup(&EntryStoreParams::default());
        let mut entry = store.create(&dst(10, 0, 0, 1), None, &nhop).unwrap();
        assert!(matches!(entry.set_weight(0), Err(RtError::InvalidWeight(0))));
        entry.set_weight(20).unwrap();
        entry.set_expire(3600);
        entry.set_flags(RtFlags::STATIC | RtFlags::PINNED | RtFlags::REJECT);
        assert_eq!(entry.weight(), 20);
        assert_eq!(entry.expire(), 3600);
        assert!(entry.flags().contains(RtFlags::STATIC | RtFlags::PINNED));
        assert!(!entry.flags().contains(RtFlags::REJECT));

        entry.clear_flags(RtFlags::PINNED | RtFlags::UP);
        assert!(!entry.flags().contains(RtFlags::PINNED));
        assert!(entry.flags().contains(RtFlags::UP));
    }
}
