// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Published entries and the cells readers find them in

use crate::reclaim::{ReclaimScheduler, ReclaimTicket};
use crate::rtentry::{RouteEntry, RtEntryBox};
use concurrency::sync::atomic::{AtomicPtr, Ordering};
use quiescent::{Domain, Guard};
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use tracing::error;

/// A published entry, possibly visible to readers. It must be handed to
/// [`ReclaimScheduler::schedule_deferred`] once unlinked; dropping it leaks the entry.
#[derive(Debug)]
pub struct SharedEntry {
    ptr: NonNull<RouteEntry>,
}

// SAFETY: the entry is immutable once published and RouteEntry is Send + Sync
unsafe impl Send for SharedEntry {}
// SAFETY: see above
unsafe impl Sync for SharedEntry {}

impl SharedEntry {
    pub(crate) fn from_box(entry: Box<RouteEntry>) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(entry)),
        }
    }

    pub(crate) fn into_raw(self) -> NonNull<RouteEntry> {
        ManuallyDrop::new(self).ptr
    }

    /// # Safety
    /// `ptr` must come from [`SharedEntry::into_raw`] and be owned by nobody else.
    unsafe fn from_raw(ptr: NonNull<RouteEntry>) -> Self {
        Self { ptr }
    }

    /// Take the entry back for exclusive use.
    ///
    /// # Safety
    /// No reader may hold a reference to the entry, nor be able to get one.
    #[must_use]
    pub unsafe fn into_exclusive(self) -> RtEntryBox {
        let ptr = self.into_raw();
        // SAFETY: the caller guarantees exclusivity and the pointer comes from a Box
        RtEntryBox::from_box(unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl Deref for SharedEntry {
    type Target = RouteEntry;
    fn deref(&self) -> &Self::Target {
        // SAFETY: the entry lives at least until this handle is scheduled for destruction
        unsafe { self.ptr.as_ref() }
    }
}

impl Drop for SharedEntry {
    fn drop(&mut self) {
        error!("Leaking entry {}: published entries must be retired", **self);
    }
}

/// An atomic slot holding at most one published entry. Readers load the entry
/// under a guard of the scheduler the cell was created for; entries unlinked
/// from the cell must be retired to that same scheduler.
#[derive(Debug)]
pub struct EntryCell {
    domain: Domain,
    ptr: AtomicPtr<RouteEntry>,
}

impl EntryCell {
    #[must_use]
    pub fn new(scheduler: &ReclaimScheduler) -> Self {
        Self {
            domain: scheduler.domain().clone(),
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Link an entry, returning the one it replaces
    pub fn publish(&self, entry: SharedEntry) -> Option<SharedEntry> {
        let old = self.ptr.swap(entry.into_raw().as_ptr(), Ordering::AcqRel);
        // SAFETY: non-null values stored in the cell come from SharedEntry::into_raw
        NonNull::new(old).map(|ptr| unsafe { SharedEntry::from_raw(ptr) })
    }

    /// Unlink the entry, if any. Readers that loaded it before may keep using it
    /// until their guard goes away.
    pub fn unlink(&self) -> Option<SharedEntry> {
        let old = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: non-null values stored in the cell come from SharedEntry::into_raw
        NonNull::new(old).map(|ptr| unsafe { SharedEntry::from_raw(ptr) })
    }

    /// Read the entry. The reference is valid as long as the guard.
    ///
    /// # Panics
    /// If the guard does not belong to the scheduler of this cell.
    pub fn load<'g>(&self, guard: &'g Guard<'_>) -> Option<&'g RouteEntry> {
        assert!(
            guard.is_from(&self.domain),
            "guard does not protect this cell"
        );
        let ptr = self.ptr.load(Ordering::Acquire);
        // SAFETY: the entry was published, and if it was unlinked since, its
        // destruction waits until `guard` is dropped
        unsafe { ptr.as_ref() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }
}

impl Drop for EntryCell {
    fn drop(&mut self) {
        if let Some(entry) = self.unlink() {
            let ticket = ReclaimTicket::new(entry);
            self.domain.defer(move || drop(ticket));
        }
    }
}
