// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Nexthops: the forwarding targets route entries point to. Targets are shared
//! through counted [`NexthopRef`] handles and torn down inside the context that
//! owns them when the last handle goes away.

mod group;

pub use group::{NhopGroup, Weighted};

use crate::context::{ContextId, NetContext, ObjKind};
use crate::errors::RtError;
use bitflags::bitflags;
use concurrency::sync::Arc;
use std::mem::ManuallyDrop;
use std::net::IpAddr;
use tracing::{debug, debug_span};

use tracectl::trace_target;
trace_target!("rt-nexthop", LevelFilter::INFO, &["routing"]);

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NhopFlags: u8 {
        const GATEWAY   = 0b0000_0001;
        const BLACKHOLE = 0b0000_0010;
        const REJECT    = 0b0000_0100;
    }
}

/// What a single nexthop forwards to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NhopSpec {
    pub ifindex: u32,
    pub gateway: Option<IpAddr>,
    pub mtu: u32,
    pub flags: NhopFlags,
}

impl NhopSpec {
    /// Deliver to hosts directly attached to an interface
    #[must_use]
    pub fn direct(ifindex: u32) -> Self {
        Self {
            ifindex,
            gateway: None,
            mtu: 0,
            flags: NhopFlags::empty(),
        }
    }
    /// Forward to a gateway reachable over an interface
    #[must_use]
    pub fn via(ifindex: u32, gateway: IpAddr) -> Self {
        Self {
            ifindex,
            gateway: Some(gateway),
            mtu: 0,
            flags: NhopFlags::GATEWAY,
        }
    }
    /// Silently discard
    #[must_use]
    pub fn blackhole() -> Self {
        Self {
            flags: NhopFlags::BLACKHOLE,
            ..Self::direct(0)
        }
    }
    /// Discard and signal unreachability
    #[must_use]
    pub fn reject() -> Self {
        Self {
            flags: NhopFlags::REJECT,
            ..Self::direct(0)
        }
    }
    #[must_use]
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }
}

/// A single nexthop and the context it was created in
#[derive(Debug)]
pub struct NhopObject {
    spec: NhopSpec,
    ctx: Arc<NetContext>,
}

impl NhopObject {
    #[must_use]
    pub fn spec(&self) -> &NhopSpec {
        &self.spec
    }
    #[must_use]
    pub fn context(&self) -> &Arc<NetContext> {
        &self.ctx
    }
}

/// A forwarding target
#[derive(Debug)]
pub enum Nexthop {
    Single(NhopObject),
    Group(NhopGroup),
}

impl Nexthop {
    /// The context whose objects this target is built from. Groups report
    /// the context of their first member.
    #[must_use]
    pub fn owner_context(&self) -> &Arc<NetContext> {
        match self {
            Nexthop::Single(nhop) => &nhop.ctx,
            Nexthop::Group(group) => group.owner_context(),
        }
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Nexthop::Group(_))
    }

    /// Flags of the target. Those of a group are the union of its members' flags.
    #[must_use]
    pub fn flags(&self) -> NhopFlags {
        match self {
            Nexthop::Single(nhop) => nhop.spec.flags,
            Nexthop::Group(group) => group
                .members()
                .iter()
                .fold(NhopFlags::empty(), |acc, m| acc | m.target.target().flags()),
        }
    }

    fn teardown(self, ctx: &NetContext) {
        let _span = debug_span!("teardown", ctx = %ctx.id()).entered();
        debug_assert!(std::ptr::eq(self.owner_context().as_ref(), ctx));
        match self {
            Nexthop::Single(nhop) => {
                debug!("Destroying nexthop {}", nhop.spec);
                ctx.arena().free(ObjKind::Nexthop);
            }
            Nexthop::Group(group) => group.teardown(ctx),
        }
    }
}

/// A counted reference to a [`Nexthop`]. Cloning a reference acquires the target
/// again; dropping or releasing it gives the reference back. The target is torn
/// down, in its owning context, when the last reference is released.
#[derive(Debug)]
pub struct NexthopRef {
    inner: ManuallyDrop<Arc<Nexthop>>,
}

/// Drop one reference. Exactly one of the concurrent releasers of a target gets to
/// tear it down.
fn release_target(target: Arc<Nexthop>, ctx: &NetContext) {
    if let Some(target) = Arc::into_inner(target) {
        target.teardown(ctx);
    }
}

impl NexthopRef {
    fn from_target(target: Nexthop) -> Self {
        Self {
            inner: ManuallyDrop::new(Arc::new(target)),
        }
    }

    /// Create a single nexthop owned by `ctx`
    #[must_use]
    pub fn new(ctx: &Arc<NetContext>, spec: NhopSpec) -> Self {
        ctx.arena().alloc(ObjKind::Nexthop);
        debug!("Created nexthop {spec} in {}", ctx.id());
        Self::from_target(Nexthop::Single(NhopObject {
            spec,
            ctx: ctx.clone(),
        }))
    }

    /// Create a multipath group out of single nexthops of one context. The member
    /// references are moved into the group, which gives them back on teardown.
    /// On error, they are released.
    pub fn new_group(members: Vec<Weighted<NexthopRef>>) -> Result<Self, RtError> {
        let group = NhopGroup::new(members)?;
        let ctx = group.owner_context();
        ctx.arena().alloc(ObjKind::Group);
        debug!("Created group of {} nexthops in {}", group.len(), ctx.id());
        Ok(Self::from_target(Nexthop::Group(group)))
    }

    /// Get another reference to the same target
    #[must_use]
    pub fn acquire(&self) -> Self {
        Self {
            inner: ManuallyDrop::new(Arc::clone(&self.inner)),
        }
    }

    /// Give this reference back, tearing the target down if it was the last one
    pub fn release(self) {
        let ctx = self.owner_context().clone();
        self.release_in(&ctx);
    }

    /// Give this reference back from within `ctx`, which must be the owner context.
    pub(crate) fn release_in(self, ctx: &NetContext) {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is not used after this point and its destructor never runs
        let inner = unsafe { ManuallyDrop::take(&mut this.inner) };
        release_target(inner, ctx);
    }

    /// Number of references to the target
    #[must_use]
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    #[must_use]
    pub fn owner_context(&self) -> &Arc<NetContext> {
        self.inner.owner_context()
    }

    #[must_use]
    pub fn target(&self) -> &Nexthop {
        &self.inner
    }

    /// A non-owning view of the target
    #[must_use]
    pub fn handle(&self) -> NexthopHandle<'_> {
        NexthopHandle(&self.inner)
    }

    /// Tell if two references point to the same target
    #[must_use]
    pub fn ptr_eq(&self, other: &NexthopRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for NexthopRef {
    fn clone(&self) -> Self {
        self.acquire()
    }
}

impl Drop for NexthopRef {
    fn drop(&mut self) {
        let ctx = self.owner_context().clone();
        // SAFETY: `inner` is taken exactly once, here, and not used afterwards
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        release_target(inner, &ctx);
    }
}

/// A borrowed view of a nexthop that does not hold a reference
#[derive(Copy, Clone, Debug)]
pub struct NexthopHandle<'a>(&'a Nexthop);

impl<'a> NexthopHandle<'a> {
    #[must_use]
    pub fn target(&self) -> &'a Nexthop {
        self.0
    }
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.0.is_group()
    }
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.0.owner_context().id()
    }
    #[must_use]
    pub fn flags(&self) -> NhopFlags {
        self.0.flags()
    }
    /// The interface of a single nexthop
    #[must_use]
    pub fn ifindex(&self) -> Option<u32> {
        match self.0 {
            Nexthop::Single(nhop) => Some(nhop.spec.ifindex),
            Nexthop::Group(_) => None,
        }
    }
    /// The gateway of a single nexthop
    #[must_use]
    pub fn gateway(&self) -> Option<IpAddr> {
        match self.0 {
            Nexthop::Single(nhop) => nhop.spec.gateway,
            Nexthop::Group(_) => None,
        }
    }
    /// Weighted members of a group. A single nexthop yields itself with weight 1.
    pub fn members(&self) -> impl Iterator<Item = (u32, NexthopHandle<'a>)> + use<'a> {
        let (single, members): (_, &'a [Weighted<NexthopRef>]) = match self.0 {
            Nexthop::Single(_) => (Some((1, *self)), &[]),
            Nexthop::Group(group) => (None, group.members()),
        };
        single
            .into_iter()
            .chain(members.iter().map(|m| (m.weight, m.target.handle())))
    }
}

static_assertions::assert_impl_all!(NexthopRef: Send, Sync, Clone);
