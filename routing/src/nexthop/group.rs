// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Multipath nexthop groups

use crate::context::{NetContext, ObjKind};
use crate::errors::RtError;
use crate::nexthop::NexthopRef;
use concurrency::sync::Arc;
use tracing::debug;

/// A value with a weight
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Weighted<T> {
    pub weight: u32,
    pub target: T,
}

impl<T> Weighted<T> {
    #[must_use]
    pub fn new(target: T, weight: u32) -> Self {
        Self { weight, target }
    }
}

/// An ordered, weighted set of single nexthops, all owned by the same context
#[derive(Debug)]
pub struct NhopGroup {
    ctx: Arc<NetContext>,
    members: Vec<Weighted<NexthopRef>>,
}

impl NhopGroup {
    pub(crate) fn new(members: Vec<Weighted<NexthopRef>>) -> Result<Self, RtError> {
        let Some(first) = members.first() else {
            return Err(RtError::EmptyGroup);
        };
        let ctx = first.target.owner_context().clone();
        for member in &members {
            if member.target.target().is_group() {
                return Err(RtError::NestedGroup);
            }
            if member.weight == 0 {
                return Err(RtError::InvalidWeight(member.weight));
            }
            let owner = member.target.owner_context();
            if !Arc::ptr_eq(owner, &ctx) {
                return Err(RtError::ContextMismatch(ctx.id(), owner.id()));
            }
        }
        Ok(Self { ctx, members })
    }

    /// The context of the first member
    #[must_use]
    pub fn owner_context(&self) -> &Arc<NetContext> {
        &self.ctx
    }

    #[must_use]
    pub fn members(&self) -> &[Weighted<NexthopRef>] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.members.iter().map(|m| u64::from(m.weight)).sum()
    }

    /// Give back the member references, then the group itself.
    pub(super) fn teardown(self, ctx: &NetContext) {
        debug!("Destroying group of {} nexthops", self.members.len());
        for member in self.members {
            member.target.release_in(ctx);
        }
        ctx.arena().free(ObjKind::Group);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::ContextId;
    use crate::nexthop::{NhopFlags, NhopSpec};
    use std::net::{IpAddr, Ipv6Addr};

    fn members(ctx: &Arc<NetContext>, count: u32) -> Vec<Weighted<NexthopRef>> {
        (0..count)
            .map(|n| {
                let gw = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1 + n as u16));
                Weighted::new(NexthopRef::new(ctx, NhopSpec::via(n + 1, gw)), n + 1)
            })
            .collect()
    }

    #[test]
    fn group_release_frees_members_once() {
        for size in [1u32, 2, 8] {
            let ctx = NetContext::new(ContextId::new(size), "mp");
            let group = NexthopRef::new_group(members(&ctx, size)).unwrap();
            let extra = group.acquire();
            assert_eq!(ctx.arena().stats().nhops_live(), u64::from(size));
            assert_eq!(ctx.arena().stats().groups_live(), 1);
            assert_eq!(group.handle().members().count(), size as usize);

            group.release();
            assert_eq!(ctx.arena().stats().groups_live(), 1);

            extra.release();
            let stats = ctx.arena().stats();
            assert_eq!(stats.nhops_alloc, u64::from(size));
            assert_eq!(stats.nhops_freed, u64::from(size));
            assert_eq!(stats.groups_alloc, 1);
            assert_eq!(stats.groups_freed, 1);
        }
    }

    #[test]
    fn shared_members_outlive_the_group() {
        let ctx = NetContext::new(ContextId::new(1), "mp");
        let nhop = NexthopRef::new(&ctx, NhopSpec::direct(4));
        let group = NexthopRef::new_group(vec![Weighted::new(nhop.clone(), 3)]).unwrap();
        assert_eq!(nhop.refcount(), 2);
        drop(group);
        assert_eq!(nhop.refcount(), 1);
        assert_eq!(ctx.arena().stats().nhops_live(), 1);
    }

    #[test]
    fn group_reports_first_member_context() {
        let ctx = NetContext::new(ContextId::new(9), "mp");
        let group = NexthopRef::new_group(members(&ctx, 3)).unwrap();
        assert!(Arc::ptr_eq(group.owner_context(), &ctx));
        assert!(group.target().is_group());
        assert_eq!(group.target().flags(), NhopFlags::GATEWAY);
        let crate::nexthop::Nexthop::Group(g) = group.target() else {
            unreachable!()
        };
        assert_eq!(g.len(), 3);
        assert_eq!(g.total_weight(), 6);
    }

    #[test]
    fn invalid_groups_are_rejected() {
        let red = NetContext::new(ContextId::new(1), "red");
        let blue = NetContext::new(ContextId::new(2), "blue");

        assert!(matches!(
            NexthopRef::new_group(vec![]),
            Err(RtError::EmptyGroup)
        ));

        let zero = vec![Weighted::new(NexthopRef::new(&red, NhopSpec::direct(1)), 0)];
        assert!(matches!(
            NexthopRef::new_group(zero),
            Err(RtError::InvalidWeight(0))
        ));

        let inner = NexthopRef::new_group(members(&red, 2)).unwrap();
        assert!(matches!(
            NexthopRef::new_group(vec![Weighted::new(inner, 1)]),
            Err(RtError::NestedGroup)
        ));

        let mixed = vec![
            Weighted::new(NexthopRef::new(&red, NhopSpec::direct(1)), 1),
            Weighted::new(NexthopRef::new(&blue, NhopSpec::direct(1)), 1),
        ];
        assert!(matches!(
            NexthopRef::new_group(mixed),
            Err(RtError::ContextMismatch(a, b)) if a == ContextId::new(1) && b == ContextId::new(2)
        ));

        // rejected members were given back
        assert_eq!(red.arena().stats().nhops_live(), 0);
        assert_eq!(red.arena().stats().groups_live(), 0);
        assert_eq!(blue.arena().stats().nhops_live(), 0);
    }
}
