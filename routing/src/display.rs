// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations for route entries, nexthops and counters

use std::fmt::Display;

use crate::context::{ArenaStats, NetContext};
use crate::nexthop::{Nexthop, NhopGroup, NhopSpec};
use crate::prefix::{PrefixMask, RtMask, get_plen};
use crate::reclaim::ReclaimStats;
use crate::rtentry::{PoolStats, RT_DEFAULT_WEIGHT, RouteEntry, RtFlags};

macro_rules! SCOPED_ADDR {
    ($f:expr, $addr:expr, $scope:expr) => {
        if $scope == 0 {
            write!($f, "{}", $addr)
        } else {
            write!($f, "{}%{}", $addr, $scope)
        }
    };
}

impl Display for NetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id(), self.name())
    }
}

const FLAG_LETTERS: [(RtFlags, char); 7] = [
    (RtFlags::UP, 'U'),
    (RtFlags::GATEWAY, 'G'),
    (RtFlags::HOST, 'H'),
    (RtFlags::REJECT, 'R'),
    (RtFlags::BLACKHOLE, 'B'),
    (RtFlags::STATIC, 'S'),
    (RtFlags::PINNED, 'P'),
];

impl Display for RtFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (flag, letter) in FLAG_LETTERS {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

impl Display for RtMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_ip())
    }
}

impl Display for PrefixMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SCOPED_ADDR!(f, self.addr, self.scope_id)?;
        write!(f, " mask {}", self.mask)?;
        if self.is_host {
            write!(f, " (host)")?;
        }
        Ok(())
    }
}

impl Display for NhopSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::nexthop::NhopFlags;
        if self.flags.contains(NhopFlags::BLACKHOLE) {
            write!(f, "blackhole")?;
        } else if self.flags.contains(NhopFlags::REJECT) {
            write!(f, "reject")?;
        } else {
            match self.gateway {
                Some(gw) => write!(f, "via {gw} dev {}", self.ifindex)?,
                None => write!(f, "dev {}", self.ifindex)?,
            }
        }
        if self.mtu != 0 {
            write!(f, " mtu {}", self.mtu)?;
        }
        Ok(())
    }
}

impl Display for NhopGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group [")?;
        for (n, member) in self.members().iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} weight {}", member.target.target(), member.weight)?;
        }
        write!(f, "]")
    }
}

impl Display for Nexthop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Nexthop::Single(nhop) => write!(f, "{}", nhop.spec()),
            Nexthop::Group(group) => write!(f, "{group}"),
        }
    }
}

impl Display for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (addr, plen, scope_id) = get_plen(self);
        SCOPED_ADDR!(f, addr, scope_id)?;
        write!(f, "/{plen} {} <{}>", self.nexthop().target(), self.flags())?;
        if self.weight() != RT_DEFAULT_WEIGHT {
            write!(f, " weight {}", self.weight())?;
        }
        if self.expire() != 0 {
            write!(f, " expire {}", self.expire())?;
        }
        Ok(())
    }
}

fn fmt_heading(f: &mut std::fmt::Formatter<'_>, title: &str) -> std::fmt::Result {
    writeln!(f, " ━━━━━━━━━━━━━━━━━━━━ {title} ━━━━━━━━━━━━━━━━━━━━")
}

impl Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_heading(f, "Entry pool")?;
        writeln!(f, "  in use    : {}", self.in_use)?;
        writeln!(f, "  allocated : {}", self.allocated)?;
        writeln!(f, "  freed     : {}", self.freed)?;
        writeln!(f, "  cached    : {}", self.cached)
    }
}

impl Display for ArenaStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_heading(f, "Nexthops")?;
        writeln!(
            f,
            "  nexthops : {} live ({} created, {} destroyed)",
            self.nhops_live(),
            self.nhops_alloc,
            self.nhops_freed
        )?;
        writeln!(
            f,
            "  groups   : {} live ({} created, {} destroyed)",
            self.groups_live(),
            self.groups_alloc,
            self.groups_freed
        )
    }
}

impl Display for ReclaimStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_heading(f, "Reclamation")?;
        writeln!(f, "  epoch     : {}", self.epoch)?;
        writeln!(f, "  readers   : {}", self.readers)?;
        writeln!(f, "  scheduled : {}", self.scheduled)?;
        writeln!(f, "  reclaimed : {}", self.reclaimed)?;
        writeln!(f, "  pending   : {}", self.pending)?;
        writeln!(f, "  immediate : {}", self.immediate)
    }
}

#[cfg(test)]
mod test {
    use crate::context::{ContextId, NetContext};
    use crate::nexthop::{NexthopRef, NhopSpec, Weighted};
    use crate::prefix::{AddressFamily, RtMask, SockAddr, get_pmask};
    use crate::rtentry::{EntryStore, EntryStoreParams, RtFlags};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::str::FromStr;

    #[test]
    fn route_dump() {
        let ctx = NetContext::new(ContextId::new(2), "dump");
        assert_eq!(ctx.to_string(), "ctx-2 (dump)");
        let store = EntryStore::new(&ctx, &EntryStoreParams::default());
        let gw = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let nhop = NexthopRef::new(&ctx, NhopSpec::via(3, gw));

        let dst = SockAddr::Inet(Ipv4Addr::new(192, 168, 1, 77));
        let mask = RtMask::from_plen(AddressFamily::Inet, 24).unwrap();
        let mut entry = store.create(&dst, Some(mask), &nhop).unwrap();
        entry.set_flags(RtFlags::STATIC);
        assert_eq!(
            entry.to_string(),
            "192.168.1.0/24 via 10.0.0.1 dev 3 <UGS>"
        );
        entry.set_weight(5).unwrap();
        entry.set_expire(60);
        assert_eq!(
            entry.to_string(),
            "192.168.1.0/24 via 10.0.0.1 dev 3 <UGS> weight 5 expire 60"
        );
        assert_eq!(
            get_pmask(&entry).to_string(),
            "192.168.1.0 mask 255.255.255.0"
        );
    }

    #[test]
    fn scoped_and_group_dump() {
        let ctx = NetContext::new(ContextId::new(2), "dump");
        let store = EntryStore::new(&ctx, &EntryStoreParams::default());
        let group = NexthopRef::new_group(vec![
            Weighted::new(NexthopRef::new(&ctx, NhopSpec::direct(1).with_mtu(9000)), 1),
            Weighted::new(NexthopRef::new(&ctx, NhopSpec::blackhole()), 2),
        ])
        .unwrap();
        let addr = Ipv6Addr::from_str("fe80::1").unwrap();
        let entry = store
            .create(&SockAddr::inet6_scoped(addr, 4), None, &group)
            .unwrap();
        assert_eq!(
            entry.to_string(),
            "fe80::1%4/128 group [dev 1 mtu 9000 weight 1, blackhole weight 2] <UHB>"
        );
        assert_eq!(
            get_pmask(&entry).to_string(),
            "fe80::1%4 mask ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff (host)"
        );
    }
}
