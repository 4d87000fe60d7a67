// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Read-only conversions from the stored key and mask of an entry to
//! (address, prefix length) and (address, mask) pairs. Zones embedded in scoped
//! IPv6 keys are removed from the returned address and reported on their own.

use crate::prefix::addr::{RtKey, clear_scope};
use crate::prefix::mask::RtMask;
use crate::rtentry::RouteEntry;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Prefix of an entry in (address, mask) form. Host routes carry an all-ones mask
/// and have `is_host` set, whatever their family.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrefixMask {
    pub addr: IpAddr,
    pub mask: IpAddr,
    pub scope_id: u32,
    pub is_host: bool,
}

fn split_key(key: &RtKey) -> (IpAddr, u32) {
    match key.to_ip() {
        IpAddr::V4(addr) => (IpAddr::V4(addr), 0),
        IpAddr::V6(addr) => {
            let (addr, scope_id) = clear_scope(addr);
            (IpAddr::V6(addr), scope_id)
        }
    }
}

/// Get the address, prefix length and zone of an entry
#[must_use]
pub fn get_plen(entry: &RouteEntry) -> (IpAddr, u8, u32) {
    let (addr, scope_id) = split_key(entry.key());
    let plen = entry
        .mask()
        .map_or(entry.family().max_plen(), |mask| mask.plen());
    (addr, plen, scope_id)
}

/// Get the address, mask and zone of an entry
#[must_use]
pub fn get_pmask(entry: &RouteEntry) -> PrefixMask {
    let (addr, scope_id) = split_key(entry.key());
    let mask = entry
        .mask()
        .unwrap_or_else(|| RtMask::host(entry.family()));
    PrefixMask {
        addr,
        mask: mask.to_ip(),
        scope_id,
        is_host: entry.is_host(),
    }
}

/// [`get_plen`] for IPv4 entries. Returns `None` for entries of another family.
#[must_use]
pub fn inet_prefix_plen(entry: &RouteEntry) -> Option<(Ipv4Addr, u8)> {
    match get_plen(entry) {
        (IpAddr::V4(addr), plen, _) => Some((addr, plen)),
        (IpAddr::V6(_), ..) => None,
    }
}

/// [`get_plen`] for IPv6 entries. Returns `None` for entries of another family.
#[must_use]
pub fn inet6_prefix_plen(entry: &RouteEntry) -> Option<(Ipv6Addr, u8, u32)> {
    match get_plen(entry) {
        (IpAddr::V6(addr), plen, scope_id) => Some((addr, plen, scope_id)),
        (IpAddr::V4(_), ..) => None,
    }
}

/// [`get_pmask`] for IPv4 entries. Returns `None` for entries of another family.
#[must_use]
pub fn inet_prefix_pmask(entry: &RouteEntry) -> Option<(Ipv4Addr, Ipv4Addr)> {
    match get_pmask(entry) {
        PrefixMask {
            addr: IpAddr::V4(addr),
            mask: IpAddr::V4(mask),
            ..
        } => Some((addr, mask)),
        _ => None,
    }
}

/// [`get_pmask`] for IPv6 entries. Returns `None` for entries of another family.
#[must_use]
pub fn inet6_prefix_pmask(entry: &RouteEntry) -> Option<(Ipv6Addr, Ipv6Addr, u32)> {
    match get_pmask(entry) {
        PrefixMask {
            addr: IpAddr::V6(addr),
            mask: IpAddr::V6(mask),
            scope_id,
            ..
        } => Some((addr, mask, scope_id)),
        _ => None,
    }
}
