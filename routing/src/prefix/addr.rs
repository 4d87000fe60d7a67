// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Destinations and stored route keys

use crate::errors::RtError;
use crate::prefix::mask::RtMask;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Size of the storage reserved for a key, in octets
pub const KEY_CAPACITY: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    /// Length of an address of this family, in octets
    #[must_use]
    pub const fn addr_len(self) -> usize {
        match self {
            AddressFamily::Inet => 4,
            AddressFamily::Inet6 => 16,
        }
    }
    /// Length of a host prefix
    #[must_use]
    pub const fn max_plen(self) -> u8 {
        match self {
            AddressFamily::Inet => 32,
            AddressFamily::Inet6 => 128,
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "inet"),
            AddressFamily::Inet6 => write!(f, "inet6"),
        }
    }
}

/// A destination as handed by callers. IPv6 destinations may carry the zone they
/// are scoped to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SockAddr {
    Inet(Ipv4Addr),
    Inet6 { addr: Ipv6Addr, scope_id: u32 },
}

impl SockAddr {
    #[must_use]
    pub fn inet6_scoped(addr: Ipv6Addr, scope_id: u32) -> Self {
        SockAddr::Inet6 { addr, scope_id }
    }

    /// Build a destination from raw octets of the given family
    pub fn from_raw(family: AddressFamily, bytes: &[u8], scope_id: u32) -> Result<Self, RtError> {
        if bytes.len() > KEY_CAPACITY {
            return Err(RtError::InvalidAddress(format!(
                "{} octets exceed the key capacity of {KEY_CAPACITY}",
                bytes.len()
            )));
        }
        if bytes.len() != family.addr_len() {
            return Err(RtError::InvalidAddress(format!(
                "{family} address needs {} octets, got {}",
                family.addr_len(),
                bytes.len()
            )));
        }
        let mut octets = [0u8; KEY_CAPACITY];
        octets[..bytes.len()].copy_from_slice(bytes);
        match family {
            AddressFamily::Inet => Ok(SockAddr::Inet(Ipv4Addr::new(
                octets[0], octets[1], octets[2], octets[3],
            ))),
            AddressFamily::Inet6 => Ok(SockAddr::Inet6 {
                addr: Ipv6Addr::from(octets),
                scope_id,
            }),
        }
    }

    #[must_use]
    pub fn family(&self) -> AddressFamily {
        match self {
            SockAddr::Inet(_) => AddressFamily::Inet,
            SockAddr::Inet6 { .. } => AddressFamily::Inet6,
        }
    }

    #[must_use]
    pub fn ip(&self) -> IpAddr {
        match self {
            SockAddr::Inet(a) => IpAddr::V4(*a),
            SockAddr::Inet6 { addr, .. } => IpAddr::V6(*addr),
        }
    }

    #[must_use]
    pub fn scope_id(&self) -> u32 {
        match self {
            SockAddr::Inet(_) => 0,
            SockAddr::Inet6 { scope_id, .. } => *scope_id,
        }
    }
}

impl From<Ipv4Addr> for SockAddr {
    fn from(addr: Ipv4Addr) -> Self {
        SockAddr::Inet(addr)
    }
}
impl From<Ipv6Addr> for SockAddr {
    fn from(addr: Ipv6Addr) -> Self {
        SockAddr::Inet6 { addr, scope_id: 0 }
    }
}
impl From<IpAddr> for SockAddr {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(a) => a.into(),
        }
    }
}

/// Tell if an IPv6 address is only meaningful together with a zone:
/// unicast link-local, or multicast with link-local or interface-local scope.
#[must_use]
pub fn is_scoped(addr: &Ipv6Addr) -> bool {
    let o = addr.octets();
    (o[0] == 0xfe && (o[1] & 0xc0) == 0x80) || (o[0] == 0xff && matches!(o[1] & 0x0f, 0x01 | 0x02))
}

/// Remove the zone embedded in a scoped address. Returns the bare address and the zone.
#[must_use]
pub(crate) fn clear_scope(addr: Ipv6Addr) -> (Ipv6Addr, u32) {
    if !is_scoped(&addr) {
        return (addr, 0);
    }
    let mut segments = addr.segments();
    let zone = u32::from(segments[1]);
    segments[1] = 0;
    (Ipv6Addr::from(segments), zone)
}

/// The key a route entry is stored under: the destination octets, with the zone
/// of scoped IPv6 addresses embedded in the second 16-bit word.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RtKey {
    family: AddressFamily,
    octets: [u8; KEY_CAPACITY],
}

impl RtKey {
    pub(crate) fn embed(dst: &SockAddr) -> Result<Self, RtError> {
        let mut octets = [0u8; KEY_CAPACITY];
        match dst {
            SockAddr::Inet(addr) => octets[..4].copy_from_slice(&addr.octets()),
            SockAddr::Inet6 { addr, scope_id } => {
                let mut segments = addr.segments();
                if *scope_id != 0 && is_scoped(addr) {
                    segments[1] = u16::try_from(*scope_id).map_err(|_| {
                        RtError::InvalidAddress(format!("zone {scope_id} of {addr} is out of range"))
                    })?;
                }
                octets.copy_from_slice(&Ipv6Addr::from(segments).octets());
            }
        }
        Ok(Self {
            family: dst.family(),
            octets,
        })
    }

    /// Zero the bits of the key not covered by `mask`
    pub(crate) fn apply_mask(&mut self, mask: &RtMask) {
        for (o, m) in self.octets.iter_mut().zip(mask.octets()) {
            *o &= m;
        }
    }

    #[must_use]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// The octets of the key, as many as the family needs
    #[must_use]
    pub fn octets(&self) -> &[u8] {
        &self.octets[..self.family.addr_len()]
    }

    /// The key as stored, zone included
    #[must_use]
    pub fn to_ip(&self) -> IpAddr {
        match self.family {
            AddressFamily::Inet => IpAddr::V4(Ipv4Addr::new(
                self.octets[0],
                self.octets[1],
                self.octets[2],
                self.octets[3],
            )),
            AddressFamily::Inet6 => IpAddr::V6(Ipv6Addr::from(self.octets)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn raw_destinations_are_validated() {
        let dst = SockAddr::from_raw(AddressFamily::Inet, &[10, 0, 0, 1], 0).unwrap();
        assert_eq!(dst, SockAddr::Inet(Ipv4Addr::new(10, 0, 0, 1)));

        let err = SockAddr::from_raw(AddressFamily::Inet, &[10, 0, 0], 0).unwrap_err();
        assert!(matches!(err, RtError::InvalidAddress(_)));

        let err = SockAddr::from_raw(AddressFamily::Inet6, &[0u8; 4], 0).unwrap_err();
        assert!(matches!(err, RtError::InvalidAddress(_)));

        let err = SockAddr::from_raw(AddressFamily::Inet6, &[0u8; 20], 0).unwrap_err();
        assert!(matches!(err, RtError::InvalidAddress(_)));
    }

    #[test]
    fn scoped_addresses() {
        for scoped in ["fe80::1", "febf::1", "ff02::1", "ff01::2", "ff12::1"] {
            assert!(is_scoped(&Ipv6Addr::from_str(scoped).unwrap()), "{scoped}");
        }
        for global in ["2001:db8::1", "::1", "fec0::1", "ff05::1", "ff0e::1"] {
            assert!(!is_scoped(&Ipv6Addr::from_str(global).unwrap()), "{global}");
        }
    }

    #[test]
    fn zone_is_embedded_and_cleared() {
        let addr = Ipv6Addr::from_str("fe80::1").unwrap();
        let key = RtKey::embed(&SockAddr::inet6_scoped(addr, 3)).unwrap();
        assert_eq!(key.to_ip(), IpAddr::from_str("fe80:3::1").unwrap());

        let IpAddr::V6(stored) = key.to_ip() else {
            unreachable!()
        };
        assert_eq!(clear_scope(stored), (addr, 3));
    }

    #[test]
    fn zone_on_global_address_is_ignored() {
        let addr = Ipv6Addr::from_str("2001:db8::1").unwrap();
        let key = RtKey::embed(&SockAddr::inet6_scoped(addr, 3)).unwrap();
        assert_eq!(key.to_ip(), IpAddr::V6(addr));
        assert_eq!(clear_scope(addr), (addr, 0));
    }

    #[test]
    fn oversized_zone_is_rejected() {
        let addr = Ipv6Addr::from_str("fe80::1").unwrap();
        let err = RtKey::embed(&SockAddr::inet6_scoped(addr, 0x1_0000)).unwrap_err();
        assert!(matches!(err, RtError::InvalidAddress(_)));
    }
}
