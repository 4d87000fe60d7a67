// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route masks. Masks are interned: entries refer to them through a [`MaskRef`],
//! which is a plain `'static` reference and lives as long as the process.

use crate::errors::RtError;
use crate::prefix::addr::{AddressFamily, KEY_CAPACITY};
use concurrency::sync::{LazyLock, RwLock};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Deref;

/// A route mask for one address family
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RtMask {
    family: AddressFamily,
    octets: [u8; KEY_CAPACITY],
}

impl RtMask {
    /// Build a mask from raw octets
    pub fn new(family: AddressFamily, bytes: &[u8]) -> Result<Self, RtError> {
        if bytes.len() != family.addr_len() {
            return Err(RtError::InvalidAddress(format!(
                "{family} mask needs {} octets, got {}",
                family.addr_len(),
                bytes.len()
            )));
        }
        let mut octets = [0u8; KEY_CAPACITY];
        octets[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { family, octets })
    }

    fn contiguous(family: AddressFamily, plen: u8) -> Self {
        let mut octets = [0u8; KEY_CAPACITY];
        let mut left = plen;
        for octet in octets.iter_mut().take(family.addr_len()) {
            let bits = left.min(8);
            *octet = !(0xffu8.checked_shr(u32::from(bits)).unwrap_or(0));
            left -= bits;
        }
        Self { family, octets }
    }

    /// The interned mask for a prefix length
    pub fn from_plen(family: AddressFamily, plen: u8) -> Result<MaskRef, RtError> {
        if plen > family.max_plen() {
            return Err(RtError::InvalidPrefixLength { family, plen });
        }
        let table: &'static [RtMask] = match family {
            AddressFamily::Inet => &INET_MASKS[..],
            AddressFamily::Inet6 => &INET6_MASKS[..],
        };
        Ok(MaskRef(&table[usize::from(plen)]))
    }

    /// The all-ones mask of a family
    #[must_use]
    pub fn host(family: AddressFamily) -> MaskRef {
        match family {
            AddressFamily::Inet => MaskRef(&INET_MASKS[32]),
            AddressFamily::Inet6 => MaskRef(&INET6_MASKS[128]),
        }
    }

    #[must_use]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    #[must_use]
    pub fn octets(&self) -> &[u8] {
        &self.octets[..self.family.addr_len()]
    }

    /// Number of bits set in the mask
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // at most 128 bits are set
    pub fn plen(&self) -> u8 {
        self.octets().iter().map(|o| o.count_ones()).sum::<u32>() as u8
    }

    /// Tell if the bits set in the mask are all leading bits
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        *self == Self::contiguous(self.family, self.plen())
    }

    /// Tell if the mask covers the full address
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.plen() == self.family.max_plen()
    }

    /// The mask as an address-shaped bitmask
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

static INET_MASKS: LazyLock<[RtMask; 33]> = LazyLock::new(|| {
    std::array::from_fn(|plen| RtMask::contiguous(AddressFamily::Inet, plen_of(plen)))
});
static INET6_MASKS: LazyLock<[RtMask; 129]> = LazyLock::new(|| {
    std::array::from_fn(|plen| RtMask::contiguous(AddressFamily::Inet6, plen_of(plen)))
});

#[allow(clippy::cast_possible_truncation)] // tables have at most 129 entries
fn plen_of(index: usize) -> u8 {
    index as u8
}

/// Non-contiguous masks, interned on first use and never freed
static OTHER_MASKS: LazyLock<RwLock<HashSet<&'static RtMask>>> =
    LazyLock::new(|| RwLock::new(HashSet::new()));

/// A non-owning handle to an interned mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaskRef(&'static RtMask);

impl MaskRef {
    /// Tell if two handles refer to the same interned mask
    #[must_use]
    pub fn ptr_eq(self, other: MaskRef) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Deref for MaskRef {
    type Target = RtMask;
    fn deref(&self) -> &Self::Target {
        self.0
    }
}

/// The process-wide mask table
pub struct MaskTable;

impl MaskTable {
    /// Get the canonical handle for a mask. Equal masks always yield the same handle.
    #[must_use]
    pub fn intern(mask: &RtMask) -> MaskRef {
        if mask.is_contiguous() {
            let table: &'static [RtMask] = match mask.family {
                AddressFamily::Inet => &INET_MASKS[..],
                AddressFamily::Inet6 => &INET6_MASKS[..],
            };
            return MaskRef(&table[usize::from(mask.plen())]);
        }
        if let Some(interned) = OTHER_MASKS.read().get(mask) {
            return MaskRef(*interned);
        }
        let mut masks = OTHER_MASKS.write();
        if let Some(interned) = masks.get(mask) {
            return MaskRef(*interned);
        }
        let interned: &'static RtMask = Box::leak(Box::new(*mask));
        masks.insert(interned);
        MaskRef(interned)
    }

    /// Number of non-contiguous masks interned so far
    #[must_use]
    pub fn non_contiguous_count() -> usize {
        OTHER_MASKS.read().len()
    }
}
