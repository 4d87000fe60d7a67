// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Family-tagged keys, interned masks and the conversions between the stored
//! representation and (address, prefix length) or (address, mask) pairs.

pub mod addr;
pub mod codec;
pub mod mask;

pub use addr::{AddressFamily, KEY_CAPACITY, RtKey, SockAddr};
pub use codec::{
    PrefixMask, get_plen, get_pmask, inet_prefix_plen, inet_prefix_pmask, inet6_prefix_plen,
    inet6_prefix_pmask,
};
pub use mask::{MaskRef, MaskTable, RtMask};
