// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route entry errors

use crate::context::ContextId;
use crate::prefix::AddressFamily;
use quiescent::ReclaimerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RtError {
    #[error("Out of memory: route entry pool of {context} is exhausted ({capacity} entries)")]
    OutOfMemory { context: ContextId, capacity: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid prefix length {plen} for family {family}")]
    InvalidPrefixLength { family: AddressFamily, plen: u8 },

    #[error("Mask family {mask} does not match destination family {dst}")]
    MaskFamilyMismatch {
        dst: AddressFamily,
        mask: AddressFamily,
    },

    #[error("A nexthop group needs at least one member")]
    EmptyGroup,

    #[error("Nexthop groups cannot be nested")]
    NestedGroup,

    #[error("Nexthop group members belong to distinct contexts ({0} and {1})")]
    ContextMismatch(ContextId, ContextId),

    #[error("Invalid weight {0}")]
    InvalidWeight(u32),

    #[error(transparent)]
    Reclaimer(#[from] ReclaimerError),
}
