// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of trace targets.
//!
//! Modules declare a target with [`trace_target!`](crate::trace_target). Declarations are
//! collected at link time, so the control object knows every target without any explicit
//! registration call at startup.

use crate::LevelFilter;

#[doc(hidden)]
pub use linkme;
pub use linkme::distributed_slice;

/// A named group of log events, identified by the module that declared it.
#[derive(Debug)]
pub struct TraceTarget {
    /// name used to refer to the target from configuration strings
    pub name: &'static str,
    /// module path of the declaration; events from this module and its children belong here
    pub module: &'static str,
    /// level applied until configured otherwise
    pub default_level: LevelFilter,
    /// tags allow changing the level of several targets at once
    pub tags: &'static [&'static str],
}

impl TraceTarget {
    #[must_use]
    pub const fn new(
        name: &'static str,
        module: &'static str,
        default_level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            module,
            default_level,
            tags,
        }
    }
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag)
    }
}

#[distributed_slice]
pub static TRACE_TARGETS: [TraceTarget];

/// Declare a trace target for the calling module.
///
/// ```ignore
/// use tracectl::trace_target;
/// trace_target!("rt-entry", LevelFilter::INFO, &["routing"]);
/// ```
#[macro_export]
macro_rules! trace_target {
    ($name:expr, LevelFilter::$level:ident, $tags:expr) => {
        const _: () = {
            #[$crate::targets::distributed_slice($crate::targets::TRACE_TARGETS)]
            #[linkme(crate = $crate::targets::linkme)]
            static TRACE_TARGET: $crate::targets::TraceTarget = $crate::targets::TraceTarget::new(
                $name,
                module_path!(),
                $crate::LevelFilter::$level,
                $tags,
            );
        };
    };
}

/// Iterate over all the targets linked into the binary.
pub fn all_targets() -> impl Iterator<Item = &'static TraceTarget> {
    TRACE_TARGETS.iter()
}
