// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Human readable dumps of the tracing configuration

use crate::control::{TraceCtlError, TracingControl};
use ordermap::OrderMap;
use std::fmt::Write;

impl TracingControl {
    /// One line per target: name, level, module and tags
    pub fn as_string(&self) -> Result<String, TraceCtlError> {
        let config = self.snapshot();
        let mut out = String::new();
        writeln!(out, "default: {}", config.default)?;
        for target in self.targets() {
            let level = config
                .levels
                .get(target.name)
                .copied()
                .unwrap_or(target.default_level);
            writeln!(
                out,
                " {:<20} {:<6} {:<40} [{}]",
                target.name,
                level.to_string(),
                target.module,
                target.tags.join(",")
            )?;
        }
        Ok(out)
    }

    /// Targets grouped by tag
    pub fn as_string_by_tag(&self) -> Result<String, TraceCtlError> {
        let mut by_tag: OrderMap<&str, Vec<&str>> = OrderMap::new();
        for target in self.targets() {
            for tag in target.tags {
                let names = by_tag.entry(tag).or_default();
                if !names.contains(&target.name) {
                    names.push(target.name);
                }
            }
        }
        let mut out = String::new();
        for (tag, names) in &by_tag {
            writeln!(out, " {tag:<20} {}", names.join(" "))?;
        }
        Ok(out)
    }
}
