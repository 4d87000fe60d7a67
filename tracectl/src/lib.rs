// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-module trace targets and runtime control of their log levels.
//!
//! Modules declare a target with [`trace_target!`]. The levels of all declared targets can then
//! be changed by name or tag through the object returned by [`get_trace_ctl`].

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod control;
pub mod display;
pub mod targets;

// re-exports
pub use control::DEFAULT_DEFAULT_LOGLEVEL;
pub use control::get_trace_ctl;
pub use control::{TraceCtlError, TracingControl};
pub use tracing_subscriber::filter::LevelFilter;
