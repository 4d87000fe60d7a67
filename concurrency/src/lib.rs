// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Synchronization primitives used across the workspace.
//!
//! Every crate imports its locks, atomics and reference counters from here rather than from `std`
//! or `parking_lot` directly, so the choice of backend is made in exactly one place. The `loom`
//! and `shuttle` features swap in model-checking backends, and [`stress::model`] runs a test body
//! under the selected checker.

#![deny(clippy::all, clippy::pedantic)]

pub mod stress;
pub mod sync;
pub mod thread;
