// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deferred destruction of objects that concurrent readers may still be looking at.
//!
//! Readers wrap their accesses in a read-side section by holding a [`Guard`] obtained from
//! [`Domain::pin`]. Writers unlink an object so that no new reader can find it and then hand its
//! destruction to [`Domain::defer`]. Deferred work only runs once every reader that was inside a
//! section when the work was deferred has left it (a grace period).
//!
//! Deferred work runs on whichever thread calls [`Domain::try_reclaim`], which is normally a
//! `Reclaimer` worker.
//!
//! The `loom` and `shuttle` features build the domain on model-checked primitives. The
//! reclaimer thread is driven by a clock and is left out of those builds.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod domain;
#[cfg(not(any(feature = "loom", feature = "shuttle")))]
mod reclaimer;

pub use domain::{Domain, DomainStats, Guard};
#[cfg(not(any(feature = "loom", feature = "shuttle")))]
pub use reclaimer::{Reclaimer, ReclaimerError};

use tracectl::trace_target;
trace_target!("quiescent", LevelFilter::INFO, &["reclaim"]);
