//! `dsd-stage` — a streaming-stage adapter for long-running digital voice decoders.
//!
//! This crate provides:
//! - A scheduler-facing stage (`forecast` / `produce`) with bounded, synchronous calls
//! - A dedicated decoder worker thread fed through single-slot handoff channels
//! - A pluggable decoder interface plus a built-in N:1 decimator
//! - Structured configuration, counters and logging
//!
//! Decoded samples that do not fit the caller's buffer are kept by the worker and delivered on
//! later calls; nothing is dropped or duplicated across calls.

// High-level API (most consumers should start here).
pub mod opts;
pub mod stage;

// Decoder interface and built-in decoders.
pub mod backends;
pub mod codec;
pub mod mode;

// Cross-thread handoff and the worker loop.
mod handoff;
mod worker;

// Observability.
pub mod stats;

// Whole-buffer helpers for files, tests and the CLI.
pub mod driver;
pub mod wav;

mod error;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use codec::{DecodeError, FrameDecoder};
pub use error::{Error, Result};
pub use mode::{FrameFamily, Modulation};
pub use opts::{DecoderOpts, StageOpts};
pub use stage::{DecoderStage, ShutdownOutcome, Work, WorkStatus};
pub use stats::StatsSnapshot;

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
