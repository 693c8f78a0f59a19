//! Decoder mode selectors.
//!
//! These mirror the frame-family and modulation switches of a DSD-style decoder. They are
//! fixed for the lifetime of a stage and passed to the decoder on every call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Digital voice frame family the decoder should lock onto.
///
/// `ValueEnum` (under the `cli` feature) allows this enum to be used directly as a CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum FrameFamily {
    /// Accept every family the decoder knows about.
    Auto,
    Dstar,
    X2Tdma,
    P25Phase1,
    Nxdn48,
    Nxdn96,
    Dmr,
    #[default]
    ProVoice,
}

impl FrameFamily {
    /// Human readable name used in start-up logs.
    pub fn label(self) -> &'static str {
        match self {
            FrameFamily::Auto => "all",
            FrameFamily::Dstar => "D-STAR",
            FrameFamily::X2Tdma => "X2-TDMA",
            FrameFamily::P25Phase1 => "P25 Phase 1",
            FrameFamily::Nxdn48 => "NXDN48",
            FrameFamily::Nxdn96 => "NXDN96",
            FrameFamily::Dmr => "DMR",
            FrameFamily::ProVoice => "ProVoice",
        }
    }
}

impl fmt::Display for FrameFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Modulation optimizations to enable in the symbol slicer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Modulation {
    C4fm,
    Qpsk,
    #[default]
    Gfsk,
}

impl Modulation {
    /// Numeric `rf_mod` index understood by DSD-style decoders.
    pub fn rf_mod(self) -> u8 {
        match self {
            Modulation::C4fm => 0,
            Modulation::Qpsk => 1,
            Modulation::Gfsk => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Modulation::C4fm => "C4FM",
            Modulation::Qpsk => "QPSK",
            Modulation::Gfsk => "GFSK",
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
