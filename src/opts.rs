use std::io::Read;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mode::{FrameFamily, Modulation};

/// Options that control a [`crate::DecoderStage`].
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (flow graphs, tests, batch jobs) can construct options programmatically
///
/// Every field has a default, so a JSON file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOpts {
    /// Input samples per output sample (48 kHz in, 8 kHz out by default).
    pub rate_ratio: usize,

    /// Output sample rate in Hz. The expected input rate is `output_sample_rate * rate_ratio`.
    pub output_sample_rate: u32,

    /// Smallest output request worth waking the worker for (one decode unit).
    ///
    /// A request of exactly this many samples is served; anything below returns without
    /// touching input or output.
    pub min_output_unit: usize,

    /// Samples reserved up front for decoded output the scheduler has not collected yet.
    pub scratch_capacity: usize,

    /// Maximum number of input samples handed to the decoder per call.
    ///
    /// The worker checks for shutdown between chunks, so this bounds teardown latency.
    pub decode_chunk: usize,

    /// How long `produce` waits for the worker before reporting a stall.
    pub produce_timeout_ms: u64,

    /// How long construction waits for the worker's ready report.
    pub startup_timeout_ms: u64,

    /// How long teardown waits for the worker to exit before detaching it.
    pub shutdown_timeout_ms: u64,

    /// Mode flags passed to the decoder on every call.
    pub decoder: DecoderOpts,
}

impl Default for StageOpts {
    fn default() -> Self {
        Self {
            rate_ratio: 6,
            output_sample_rate: 8_000,
            min_output_unit: 160,
            scratch_capacity: 80_000,
            decode_chunk: 960,
            produce_timeout_ms: 2_000,
            startup_timeout_ms: 1_000,
            shutdown_timeout_ms: 500,
            decoder: DecoderOpts::default(),
        }
    }
}

impl StageOpts {
    /// Parse options from a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Parse options from a JSON reader (e.g. a config file).
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let opts: Self = serde_json::from_reader(reader)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Sample rate the scheduler is expected to feed, in Hz.
    pub fn input_sample_rate(&self) -> u64 {
        u64::from(self.output_sample_rate) * self.rate_ratio as u64
    }

    pub fn produce_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject option sets that would leave the stage unable to make progress.
    pub fn validate(&self) -> Result<()> {
        if self.rate_ratio == 0 {
            return Err(Error::config("rate_ratio must be at least 1"));
        }
        if self.output_sample_rate == 0 {
            return Err(Error::config("output_sample_rate must be non-zero"));
        }
        if self.min_output_unit == 0 {
            return Err(Error::config("min_output_unit must be at least 1"));
        }
        if self.scratch_capacity < self.min_output_unit {
            return Err(Error::config(format!(
                "scratch_capacity ({}) must hold at least one decode unit ({})",
                self.scratch_capacity, self.min_output_unit
            )));
        }
        if self.decode_chunk == 0 {
            return Err(Error::config("decode_chunk must be at least 1"));
        }
        for (name, value) in [
            ("produce_timeout_ms", self.produce_timeout_ms),
            ("startup_timeout_ms", self.startup_timeout_ms),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{name} must be non-zero")));
            }
        }
        self.decoder.validate()
    }
}

/// Mode flags for the decoder. Configured once, never changed while the stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOpts {
    pub frame_family: FrameFamily,
    pub modulation: Modulation,
    pub samples_per_symbol: u32,

    /// Sample index inside a symbol used for slicing. Must be below `samples_per_symbol`.
    pub symbol_center: u32,

    /// Symbols per second, informational for the decoder and the start-up log.
    pub symbol_rate: u32,

    /// Unvoiced speech synthesis quality (1-64).
    pub unvoiced_quality: u8,

    pub verbosity: u8,
}

impl Default for DecoderOpts {
    fn default() -> Self {
        Self {
            frame_family: FrameFamily::ProVoice,
            modulation: Modulation::Gfsk,
            samples_per_symbol: 5,
            symbol_center: 2,
            symbol_rate: 9_600,
            unvoiced_quality: 10,
            verbosity: 1,
        }
    }
}

impl DecoderOpts {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_symbol == 0 {
            return Err(Error::config("samples_per_symbol must be at least 1"));
        }
        if self.symbol_center >= self.samples_per_symbol {
            return Err(Error::config(format!(
                "symbol_center ({}) must be below samples_per_symbol ({})",
                self.symbol_center, self.samples_per_symbol
            )));
        }
        if self.symbol_rate == 0 {
            return Err(Error::config("symbol_rate must be non-zero"));
        }
        if !(1..=64).contains(&self.unvoiced_quality) {
            return Err(Error::config(format!(
                "unvoiced_quality must be between 1 and 64, got {}",
                self.unvoiced_quality
            )));
        }
        Ok(())
    }
}
