//! A minimal pull scheduler for whole-buffer processing.
//!
//! Flow-graph runtimes call [`DecoderStage::produce`] themselves. For files, tests and the CLI we
//! only need the same cadence: ask for a block of output, offer the forecast amount of input,
//! advance by what was consumed, and finally flush what the worker still holds.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::stage::{DecoderStage, WorkStatus};

/// Consecutive stalled calls tolerated before giving up.
const MAX_CONSECUTIVE_STALLS: usize = 16;

/// Outcome of [`run_stream`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub output: Vec<i16>,
    /// Input samples the stage accepted.
    pub consumed: usize,
    /// Trailing input shorter than one decode unit's worth, never offered to the stage.
    pub leftover: usize,
    /// `produce` calls issued, flush calls included.
    pub calls: usize,
    pub stalls: usize,
    pub decode_errors: u64,
}

/// Push all of `input` through `stage`, requesting `block` output samples per call.
///
/// `block` is raised to the stage's minimum decode unit if it is smaller.
pub fn run_stream(stage: &mut DecoderStage, input: &[i16], block: usize) -> Result<StreamReport> {
    let min_unit = stage.opts().min_output_unit;
    let block = block.max(min_unit);
    let ratio = stage.forecast(1);
    let unit_input = stage.forecast(min_unit);

    let mut out_buf = vec![0i16; block];
    let mut report = StreamReport::default();
    let mut offset = 0usize;
    let mut stalled_in_row = 0usize;

    while input.len() - offset >= unit_input {
        let available = input.len() - offset;
        let requested = block.min(available / ratio);
        let window_len = stage.forecast(requested).min(available);
        let window = &input[offset..offset + window_len];

        let work = stage.produce(requested, window, &mut out_buf)?;
        report.calls += 1;
        report.output.extend_from_slice(&out_buf[..work.produced]);
        offset += work.consumed;
        report.consumed += work.consumed;

        track_status(work.status, &mut report, &mut stalled_in_row)?;
    }

    // Flush: empty windows make the worker hand over whatever is still buffered.
    loop {
        let work = stage.produce(block, &[], &mut out_buf)?;
        report.calls += 1;
        report.output.extend_from_slice(&out_buf[..work.produced]);

        let stalled = work.status == WorkStatus::Stalled;
        track_status(work.status, &mut report, &mut stalled_in_row)?;
        if !stalled && work.produced == 0 {
            break;
        }
    }

    report.leftover = input.len() - offset;
    debug!(
        consumed = report.consumed,
        produced = report.output.len(),
        leftover = report.leftover,
        calls = report.calls,
        "stream drained"
    );
    Ok(report)
}

fn track_status(
    status: WorkStatus,
    report: &mut StreamReport,
    stalled_in_row: &mut usize,
) -> Result<()> {
    match status {
        WorkStatus::Stalled => {
            report.stalls += 1;
            *stalled_in_row += 1;
            if *stalled_in_row > MAX_CONSECUTIVE_STALLS {
                return Err(Error::Message(format!(
                    "decoder stalled on {} consecutive calls",
                    *stalled_in_row
                )));
            }
            warn!(stalled_in_row = *stalled_in_row, "retrying after stall");
        }
        WorkStatus::Recovered { decode_errors } => {
            report.decode_errors += u64::from(decode_errors);
            *stalled_in_row = 0;
        }
        WorkStatus::Decoded | WorkStatus::BelowDecodeUnit => *stalled_in_row = 0,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::decimator::{DecimateMode, Decimator};
    use crate::opts::StageOpts;

    #[test]
    fn drains_whole_input_through_the_decimator() -> anyhow::Result<()> {
        let mut stage = DecoderStage::new(
            StageOpts::default(),
            Decimator::new(6, DecimateMode::Pick),
        )?;
        let input: Vec<i16> = (0..12_500).map(|i| (i % 3000) as i16).collect();

        let report = run_stream(&mut stage, &input, 500)?;

        // Four windows of 3000; the 500-sample tail is below one unit (960 input samples).
        assert_eq!(report.consumed, 12_000);
        assert_eq!(report.leftover, 500);
        let expected: Vec<i16> = input[..12_000].iter().step_by(6).copied().collect();
        assert_eq!(report.output, expected);
        assert_eq!(report.stalls, 0);
        Ok(())
    }

    #[test]
    fn short_input_only_flushes() -> anyhow::Result<()> {
        let mut stage = DecoderStage::new(
            StageOpts::default(),
            Decimator::new(6, DecimateMode::Average),
        )?;
        let report = run_stream(&mut stage, &[1; 100], 160)?;
        assert_eq!(report.consumed, 0);
        assert_eq!(report.leftover, 100);
        assert!(report.output.is_empty());
        assert_eq!(report.calls, 1);
        Ok(())
    }
}
