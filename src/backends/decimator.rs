use tracing::trace;

use crate::codec::{DecodeError, FrameDecoder};
use crate::opts::DecoderOpts;

/// How a [`Decimator`] collapses each block of input samples into one output sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimateMode {
    /// Boxcar average of the block (a crude low-pass before downsampling).
    #[default]
    Average,
    /// Keep the first sample of each block.
    Pick,
}

/// Built-in reference decoder: an N:1 rate reducer.
///
/// It stands in for a real voice decoder where one is not linked in, and exercises the same
/// contract: a persistent context (the partially filled block) survives across calls, so block
/// boundaries do not have to line up with window or chunk boundaries.
#[derive(Debug, Clone)]
pub struct Decimator {
    ratio: usize,
    mode: DecimateMode,

    // Partial block carried over from the previous call.
    first: i16,
    sum: i64,
    filled: usize,
}

impl Decimator {
    /// Create an `ratio`:1 decimator. A ratio of zero is treated as 1.
    pub fn new(ratio: usize, mode: DecimateMode) -> Self {
        Self {
            ratio: ratio.max(1),
            mode,
            first: 0,
            sum: 0,
            filled: 0,
        }
    }

    /// Input samples held in the partial block.
    pub fn pending(&self) -> usize {
        self.filled
    }
}

impl FrameDecoder for Decimator {
    fn decode(
        &mut self,
        mode: &DecoderOpts,
        input: &[i16],
        out: &mut Vec<i16>,
    ) -> Result<(), DecodeError> {
        let before = out.len();
        out.reserve((self.filled + input.len()) / self.ratio);

        for &sample in input {
            if self.filled == 0 {
                self.first = sample;
            }
            self.sum += i64::from(sample);
            self.filled += 1;

            if self.filled == self.ratio {
                let value = match self.mode {
                    DecimateMode::Pick => self.first,
                    // The mean of i16 values always fits back into i16.
                    DecimateMode::Average => (self.sum / self.ratio as i64) as i16,
                };
                out.push(value);
                self.sum = 0;
                self.filled = 0;
            }
        }

        if mode.verbosity > 1 {
            trace!(
                input = input.len(),
                output = out.len() - before,
                pending = self.filled,
                "decimated chunk"
            );
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.first = 0;
        self.sum = 0;
        self.filled = 0;
    }

    fn rate_ratio(&self) -> Option<usize> {
        Some(self.ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_mode_emits_block_means() {
        let mut d = Decimator::new(3, DecimateMode::Average);
        let mut out = Vec::new();
        d.decode(&DecoderOpts::default(), &[3, 6, 9, -3, -3, -3], &mut out)
            .unwrap();
        assert_eq!(out, vec![6, -3]);
    }

    #[test]
    fn partial_blocks_carry_across_calls() {
        let mut d = Decimator::new(4, DecimateMode::Pick);
        let mode = DecoderOpts::default();
        let mut out = Vec::new();

        d.decode(&mode, &[10, 11, 12], &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(d.pending(), 3);

        d.decode(&mode, &[13, 20, 21, 22, 23, 30], &mut out).unwrap();
        assert_eq!(out, vec![10, 20]);
        assert_eq!(d.pending(), 1);
    }

    #[test]
    fn reset_discards_the_partial_block() {
        let mut d = Decimator::new(2, DecimateMode::Average);
        let mode = DecoderOpts::default();
        let mut out = Vec::new();

        d.decode(&mode, &[100], &mut out).unwrap();
        d.reset();
        d.decode(&mode, &[2, 4], &mut out).unwrap();
        assert_eq!(out, vec![3]);
    }

    #[test]
    fn extreme_samples_do_not_overflow() {
        let mut d = Decimator::new(2, DecimateMode::Average);
        let mut out = Vec::new();
        d.decode(
            &DecoderOpts::default(),
            &[i16::MAX, i16::MAX, i16::MIN, i16::MIN],
            &mut out,
        )
        .unwrap();
        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn reports_its_ratio() {
        assert_eq!(Decimator::new(6, DecimateMode::Pick).rate_ratio(), Some(6));
        assert_eq!(Decimator::new(0, DecimateMode::Pick).rate_ratio(), Some(1));
    }
}
