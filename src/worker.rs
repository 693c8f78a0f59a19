//! The decoder worker loop.
//!
//! Responsibilities:
//! - own the decoder (the persistent decode context) and the scratch buffer
//! - wait for an input window, decode all of it in bounded chunks
//! - hand back as many decoded samples as the window allows, keeping the rest buffered
//!
//! Finish policy: a cycle ends only once the whole window has been decoded (or shutdown was
//! requested). An empty window therefore just flushes already-decoded samples.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::codec::FrameDecoder;
use crate::error::{Error, Result};
use crate::handoff::{BurstStatus, CancelToken, InputWindow, OutputBurst, WorkerEnd};
use crate::opts::{DecoderOpts, StageOpts};
use crate::stats::StageStats;

pub(crate) const THREAD_NAME: &str = "dsd-decoder";

/// Spawn the worker thread. The thread reports readiness through `end` before taking windows.
pub(crate) fn spawn<D>(
    opts: &StageOpts,
    decoder: D,
    end: WorkerEnd,
    cancel: CancelToken,
    stats: Arc<StageStats>,
) -> Result<JoinHandle<()>>
where
    D: FrameDecoder + 'static,
{
    let worker = Worker::new(opts, decoder, cancel, stats);
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || worker.run(end))
        .map_err(Error::Spawn)
}

pub(crate) struct Worker<D> {
    decoder: D,
    mode: DecoderOpts,
    decode_chunk: usize,

    // Decoded samples not yet handed to the adapter, oldest first.
    scratch: VecDeque<i16>,
    scratch_capacity: usize,
    over_capacity: bool,

    // Reusable per-call output buffer for the decoder.
    decoded: Vec<i16>,

    cancel: CancelToken,
    stats: Arc<StageStats>,
}

impl<D: FrameDecoder> Worker<D> {
    pub(crate) fn new(
        opts: &StageOpts,
        decoder: D,
        cancel: CancelToken,
        stats: Arc<StageStats>,
    ) -> Self {
        Self {
            decoder,
            mode: opts.decoder.clone(),
            decode_chunk: opts.decode_chunk,
            scratch: VecDeque::new(),
            scratch_capacity: opts.scratch_capacity,
            over_capacity: false,
            decoded: Vec::new(),
            cancel,
            stats,
        }
    }

    /// Reserve the scratch buffer up front so allocation failure surfaces at construction.
    pub(crate) fn allocate(&mut self) -> Result<()> {
        self.scratch
            .try_reserve_exact(self.scratch_capacity)
            .map_err(|_| Error::Allocation {
                samples: self.scratch_capacity,
            })
    }

    fn run(mut self, mut end: WorkerEnd) {
        self.serve(&mut end);
        // The decoder and scratch buffer are released before the adapter hears about it.
        drop(self);
        end.report_exited();
    }

    fn serve(&mut self, end: &mut WorkerEnd) {
        let startup = self.allocate();
        let ready = startup.is_ok();
        end.report_ready(startup);
        if !ready {
            return;
        }
        debug!(scratch_capacity = self.scratch_capacity, "decoder worker ready");

        while let Some(window) = end.next_window() {
            if self.cancel.is_cancelled() {
                break;
            }
            let burst = self.cycle(window);
            if !end.deliver(burst) {
                break;
            }
        }

        debug!(
            buffered = self.scratch.len(),
            "decoder worker exiting, releasing scratch buffer"
        );
    }

    /// Decode one window and build the reply for it.
    pub(crate) fn cycle(&mut self, window: InputWindow) -> OutputBurst {
        let InputWindow {
            seq,
            samples,
            capacity,
            recycled,
        } = window;

        let mut decode_errors = 0u32;
        let mut interrupted = false;

        for chunk in samples.chunks(self.decode_chunk) {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            self.decoded.clear();
            match self.decoder.decode(&self.mode, chunk, &mut self.decoded) {
                Ok(()) => self.scratch.extend(self.decoded.drain(..)),
                Err(err) => {
                    decode_errors = decode_errors.saturating_add(1);
                    self.stats.record_decode_error();
                    warn!(seq, error = %err, "decode failed, resetting decoder context");
                    self.decoded.clear();
                    self.decoder.reset();
                }
            }
        }

        self.observe_scratch();

        let take = capacity.min(self.scratch.len());
        let mut out = recycled;
        out.clear();
        out.extend(self.scratch.drain(..take));

        let mut spent = samples;
        spent.clear();

        let status = if interrupted {
            BurstStatus::Interrupted
        } else if decode_errors > 0 {
            BurstStatus::Recovered { decode_errors }
        } else {
            BurstStatus::Complete
        };

        trace!(
            seq,
            produced = out.len(),
            buffered = self.scratch.len(),
            "decode cycle finished"
        );

        OutputBurst {
            seq,
            samples: out,
            spent,
            status,
        }
    }

    fn observe_scratch(&mut self) {
        let len = self.scratch.len();
        self.stats.observe_scratch(len);

        if len > self.scratch_capacity {
            if !self.over_capacity {
                warn!(
                    buffered = len,
                    scratch_capacity = self.scratch_capacity,
                    "decoded samples are piling up faster than the scheduler collects them"
                );
            }
            self.over_capacity = true;
        } else {
            self.over_capacity = false;
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.scratch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeError;

    /// Emits every input sample unchanged; fails on `i16::MIN`.
    struct Echo {
        resets: usize,
    }

    impl FrameDecoder for Echo {
        fn decode(
            &mut self,
            _mode: &DecoderOpts,
            input: &[i16],
            out: &mut Vec<i16>,
        ) -> std::result::Result<(), DecodeError> {
            for &s in input {
                if s == i16::MIN {
                    return Err(DecodeError::Corrupt("marker".into()));
                }
                out.push(s);
            }
            Ok(())
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn worker(decode_chunk: usize) -> Worker<Echo> {
        let opts = StageOpts {
            decode_chunk,
            min_output_unit: 1,
            scratch_capacity: 8,
            ..StageOpts::default()
        };
        let mut worker = Worker::new(
            &opts,
            Echo { resets: 0 },
            CancelToken::default(),
            Arc::new(StageStats::default()),
        );
        worker.allocate().unwrap();
        worker
    }

    fn window(seq: u64, samples: Vec<i16>, capacity: usize) -> InputWindow {
        InputWindow {
            seq,
            samples,
            capacity,
            recycled: Vec::new(),
        }
    }

    #[test]
    fn excess_output_stays_buffered_for_the_next_cycle() {
        let mut w = worker(4);

        let burst = w.cycle(window(0, (1..=10).collect(), 6));
        assert_eq!(burst.samples, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(burst.status, BurstStatus::Complete);
        assert_eq!(w.buffered(), 4);

        let burst = w.cycle(window(1, Vec::new(), 6));
        assert_eq!(burst.samples, vec![7, 8, 9, 10]);
        assert_eq!(w.buffered(), 0);
    }

    #[test]
    fn failing_chunk_is_dropped_and_context_reset() {
        let mut w = worker(3);

        let burst = w.cycle(window(0, vec![1, 2, 3, 4, i16::MIN, 6, 7, 8, 9], 16));
        // The chunk [4, MIN, 6] is discarded as a whole.
        assert_eq!(burst.samples, vec![1, 2, 3, 7, 8, 9]);
        assert_eq!(burst.status, BurstStatus::Recovered { decode_errors: 1 });
        assert_eq!(w.decoder.resets, 1);
        assert_eq!(w.stats.snapshot().decode_errors, 1);

        let burst = w.cycle(window(1, vec![10, 11], 16));
        assert_eq!(burst.samples, vec![10, 11]);
        assert_eq!(burst.status, BurstStatus::Complete);
    }

    #[test]
    fn spent_input_comes_back_empty_with_its_allocation() {
        let mut w = worker(4);
        let mut input = Vec::with_capacity(64);
        input.extend_from_slice(&[1, 2, 3]);

        let burst = w.cycle(window(3, input, 3));
        assert_eq!(burst.seq, 3);
        assert!(burst.spent.is_empty());
        assert!(burst.spent.capacity() >= 64);
    }

    #[test]
    fn cancellation_interrupts_between_chunks() {
        let mut w = worker(2);
        w.cancel.cancel();
        let burst = w.cycle(window(0, vec![1, 2, 3, 4], 8));
        assert_eq!(burst.status, BurstStatus::Interrupted);
        assert!(burst.samples.is_empty());
    }

    #[test]
    fn scratch_growth_past_capacity_is_tracked() {
        let mut w = worker(64);
        let _ = w.cycle(window(0, (0..20).collect(), 0));
        assert_eq!(w.buffered(), 20);
        assert!(w.over_capacity);
        assert_eq!(w.stats.snapshot().scratch_high_water, 20);

        let _ = w.cycle(window(1, Vec::new(), 20));
        assert!(!w.over_capacity);
    }
}
