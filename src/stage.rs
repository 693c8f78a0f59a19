//! Scheduler-facing side of the decoder stage.
//!
//! A streaming scheduler calls [`DecoderStage::forecast`] to size its input and
//! [`DecoderStage::produce`] to turn an input window into output. `produce` is synchronous: it
//! publishes the window to the worker thread and blocks (boundedly) until the worker replies.
//!
//! Lifecycle:
//! - `new` validates options, spawns the worker and waits for its ready report
//! - `close` (or `Drop`) cancels the worker, disconnects it and joins it with a deadline

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::codec::FrameDecoder;
use crate::error::{Error, Result};
use crate::handoff::{self, AdapterEnd, BurstStatus, CancelToken, InputWindow, OutputBurst};
use crate::opts::StageOpts;
use crate::stats::{StageStats, StatsSnapshot};
use crate::worker;

/// Result of one [`DecoderStage::produce`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Work {
    /// Input samples the scheduler may now discard.
    pub consumed: usize,
    /// Output samples written to the front of the caller's output buffer.
    pub produced: usize,
    pub status: WorkStatus,
}

impl Work {
    fn idle() -> Self {
        Self {
            consumed: 0,
            produced: 0,
            status: WorkStatus::BelowDecodeUnit,
        }
    }
}

/// Why a [`Work`] looks the way it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Fewer outputs were requested than one decode unit; nothing was touched.
    BelowDecodeUnit,
    /// The worker decoded the whole window.
    Decoded,
    /// The worker decoded the window but had to reset its context along the way.
    /// Samples from the failing spans were dropped.
    Recovered { decode_errors: u32 },
    /// The worker did not reply within the produce timeout. Any consumed input is still owned by
    /// the worker and its output will be delivered by a later call.
    Stalled,
}

/// How [`DecoderStage::close`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker exited and was joined.
    Joined,
    /// The worker did not exit before the shutdown deadline and was left to finish on its own.
    Detached,
    AlreadyClosed,
}

/// A streaming stage backed by a dedicated decoder thread.
///
/// The stage is driven by exactly one caller at a time (`produce` takes `&mut self`). The decoder
/// and the scratch buffer live on the worker thread; the two sides only exchange owned buffers.
pub struct DecoderStage {
    opts: StageOpts,
    end: AdapterEnd,
    cancel: CancelToken,
    stats: Arc<StageStats>,
    worker: Option<JoinHandle<()>>,

    next_seq: u64,
    // Window whose burst has not been collected yet (set after a timed-out wait).
    in_flight: Option<u64>,
    // Samples from a late burst that did not fit in the call that collected it.
    carry: Vec<i16>,
    // Decode errors from late bursts, not yet reported through a `WorkStatus`.
    late_errors: u32,

    // Allocations handed back by the worker, reused for the next window.
    spare_input: Vec<i16>,
    spare_output: Vec<i16>,
}

impl DecoderStage {
    /// Spawn the decoder worker and wait until it is ready to accept windows.
    ///
    /// Fails if the options are invalid, if `decoder` reports a rate ratio that disagrees with
    /// `opts.rate_ratio`, or if the worker cannot be started within `startup_timeout_ms`.
    pub fn new<D>(opts: StageOpts, decoder: D) -> Result<Self>
    where
        D: FrameDecoder + 'static,
    {
        opts.validate()?;
        if let Some(ratio) = decoder.rate_ratio() {
            if ratio != opts.rate_ratio {
                return Err(Error::config(format!(
                    "decoder converts {ratio}:1 but rate_ratio is {}",
                    opts.rate_ratio
                )));
            }
        }

        let mode = &opts.decoder;
        info!(
            symbol_rate = mode.symbol_rate,
            samples_per_symbol = mode.samples_per_symbol,
            symbol_center = mode.symbol_center,
            "setting symbol rate to {} / second",
            mode.symbol_rate
        );
        info!(
            rf_mod = mode.modulation.rf_mod(),
            "enabling only {} modulation optimizations", mode.modulation
        );
        info!("decoding only {} frames", mode.frame_family);

        let (end, worker_end) = handoff::channel();
        let cancel = CancelToken::default();
        let stats = Arc::new(StageStats::default());
        let handle = worker::spawn(
            &opts,
            decoder,
            worker_end,
            cancel.clone(),
            Arc::clone(&stats),
        )?;

        let mut stage = Self {
            opts,
            end,
            cancel,
            stats,
            worker: Some(handle),
            next_seq: 0,
            in_flight: None,
            carry: Vec::new(),
            late_errors: 0,
            spare_input: Vec::new(),
            spare_output: Vec::new(),
        };

        if let Err(err) = stage.end.await_ready(stage.opts.startup_timeout()) {
            error!(error = %err, "decoder worker failed to start");
            stage.close();
            return Err(err);
        }

        debug!(
            rate_ratio = stage.opts.rate_ratio,
            min_output_unit = stage.opts.min_output_unit,
            "decoder stage started"
        );
        Ok(stage)
    }

    /// Input samples needed to produce `requested_output` samples.
    pub fn forecast(&self, requested_output: usize) -> usize {
        requested_output.saturating_mul(self.opts.rate_ratio)
    }

    /// Hand `input` to the worker and collect up to `requested_output` decoded samples into
    /// `output`.
    ///
    /// On success `consumed` is either `0` (a stall left an earlier window outstanding, so this
    /// input was not taken) or `input.len()`. `produced` never exceeds `requested_output` or
    /// `output.len()`.
    pub fn produce(
        &mut self,
        requested_output: usize,
        input: &[i16],
        output: &mut [i16],
    ) -> Result<Work> {
        if requested_output < self.opts.min_output_unit {
            self.stats.record_idle();
            return Ok(Work::idle());
        }
        if self.worker.is_none() {
            return Err(Error::WorkerGone);
        }

        let capacity = requested_output.min(output.len());
        let output = &mut output[..capacity];
        let timeout = self.opts.produce_timeout();

        // Never publish while an earlier window is still being decoded.
        if let Some(seq) = self.in_flight {
            match self.end.await_burst(timeout)? {
                Some(burst) => self.absorb_late(seq, burst)?,
                None => {
                    let produced = self.drain_carry(output);
                    self.stats.record_stall();
                    warn!(seq, "decoder worker is still busy with an earlier window");
                    return Ok(Work {
                        consumed: 0,
                        produced,
                        status: WorkStatus::Stalled,
                    });
                }
            }
        }

        let mut produced = self.drain_carry(output);

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let mut samples = std::mem::take(&mut self.spare_input);
        samples.clear();
        samples.extend_from_slice(input);
        let mut recycled = std::mem::take(&mut self.spare_output);
        recycled.clear();

        self.end.publish(InputWindow {
            seq,
            samples,
            capacity: capacity - produced,
            recycled,
        })?;
        self.in_flight = Some(seq);

        let mut status = match self.end.await_burst(timeout)? {
            Some(burst) => {
                self.in_flight = None;
                let (written, status) = self.accept(seq, burst, &mut output[produced..])?;
                produced += written;
                status
            }
            None => {
                self.stats.record_stall();
                warn!(
                    seq,
                    timeout_ms = self.opts.produce_timeout_ms,
                    "decoder worker did not finish the window in time"
                );
                WorkStatus::Stalled
            }
        };

        if status != WorkStatus::Stalled {
            status = fold_late_errors(status, std::mem::take(&mut self.late_errors));
        }

        let consumed = input.len();
        self.stats.record_cycle(consumed, produced);
        Ok(Work {
            consumed,
            produced,
            status,
        })
    }

    /// Stop the worker: cancel, disconnect, then join with a deadline.
    ///
    /// Idempotent. After `close`, `produce` returns [`Error::WorkerGone`].
    pub fn close(&mut self) -> ShutdownOutcome {
        let Some(handle) = self.worker.take() else {
            return ShutdownOutcome::AlreadyClosed;
        };

        self.cancel.cancel();
        self.end.disconnect();

        if !self.end.await_exit(self.opts.shutdown_timeout()) {
            // There is no safe way to kill a thread; it keeps its decoder until it returns.
            error!(
                timeout_ms = self.opts.shutdown_timeout_ms,
                "decoder worker did not exit in time, detaching it"
            );
            return ShutdownOutcome::Detached;
        }

        if handle.join().is_err() {
            warn!("decoder worker panicked");
        }
        debug!("decoder worker joined");
        ShutdownOutcome::Joined
    }

    /// Whether the stage still has a live worker to decode with.
    ///
    /// `false` once the stage is closed, including after [`ShutdownOutcome::Detached`] where the
    /// detached thread may still be inside its last decoder call.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn opts(&self) -> &StageOpts {
        &self.opts
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn accept(
        &mut self,
        seq: u64,
        burst: OutputBurst,
        output: &mut [i16],
    ) -> Result<(usize, WorkStatus)> {
        check_seq(seq, &burst)?;

        let n = burst.samples.len();
        if n > output.len() {
            return Err(Error::protocol(format!(
                "worker returned {n} samples for window {seq} with room for {}",
                output.len()
            )));
        }
        output[..n].copy_from_slice(&burst.samples);

        let status = burst.status;
        self.recycle(burst);
        match status {
            BurstStatus::Complete => Ok((n, WorkStatus::Decoded)),
            BurstStatus::Recovered { decode_errors } => {
                Ok((n, WorkStatus::Recovered { decode_errors }))
            }
            BurstStatus::Interrupted => Err(Error::WorkerGone),
        }
    }

    /// Collect the burst of a window that timed out in an earlier call.
    ///
    /// Its decode errors are held until the next non-stalled `Work` reports them.
    fn absorb_late(&mut self, seq: u64, burst: OutputBurst) -> Result<()> {
        check_seq(seq, &burst)?;
        self.in_flight = None;

        debug!(
            seq,
            late_samples = burst.samples.len(),
            "collected burst from a stalled window"
        );
        let status = burst.status;
        self.carry.extend_from_slice(&burst.samples);
        self.recycle(burst);
        match status {
            BurstStatus::Complete => Ok(()),
            BurstStatus::Recovered { decode_errors } => {
                self.late_errors = self.late_errors.saturating_add(decode_errors);
                Ok(())
            }
            BurstStatus::Interrupted => Err(Error::WorkerGone),
        }
    }

    fn drain_carry(&mut self, output: &mut [i16]) -> usize {
        let n = self.carry.len().min(output.len());
        output[..n].copy_from_slice(&self.carry[..n]);
        self.carry.drain(..n);
        n
    }

    fn recycle(&mut self, burst: OutputBurst) {
        self.spare_input = burst.spent;
        self.spare_output = burst.samples;
    }
}

impl Drop for DecoderStage {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Merge decode errors of late bursts into the status of the call that reports them.
fn fold_late_errors(status: WorkStatus, late_errors: u32) -> WorkStatus {
    if late_errors == 0 {
        return status;
    }
    match status {
        WorkStatus::Recovered { decode_errors } => WorkStatus::Recovered {
            decode_errors: decode_errors.saturating_add(late_errors),
        },
        WorkStatus::Decoded => WorkStatus::Recovered {
            decode_errors: late_errors,
        },
        other => other,
    }
}

fn check_seq(expected: u64, burst: &OutputBurst) -> Result<()> {
    if burst.seq != expected {
        return Err(Error::protocol(format!(
            "expected burst for window {expected}, got window {}",
            burst.seq
        )));
    }
    Ok(())
}
