//! Lock-free counters shared by the adapter and the worker.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct StageStats {
    cycles: AtomicU64,
    idle_calls: AtomicU64,
    stalls: AtomicU64,
    decode_errors: AtomicU64,
    samples_consumed: AtomicU64,
    samples_produced: AtomicU64,
    scratch_high_water: AtomicUsize,
}

impl StageStats {
    pub(crate) fn record_cycle(&self, consumed: usize, produced: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.samples_consumed
            .fetch_add(consumed as u64, Ordering::Relaxed);
        self.samples_produced
            .fetch_add(produced as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_idle(&self) {
        self.idle_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn observe_scratch(&self, len: usize) {
        self.scratch_high_water.fetch_max(len, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            idle_calls: self.idle_calls.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            samples_consumed: self.samples_consumed.load(Ordering::Relaxed),
            samples_produced: self.samples_produced.load(Ordering::Relaxed),
            scratch_high_water: self.scratch_high_water.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a stage's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// `produce` calls that published a window (including stalled ones).
    pub cycles: u64,
    /// `produce` calls rejected for requesting less than one decode unit.
    pub idle_calls: u64,
    pub stalls: u64,
    pub decode_errors: u64,
    pub samples_consumed: u64,
    pub samples_produced: u64,
    /// Largest number of decoded samples waiting in the worker's scratch buffer.
    pub scratch_high_water: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = StageStats::default();
        stats.record_cycle(5760, 960);
        stats.record_cycle(0, 40);
        stats.record_idle();
        stats.record_stall();
        stats.record_decode_error();
        stats.observe_scratch(12);
        stats.observe_scratch(3);

        let snap = stats.snapshot();
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.samples_consumed, 5760);
        assert_eq!(snap.samples_produced, 1000);
        assert_eq!(snap.idle_calls, 1);
        assert_eq!(snap.stalls, 1);
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.scratch_high_water, 12);
    }
}
