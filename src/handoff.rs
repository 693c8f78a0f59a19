//! Exchange state shared by the stage adapter and its decoder worker.
//!
//! Ownership moves through two single-slot channels instead of shared pointers:
//! - the adapter publishes an [`InputWindow`] (an owned copy of the scheduler's input),
//! - the worker answers with exactly one [`OutputBurst`] for that window.
//!
//! A channel message *is* the "new data" signal: one message per published window.
//! The startup gate, the exit report and the cancellation token are separate primitives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use crate::error::{Error, Result};

/// One published input window.
#[derive(Debug)]
pub(crate) struct InputWindow {
    pub(crate) seq: u64,
    pub(crate) samples: Vec<i16>,
    /// Most decoded samples the worker may return for this window.
    pub(crate) capacity: usize,
    /// Empty allocation the worker may fill with its reply.
    pub(crate) recycled: Vec<i16>,
}

/// The worker's reply to one [`InputWindow`].
#[derive(Debug)]
pub(crate) struct OutputBurst {
    pub(crate) seq: u64,
    pub(crate) samples: Vec<i16>,
    /// The window's input allocation, emptied and handed back for reuse.
    pub(crate) spent: Vec<i16>,
    pub(crate) status: BurstStatus,
}

/// How a decode cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BurstStatus {
    Complete,
    /// The decoder failed at least once and its context was reset.
    Recovered { decode_errors: u32 },
    /// Cancellation was observed before the window was fully decoded.
    Interrupted,
}

/// Cooperative shutdown flag checked by the worker between decode chunks.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build a connected pair of handoff endpoints.
pub(crate) fn channel() -> (AdapterEnd, WorkerEnd) {
    let (window_tx, window_rx) = mpsc::sync_channel(1);
    let (burst_tx, burst_rx) = mpsc::sync_channel(1);
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let (exited_tx, exited_rx) = mpsc::sync_channel(1);

    (
        AdapterEnd {
            windows: Some(window_tx),
            bursts: burst_rx,
            ready: ready_rx,
            exited: exited_rx,
        },
        WorkerEnd {
            windows: window_rx,
            bursts: burst_tx,
            ready: Some(ready_tx),
            exited: Some(exited_tx),
        },
    )
}

/// Adapter (scheduler thread) side of the exchange.
#[derive(Debug)]
pub(crate) struct AdapterEnd {
    windows: Option<SyncSender<InputWindow>>,
    bursts: Receiver<OutputBurst>,
    ready: Receiver<Result<()>>,
    exited: Receiver<()>,
}

impl AdapterEnd {
    /// Wait for the worker's startup report.
    pub(crate) fn await_ready(&self, timeout: Duration) -> Result<()> {
        match self.ready.recv_timeout(timeout) {
            Ok(report) => report,
            Err(RecvTimeoutError::Timeout) => Err(Error::StartupTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerGone),
        }
    }

    /// Hand a window to the worker. The slot must be empty.
    pub(crate) fn publish(&self, window: InputWindow) -> Result<()> {
        let tx = self.windows.as_ref().ok_or(Error::WorkerGone)?;
        match tx.try_send(window) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(window)) => Err(Error::protocol(format!(
                "window {} published while the previous window was still queued",
                window.seq
            ))),
            Err(TrySendError::Disconnected(_)) => Err(Error::WorkerGone),
        }
    }

    /// Wait up to `timeout` for the next burst. `Ok(None)` means the worker is still busy.
    pub(crate) fn await_burst(&self, timeout: Duration) -> Result<Option<OutputBurst>> {
        match self.bursts.recv_timeout(timeout) {
            Ok(burst) => Ok(Some(burst)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerGone),
        }
    }

    /// Wait up to `timeout` for the worker to release its state and return.
    ///
    /// A worker that unwinds drops its end without reporting, which also counts as exited.
    pub(crate) fn await_exit(&self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Drop the window sender so a worker blocked on input wakes up and exits.
    pub(crate) fn disconnect(&mut self) -> bool {
        self.windows.take().is_some()
    }
}

/// Worker thread side of the exchange.
#[derive(Debug)]
pub(crate) struct WorkerEnd {
    windows: Receiver<InputWindow>,
    bursts: SyncSender<OutputBurst>,
    ready: Option<SyncSender<Result<()>>>,
    exited: Option<SyncSender<()>>,
}

impl WorkerEnd {
    /// Report the startup outcome. Only the first report is delivered.
    pub(crate) fn report_ready(&mut self, report: Result<()>) {
        if let Some(tx) = self.ready.take() {
            // The adapter may already have given up waiting; nothing to do then.
            let _ = tx.try_send(report);
        }
    }

    /// Tell the adapter the worker is done with its decoder.
    pub(crate) fn report_exited(&mut self) {
        if let Some(tx) = self.exited.take() {
            let _ = tx.try_send(());
        }
    }

    /// Block until a window arrives. `None` once the adapter has disconnected.
    pub(crate) fn next_window(&self) -> Option<InputWindow> {
        self.windows.recv().ok()
    }

    /// Deliver a burst. Returns `false` if the adapter is gone.
    pub(crate) fn deliver(&self, burst: OutputBurst) -> bool {
        self.bursts.send(burst).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(seq: u64) -> InputWindow {
        InputWindow {
            seq,
            samples: vec![1, 2, 3],
            capacity: 3,
            recycled: Vec::new(),
        }
    }

    #[test]
    fn second_publish_into_occupied_slot_is_a_protocol_error() {
        let (adapter, _worker) = channel();
        adapter.publish(window(0)).unwrap();
        let err = adapter.publish(window(1)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn window_and_burst_travel_in_order() {
        let (adapter, worker) = channel();
        adapter.publish(window(7)).unwrap();

        let received = worker.next_window().unwrap();
        assert_eq!(received.seq, 7);
        assert_eq!(received.samples, vec![1, 2, 3]);

        assert!(worker.deliver(OutputBurst {
            seq: received.seq,
            samples: vec![9],
            spent: Vec::new(),
            status: BurstStatus::Complete,
        }));

        let burst = adapter
            .await_burst(Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(burst.seq, 7);
        assert_eq!(burst.samples, vec![9]);
    }

    #[test]
    fn await_burst_times_out_without_error() {
        let (adapter, _worker) = channel();
        let res = adapter.await_burst(Duration::from_millis(5)).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn disconnect_wakes_a_waiting_worker() {
        let (mut adapter, worker) = channel();
        let handle = std::thread::spawn(move || worker.next_window().is_none());
        assert!(adapter.disconnect());
        assert!(!adapter.disconnect());
        assert!(handle.join().unwrap());
    }

    #[test]
    fn publish_after_disconnect_reports_worker_gone() {
        let (mut adapter, _worker) = channel();
        adapter.disconnect();
        assert!(matches!(adapter.publish(window(0)), Err(Error::WorkerGone)));
    }

    #[test]
    fn only_the_first_ready_report_is_delivered() {
        let (adapter, mut worker) = channel();
        worker.report_ready(Ok(()));
        worker.report_ready(Err(Error::WorkerGone));
        adapter.await_ready(Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn missing_ready_report_times_out() {
        let (adapter, _worker) = channel();
        let err = adapter.await_ready(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, Error::StartupTimeout(_)));
    }

    #[test]
    fn exit_report_is_seen_by_the_adapter() {
        let (adapter, mut worker) = channel();
        assert!(!adapter.await_exit(Duration::from_millis(5)));
        worker.report_exited();
        assert!(adapter.await_exit(Duration::from_millis(50)));
    }

    #[test]
    fn dropped_worker_end_counts_as_exited() {
        let (adapter, worker) = channel();
        let handle = std::thread::spawn(move || drop(worker));
        assert!(adapter.await_exit(Duration::from_secs(1)));
        handle.join().unwrap();
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::default();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
