//! Running a selection on a background thread.

use super::config::SelectionRequest;
use super::runner::Selector;
use super::types::SelectionResult;
use crate::error::{Result, SelectionError};
use crate::oracle::Oracle;
use crate::pool::CandidatePool;
use crate::quota::QuotaTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Handle to a selection running on its own thread.
#[derive(Debug)]
pub struct SelectionHandle {
    cancel: Arc<AtomicBool>,
    receiver: Receiver<Result<SelectionResult>>,
    thread: Option<JoinHandle<()>>,
}

impl SelectionHandle {
    /// Asks the run to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// The result, if the run has finished.
    pub fn try_result(&self) -> Option<Result<SelectionResult>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(terminated())),
        }
    }

    /// Blocks until the run finishes.
    pub fn wait(mut self) -> Result<SelectionResult> {
        let result = self.receiver.recv().unwrap_or_else(|_| Err(terminated()));
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }
}

fn terminated() -> SelectionError {
    SelectionError::Solver("selection thread terminated without a result".into())
}

/// Starts `selector.run_with_cancel` on a new thread.
///
/// The pool and quotas are shared read-only; the returned handle can cancel
/// the run and collect its result.
pub fn spawn_selection<O: Oracle + 'static>(
    selector: Arc<Selector<O>>,
    pool: Arc<CandidatePool>,
    quotas: Arc<QuotaTable>,
    request: SelectionRequest,
) -> SelectionHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = mpsc::channel();
    let flag = Arc::clone(&cancel);
    let thread = thread::spawn(move || {
        let result = selector.run_with_cancel(&pool, &quotas, &request, Some(flag));
        if sender.send(result).is_err() {
            debug!("selection handle dropped before the result arrived");
        }
    });
    SelectionHandle {
        cancel,
        receiver,
        thread: Some(thread),
    }
}
