//! Single-slot submission worker.
//!
//! Submission runs execute one at a time on a dedicated task. At most one
//! further run may wait behind the active one; triggers beyond that are
//! dropped, since the waiting run already covers every pending event.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{RecorderCore, SubmissionReport};

/// Number of runs that may wait behind the active one.
pub(crate) const SUBMISSION_BACKLOG: usize = 1;

/// A request to run one submission cycle.
#[derive(Debug)]
pub(crate) struct SubmitRequest {
    /// Optional channel to report the run's outcome
    pub completion: Option<oneshot::Sender<SubmissionReport>>,
}

pub(crate) struct SubmissionWorker {
    tx: mpsc::Sender<SubmitRequest>,
    handle: JoinHandle<()>,
}

impl SubmissionWorker {
    /// Spawns the worker on `runtime`.
    pub fn spawn(core: Arc<RecorderCore>, runtime: &Handle) -> Self {
        let (tx, rx) = mpsc::channel(SUBMISSION_BACKLOG);
        let handle = runtime.spawn(run(core, rx));
        Self { tx, handle }
    }

    /// Queues a run unless one is already waiting.
    ///
    /// Returns a receiver for the run's report, or `None` if the trigger was
    /// coalesced into the waiting run.
    pub fn trigger(&self) -> Option<oneshot::Receiver<SubmissionReport>> {
        let (tx, rx) = oneshot::channel();
        match self.tx.try_send(SubmitRequest {
            completion: Some(tx),
        }) {
            Ok(()) => Some(rx),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Submission already queued, dropping trigger");
                None
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Submission worker has stopped, dropping trigger");
                None
            }
        }
    }

    /// Closes the queue and waits for queued runs to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Submission worker terminated abnormally");
        }
    }
}

async fn run(core: Arc<RecorderCore>, mut rx: mpsc::Receiver<SubmitRequest>) {
    while let Some(request) = rx.recv().await {
        let report = core.run_submission().await;
        if let Some(completion) = request.completion {
            let _ = completion.send(report);
        }
    }
}
