use std::any::Any;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};

use super::ready_queue::{Dispatch, ReadyQueue};
use crate::domain::errors::TaskError;
use crate::domain::outcome::Outcome;
use crate::domain::task::TaskKey;

/// What workers report back to the scheduler.
#[derive(Debug)]
pub enum WorkerMessage {
    Started {
        key: TaskKey,
        worker: usize,
    },
    Finished {
        key: TaskKey,
        result: Result<Outcome, TaskError>,
    },
}

/// Worker group handle.
/// - `shutdown_and_join()` stops every worker and waits for it
/// - dropping the group without joining leaves workers parked on the queue
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    queue: Arc<ReadyQueue>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(
        n: usize,
        queue: Arc<ReadyQueue>,
        events: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let tx = events.clone();
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(
                async move {
                    worker_loop(worker_id, q, tx, &mut rx).await;
                }
                .instrument(info_span!("worker", id = worker_id)),
            );
            joins.push(join);
        }

        Self {
            shutdown_tx,
            queue,
            joins,
        }
    }

    /// Stop taking new dispatches. Running executions are not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.queue.close().await;
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<ReadyQueue>,
    events: mpsc::UnboundedSender<WorkerMessage>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let dispatch = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            dispatch = queue.lease() => dispatch,
        };

        let Some(dispatch) = dispatch else {
            // queue closed
            break;
        };

        let key = dispatch.key.clone();
        if events
            .send(WorkerMessage::Started {
                key: key.clone(),
                worker: worker_id,
            })
            .is_err()
        {
            break;
        }

        debug!(key = %key, "executing");
        let result = execute(dispatch).await;

        if events.send(WorkerMessage::Finished { key, result }).is_err() {
            break;
        }
    }
}

/// Run one node's work on its own task so a panic is contained and reported
/// as a task failure.
async fn execute(dispatch: Dispatch) -> Result<Outcome, TaskError> {
    let Dispatch {
        params, handler, ..
    } = dispatch;
    match tokio::spawn(async move { handler.handle_dyn(params).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(TaskError::new(format!(
            "task panicked: {}",
            panic_message(e.into_panic())
        ))),
        Err(e) => Err(TaskError::new(format!("task aborted: {e}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
