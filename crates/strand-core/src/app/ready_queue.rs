//! Ready queue shared by the scheduler and the worker pool.
//!
//! The scheduler pushes nodes whose prerequisites are all done; workers
//! lease them one at a time. Holds no node state: the scheduler's graph is
//! the single source of truth.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::domain::task::TaskKey;
use crate::typed::DynHandler;

/// Everything a worker needs to execute one node.
pub struct Dispatch {
    pub key: TaskKey,
    pub params: Value,
    pub handler: Arc<dyn DynHandler>,
}

struct ReadyQueueState {
    ready: VecDeque<Dispatch>,
    closed: bool,
}

pub struct ReadyQueue {
    state: Mutex<ReadyQueueState>,
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReadyQueueState {
                ready: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, dispatch: Dispatch) {
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(dispatch);
        }
        // Notify outside the lock
        self.notify.notify_one();
    }

    /// Wait for the next dispatch. Returns None once the queue is closed.
    pub async fn lease(&self) -> Option<Dispatch> {
        loop {
            // Register interest before checking, so a push between the check
            // and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(dispatch) = state.ready.pop_front() {
                    return Some(dispatch);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take back everything not yet leased.
    pub async fn drain(&self) -> Vec<Dispatch> {
        let mut state = self.state.lock().await;
        state.ready.drain(..).collect()
    }

    /// Wake every waiting worker and make further leases return None.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
