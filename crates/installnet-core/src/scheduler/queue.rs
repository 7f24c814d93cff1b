//! In-memory FIFO job queue.
//!
//! All jobs are enqueued before the first worker starts, so an empty queue
//! means "drained": `claim` returns `None` and the worker exits. Nothing is
//! ever re-queued.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::domain::Job;

#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, job: Job) {
        self.pending.lock().await.push_back(job);
    }

    /// Hand the oldest job to the caller. The queue keeps no reference.
    pub async fn claim(&self) -> Option<Job> {
        let mut job = self.pending.lock().await.pop_front()?;
        job.mark_running();
        Some(job)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

impl From<Vec<Job>> for JobQueue {
    fn from(jobs: Vec<Job>) -> Self {
        Self {
            pending: Mutex::new(jobs.into()),
        }
    }
}
