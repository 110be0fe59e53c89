//! Bounded pool of parallel blocking workers.
//!
//! Jobs run on tokio's blocking thread pool; a semaphore bounds how many run
//! at once. Jobs can be queued ahead of capacity, they simply wait for a
//! permit. Results are returned as values, in submission order.
//!
//! The pool has no idle signal of its own. [`TaskPool::drain`] consumes the
//! pool, so it can only run after whoever feeds it (the directory walker) has
//! returned: discovery finishes first, then processing drains.
//!
//! ```text
//!  walker ──spawn──▶ [queued] ──permit──▶ worker 1..N ──▶ drain() ──▶ Vec<T>
//! ```

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

pub struct TaskPool<T> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<(u64, T)>>,
    finished: Vec<(u64, T)>,
    next_seq: u64,
    workers: usize,
}

impl<T: Send + 'static> TaskPool<T> {
    /// Pool running at most `workers` jobs at a time.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            finished: Vec::new(),
            next_seq: 0,
            workers,
        }
    }

    /// Pool sized to the available hardware parallelism unless overridden.
    pub fn sized(workers: Option<usize>) -> Self {
        let workers = workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        Self::new(workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs submitted so far.
    pub fn submitted(&self) -> u64 {
        self.next_seq
    }

    /// Queue a job. Must be called from within a tokio runtime.
    pub fn spawn<F>(&mut self, job: F)
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .context("task pool closed")?;
            let value = tokio::task::spawn_blocking(job)
                .await
                .map_err(|e| anyhow!("worker panicked: {}", e))??;
            Ok((seq, value))
        });
    }

    /// Collect jobs that already finished and fail on the first error, so a
    /// broken run stops while traversal is still going.
    pub fn check(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.try_join_next() {
            self.settle(joined)?;
        }
        Ok(())
    }

    /// Wait for every queued job. Returns values in submission order, or the
    /// first error; remaining jobs are aborted in that case.
    pub async fn drain(mut self) -> Result<Vec<T>> {
        debug!(
            submitted = self.next_seq,
            workers = self.workers,
            "draining task pool"
        );
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = self.settle(joined) {
                self.tasks.abort_all();
                return Err(e);
            }
        }
        let mut finished = std::mem::take(&mut self.finished);
        finished.sort_by_key(|(seq, _)| *seq);
        Ok(finished.into_iter().map(|(_, value)| value).collect())
    }

    fn settle(
        &mut self,
        joined: std::result::Result<Result<(u64, T)>, tokio::task::JoinError>,
    ) -> Result<()> {
        let result = joined.map_err(|e| anyhow!("task pool job failed to join: {}", e))?;
        self.finished.push(result?);
        Ok(())
    }
}
