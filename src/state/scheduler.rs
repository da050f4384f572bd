//! Delayed per-room transitions.

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::debug;

/// Owns the pacing timers of every room so they can be cancelled together.
#[derive(Default)]
pub struct SessionScheduler {
    tasks: Arc<DashMap<String, Vec<AbortHandle>>>,
}

impl SessionScheduler {
    /// Scheduler with no pending work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` after `delay` on behalf of room `code`.
    ///
    /// A task unregisters itself once done; a room without pending work has no entry.
    pub fn schedule<F>(&self, code: &str, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = Arc::clone(&self.tasks);
        let key = code.to_owned();

        // The entry stays locked until the handle is stored, so the task always finds itself.
        let mut tasks = self.tasks.entry(code.to_owned()).or_default();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
            unregister(&registry, &key, tokio::task::id());
        });
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle.abort_handle());
    }

    /// Rooms that still have pending work.
    pub fn tracked_rooms(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every pending task of a room. Returns how many were still running.
    pub fn cancel(&self, code: &str) -> usize {
        let Some((_, tasks)) = self.tasks.remove(code) else {
            return 0;
        };
        let mut cancelled = 0;
        for task in tasks {
            if !task.is_finished() {
                task.abort();
                cancelled += 1;
            }
        }
        debug!(code = %code, cancelled, "cancelled scheduled room tasks");
        cancelled
    }

    /// Number of tasks of a room that have not completed yet.
    pub fn pending(&self, code: &str) -> usize {
        self.tasks
            .get(code)
            .map(|tasks| tasks.iter().filter(|task| !task.is_finished()).count())
            .unwrap_or(0)
    }
}

fn unregister(registry: &DashMap<String, Vec<AbortHandle>>, code: &str, id: tokio::task::Id) {
    if let Some(mut tasks) = registry.get_mut(code) {
        tasks.retain(|task| task.id() != id);
    }
    registry.remove_if(code, |_, tasks| tasks.is_empty());
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scheduled_work_runs_after_delay() {
        let scheduler = SessionScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        scheduler.schedule("123456", Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending("123456"), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending("123456"), 0);
        assert_eq!(scheduler.tracked_rooms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_rooms_leave_no_entry() {
        let scheduler = SessionScheduler::new();
        for code in ["111111", "222222", "111111"] {
            scheduler.schedule(code, Duration::from_millis(10), async {});
        }
        assert_eq!(scheduler.tracked_rooms(), 2);
        assert_eq!(scheduler.pending("111111"), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.tracked_rooms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_work_never_runs() {
        let scheduler = SessionScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        scheduler.schedule("654321", Duration::from_secs(3), async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(scheduler.cancel("654321"), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.cancel("654321"), 0);
    }
}
