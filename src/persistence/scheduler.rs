//! Trailing-edge debounce for high-frequency playback-state saves.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::AppResult;

/// A timer that has not fired yet.
#[derive(Debug)]
struct Armed {
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    armed: Option<Armed>,
}

/// Owns at most one armed write. Scheduling replaces it; dropping the
/// scheduler cancels it.
///
/// Only the timer can be cancelled. Once it fires, the timer disarms itself
/// and the write runs to completion.
#[derive(Debug)]
pub struct SaveScheduler {
    delay: Duration,
    state: Arc<Mutex<TimerState>>,
}

impl SaveScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    /// Cancel any armed write and arm a new one that runs `write` once the
    /// delay elapses with no further calls.
    ///
    /// A failing write is logged and otherwise ignored.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, write: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        let delay = self.delay;
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;

        // The new timer cannot disarm itself before it is stored: it needs this lock.
        let shared = self.state.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = shared.lock();
                let current = state
                    .armed
                    .as_ref()
                    .is_some_and(|armed| armed.generation == generation);
                if !current {
                    return;
                }
                state.armed = None;
            }
            if let Err(e) = write().await {
                tracing::warn!(error = %e, "Debounced save failed");
            }
        });

        if let Some(previous) = state.armed.replace(Armed { generation, timer }) {
            previous.timer.abort();
        }
    }

    /// Drop the armed write without running it. Returns whether one was armed.
    ///
    /// A write whose timer already fired is left to finish.
    pub fn cancel(&self) -> bool {
        match self.state.lock().armed.take() {
            Some(armed) => {
                armed.timer.abort();
                tracing::debug!("Cancelled pending save");
                true
            }
            None => false,
        }
    }

    /// Whether a write is armed and its timer has not fired.
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.state.lock().armed.is_some()
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        if let Some(armed) = self.state.lock().armed.take() {
            armed.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn recorder() -> Arc<Mutex<Vec<u32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn schedule_value(scheduler: &SaveScheduler, writes: &Arc<Mutex<Vec<u32>>>, value: u32) {
        let writes = writes.clone();
        scheduler.schedule(move || async move {
            writes.lock().push(value);
            Ok(())
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_calls_collapse_to_last() {
        let scheduler = SaveScheduler::new(Duration::from_millis(1000));
        let writes = recorder();

        for value in 1..=5 {
            schedule_value(&scheduler, &writes, value);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(*writes.lock(), vec![5]);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_written_before_quiet_period() {
        let scheduler = SaveScheduler::new(Duration::from_millis(1000));
        let writes = recorder();

        schedule_value(&scheduler, &writes, 1);
        tokio::time::sleep(Duration::from_millis(900)).await;
        schedule_value(&scheduler, &writes, 2);
        tokio::time::sleep(Duration::from_millis(900)).await;

        assert!(writes.lock().is_empty());
        assert!(scheduler.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*writes.lock(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_each_write_once() {
        let scheduler = SaveScheduler::new(Duration::from_millis(1000));
        let writes = recorder();

        schedule_value(&scheduler, &writes, 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        schedule_value(&scheduler, &writes, 2);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(*writes.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_write() {
        let scheduler = SaveScheduler::new(Duration::from_millis(1000));
        let writes = recorder();

        schedule_value(&scheduler, &writes, 1);
        scheduler.cancel();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert!(writes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_write() {
        let writes = recorder();
        {
            let scheduler = SaveScheduler::new(Duration::from_millis(1000));
            schedule_value(&scheduler, &writes, 1);
        }
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert!(writes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_does_not_poison_scheduler() {
        let scheduler = SaveScheduler::new(Duration::from_millis(10));
        let writes = recorder();

        scheduler.schedule(|| async { Err(AppError::Store("disabled".to_string())) });
        tokio::time::sleep(Duration::from_millis(50)).await;
        schedule_value(&scheduler, &writes, 7);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*writes.lock(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_lets_write_finish() {
        let scheduler = SaveScheduler::new(Duration::from_millis(10));
        let writes = recorder();

        let sink = writes.clone();
        scheduler.schedule(move || async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            sink.lock().push(1);
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!scheduler.is_pending());
        assert!(!scheduler.cancel());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*writes.lock(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_slow_store_write_keeps_cache_in_sync() {
        use crate::models::FolderRecord;
        use crate::store::backend::memory::MemoryBackend;
        use crate::store::{Collection, LocalStore};

        let backend = Arc::new(MemoryBackend::default());
        let store = Arc::new(LocalStore::new(backend.clone()));
        let _: Option<FolderRecord> = store.get(Collection::Folders, "folder_1").await.unwrap();
        backend.set_persist_delay(Duration::from_millis(300));

        let scheduler = SaveScheduler::new(Duration::from_millis(10));
        let writer = store.clone();
        scheduler.schedule(move || async move {
            writer
                .put(Collection::Folders, "folder_1", &FolderRecord::fresh("folder_1", "A", 1))
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(backend.persisted(Collection::Folders).contains_key("folder_1"));
        let cached: Option<FolderRecord> = store.get(Collection::Folders, "folder_1").await.unwrap();
        assert!(cached.is_some());
    }
}
