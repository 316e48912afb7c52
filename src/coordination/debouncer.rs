use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Trailing-edge debounce: of several calls within `delay`, only the last runs
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` after the delay unless another call supersedes it first.
    /// The handle resolves to `true` when the task actually ran.
    pub fn schedule<F>(&self, task: F) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) != ticket {
                return false;
            }
            task.await;
            true
        })
    }

    /// Drop whatever is pending
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_rapid_calls_run_once() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            handles.push(debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let mut ran = Vec::new();
        for handle in handles {
            ran.push(handle.await.unwrap());
        }

        assert_eq!(ran, vec![false, false, true]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spaced_calls_each_run() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        assert!(debouncer.schedule(async {}).await.unwrap());
        assert!(debouncer.schedule(async {}).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_drops_pending() {
        let debouncer = Debouncer::new(Duration::from_millis(30));
        let handle = debouncer.schedule(async {});
        debouncer.cancel();
        assert!(!handle.await.unwrap());
    }
}
