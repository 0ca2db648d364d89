use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;

/// Owned background task that is aborted when the guard is dropped.
///
/// Local timers (answer countdowns, subscription loops) are held through this
/// guard so that leaving a lobby, or moving to the next question, releases them
/// on every exit path.
#[derive(Debug)]
pub struct TaskGuard {
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    /// Spawn `future` on the runtime and guard it.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(future)),
        }
    }

    /// Run `on_expiry` after `delay` unless the guard is dropped first.
    pub fn after<F>(delay: Duration, on_expiry: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expiry.await;
        })
    }

    /// Release the guard without aborting the task.
    ///
    /// Used by a task that tears down its own guard and must keep running to completion.
    pub fn detach(mut self) {
        self.handle.take();
    }

    /// Whether the guarded task already completed.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    #[tokio::test]
    async fn dropping_the_guard_cancels_the_timer() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let guard = TaskGuard::after(Duration::from_millis(30), async move {
            flag.store(true, Ordering::SeqCst);
        });

        drop(guard);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn timer_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let guard = TaskGuard::after(Duration::from_millis(30), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(guard.is_finished());
    }
}
