//! Single-instance background task slot
//!
//! Both periodic loops share the same start/stop state machine: at most one
//! live, non-cancelled task per slot, cooperative cancellation through a
//! [`CancellationToken`], and restart when the previous task died.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn is_live(&self) -> bool {
        !self.handle.is_finished() && !self.token.is_cancelled()
    }
}

pub(crate) struct BackgroundTask {
    name: &'static str,
    slot: Mutex<Option<Running>>,
}

impl BackgroundTask {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Spawn `body` unless a live task already occupies the slot
    ///
    /// A task that was stopped but is still finishing its last iteration is
    /// aborted before the replacement is spawned. Must be called from within
    /// a Tokio runtime.
    pub(crate) fn start<F, Fut>(&self, body: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();

        if let Some(running) = slot.as_ref() {
            if running.is_live() {
                debug!("{} already running", self.name);
                return false;
            }
            if !running.handle.is_finished() {
                running.handle.abort();
            }
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(body(token.clone()));
        *slot = Some(Running { token, handle });

        info!("{} started", self.name);
        true
    }

    /// Request the task to stop at its next iteration boundary
    pub(crate) fn stop(&self) -> bool {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(running) if !running.token.is_cancelled() => {
                running.token.cancel();
                info!("{} stopped", self.name);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(Running::is_live)
    }

    /// Stop the task and wait for it to exit
    pub(crate) async fn join(&self) {
        let running = self.slot.lock().take();
        if let Some(running) = running {
            running.token.cancel();
            let _ = running.handle.await;
            debug!("{} exited", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_body(
        counter: Arc<AtomicUsize>,
    ) -> impl FnOnce(CancellationToken) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |token| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
            })
        }
    }

    #[tokio::test]
    async fn test_double_start_spawns_once() {
        let task = BackgroundTask::new("test loop");
        let spawned = Arc::new(AtomicUsize::new(0));

        assert!(task.start(counting_body(spawned.clone())));
        assert!(!task.start(counting_body(spawned.clone())));
        tokio::task::yield_now().await;

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(task.is_running());
    }

    #[tokio::test]
    async fn test_stop_then_restart() {
        let task = BackgroundTask::new("test loop");
        let spawned = Arc::new(AtomicUsize::new(0));

        task.start(counting_body(spawned.clone()));
        assert!(task.stop());
        assert!(!task.stop());
        assert!(!task.is_running());

        assert!(task.start(counting_body(spawned.clone())));
        tokio::task::yield_now().await;
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        assert!(task.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_crash() {
        let task = BackgroundTask::new("test loop");
        task.start(|_token| async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_running());

        assert!(task.start(|token| async move { token.cancelled().await }));
        assert!(task.is_running());
    }

    #[tokio::test]
    async fn test_join_waits_for_exit() {
        let task = BackgroundTask::new("test loop");
        task.start(|token| async move { token.cancelled().await });
        task.join().await;
        assert!(!task.is_running());
        assert!(!task.stop());
    }
}
