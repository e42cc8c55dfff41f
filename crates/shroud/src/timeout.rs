//! deadline that forces a run to finish

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// single-shot timer; aborted on cancel or drop
#[derive(Default)]
pub struct TimeoutGuard {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// run `on_expiry` once `deadline` elapses unless cancelled first.
    /// re-arming replaces the previous timer.
    pub fn arm<F>(&self, deadline: Duration, on_expiry: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(deadline).await;
            on_expiry();
        });
        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_deadline() {
        let fired = Arc::new(AtomicBool::new(false));
        let guard = TimeoutGuard::new();
        let flag = fired.clone();
        guard
            .arm(Duration::from_secs(60), move || flag.store(true, Ordering::SeqCst))
            .unwrap();
        assert!(guard.is_armed());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_expiry() {
        let fired = Arc::new(AtomicBool::new(false));
        let guard = TimeoutGuard::new();
        let flag = fired.clone();
        guard
            .arm(Duration::from_secs(1), move || flag.store(true, Ordering::SeqCst))
            .unwrap();
        guard.cancel();
        assert!(!guard.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_arm_outside_runtime() {
        let guard = TimeoutGuard::new();
        let result = guard.arm(Duration::from_secs(1), || {});
        assert!(matches!(result, Err(Error::Runtime(_))));
    }
}
