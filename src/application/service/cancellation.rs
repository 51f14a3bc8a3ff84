// src/application/service/cancellation.rs
// Cooperative stop flag shared between a session and its controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

/// Single cooperative cancellation signal. Cloning shares the flag, so it can
/// be set from any task or thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    flag: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking every `check` to look at the flag.
    /// Returns `false` if cancelled before the full duration elapsed.
    pub async fn sleep(&self, duration: Duration, check: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let check = check.max(Duration::from_millis(1));
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            time::sleep(check.min(deadline - now)).await;
        }
    }

    /// Resolves once the flag is set, polling every `check`.
    pub async fn cancelled(&self, check: Duration) {
        let check = check.max(Duration::from_millis(1));
        while !self.is_cancelled() {
            time::sleep(check).await;
        }
    }
}
