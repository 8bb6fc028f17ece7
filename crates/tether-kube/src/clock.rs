//! Time source used by polling loops
//!
//! Production code uses [`TokioClock`]. Tests use [`ManualClock`], whose
//! sleeps return immediately and advance its notion of "now".

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

type SleepHook = Box<dyn Fn(u32) + Send + Sync>;

/// Clock that only moves when slept on
pub struct ManualClock {
    base: Instant,
    state: Mutex<ManualState>,
    on_sleep: Option<SleepHook>,
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: u32,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(ManualState::default()),
            on_sleep: None,
        }
    }

    /// Run `hook` after every sleep with the number of sleeps so far
    pub fn on_sleep(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_sleep = Some(Box::new(hook));
        self
    }

    /// Number of completed sleeps
    pub fn sleeps(&self) -> u32 {
        self.state().sleeps
    }

    /// Total time slept
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.state().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let sleeps = {
            let mut state = self.state();
            state.elapsed += duration;
            state.sleeps += 1;
            state.sleeps
        };
        if let Some(hook) = &self.on_sleep {
            hook(sleeps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(1)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.now() - start, Duration::from_secs(3));
        assert_eq!(clock.sleeps(), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_manual_clock_hook() {
        let seen = Arc::new(AtomicU32::new(0));
        let hook_seen = seen.clone();
        let clock = ManualClock::new().on_sleep(move |n| hook_seen.store(n, Ordering::SeqCst));

        clock.sleep(Duration::from_secs(1)).await;
        clock.sleep(Duration::from_secs(1)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps() {
        let clock = TokioClock;
        let start = tokio::time::Instant::now();
        clock.sleep(Duration::from_secs(5)).await;
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(5));
    }
}
