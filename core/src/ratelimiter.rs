use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

/// Paces outbound calls to at most `per_sec` per second without bursting.
///
/// Callers wait their turn on a shared interval; ticks missed while idle are
/// not replayed. Must be created inside a tokio runtime.
pub struct RateLimiter {
    ticks: Arc<Mutex<Interval>>,
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self { RateLimiter { ticks: self.ticks.clone() } }
}

impl RateLimiter {
    pub fn new(per_sec: u32) -> Self {
        let period = Duration::from_millis(1000 / u64::from(per_sec.max(1)));
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        RateLimiter { ticks: Arc::new(Mutex::new(ticks)) }
    }

    /// Wait until the next call is allowed.
    pub async fn acquire(&self) {
        self.ticks.lock().await.tick().await;
    }
}
