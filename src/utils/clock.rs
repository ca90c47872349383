use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Provides wall-clock dates and monotonic instants to the tracker. Sessions measure their
/// duration with [Clock::instant] and stamp their start with [Clock::time], so tests can
/// substitute a clock driven by tokio's paused time.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Local>;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: tokio::time::Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: tokio::time::Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
