//! Readiness Polling
//!
//! Repeats a probe at a fixed interval until it reports ready or a deadline
//! passes. Time comes from tokio's clock, so tests run these loops on paused
//! virtual time.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default gap between probes
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often and for how long to probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Result of a finished poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    /// Deadline passed; carries the last observation, if any probe succeeded
    TimedOut(Option<T>),
}

impl Poll {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(POLL_INTERVAL, timeout)
    }

    /// Probe until `ready` accepts an observation or the timeout elapses.
    ///
    /// Probe errors count as "not ready yet": daemons that are still starting
    /// often make the status commands fail.
    pub async fn until<T, F, Fut, R>(&self, what: &str, mut probe: F, ready: R) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Fn(&T) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last = None;
        loop {
            sleep(self.interval).await;
            match probe().await {
                Ok(observed) if ready(&observed) => return PollOutcome::Ready(observed),
                Ok(observed) => last = Some(observed),
                Err(e) => debug!("{} probe failed: {}", what, e),
            }
            if Instant::now() >= deadline {
                debug!("Gave up waiting for {} after {:?}", what, self.timeout);
                return PollOutcome::TimedOut(last);
            }
        }
    }
}
