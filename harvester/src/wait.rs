//! Bounded-wait primitive.
//!
//! All suspension points in the engine go through [`poll_until`], which makes
//! timeout and poll interval explicit instead of burying fixed sleeps between
//! checks. The probe decides success; the caller decides what a miss means.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Polls `probe` until it yields `Some`, returning `None` once `timeout` has
/// elapsed without a hit. The probe runs at least once even with a zero
/// timeout. Probe errors propagate immediately.
pub async fn poll_until<T, E, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(interval.min(deadline - now)).await;
    }
}
