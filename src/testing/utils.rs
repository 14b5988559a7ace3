use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F>(condition: F, timeout: Duration, check_interval: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(check_interval).await;
    }
    condition()
}
