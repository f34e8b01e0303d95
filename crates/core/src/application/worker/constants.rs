// Worker constants (no magic values)
use std::time::Duration;

/// Default number of imports executed at once
pub const DEFAULT_CONCURRENCY: usize = 1;

/// How long a single dequeue waits for work before the loop re-checks for stop (1s)
pub const DEFAULT_DEQUEUE_WAIT: Duration = Duration::from_secs(1);

/// Sleep duration after a queue error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Broker reconnect backoff: first delay (500ms)
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Broker reconnect backoff: cap (30s)
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Next reconnect delay: doubles up to `RECONNECT_MAX_DELAY`
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(RECONNECT_MAX_DELAY)
}
