// Worker constants (No magic values)
use std::time::Duration;

/// Sleep duration while the readiness gate is closed (1s)
pub const GATE_CLOSED_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Sleep duration when the queue is empty (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Fixed backoff after a temporary failure (15s)
pub const TEMPORARY_FAILURE_BACKOFF: Duration = Duration::from_secs(15);

/// Sleep duration after a queue store error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default grace period for workers to finish their current iteration on shutdown (5s)
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default cache time-to-live (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bounded wait for an outstanding cache refresh (10s)
pub const DEFAULT_CACHE_REFRESH_WAIT: Duration = Duration::from_secs(10);
