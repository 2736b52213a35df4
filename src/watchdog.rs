//! Flags long-running user actions without cancelling them.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

pub const DEFAULT_SLOW_AFTER: Duration = Duration::from_secs(15);

pub const SLOW_OPERATION_MESSAGE: &str =
    "This is taking longer than usual. We'll keep trying in the background.";

#[derive(Debug)]
pub struct Watched<T> {
    pub output: T,
    /// Set when the operation outlived the watchdog interval.
    pub slow: bool,
}

/// Await `operation`; once `after` elapses, log the slow-operation message
/// and call `on_slow`, then keep waiting for the result.
pub async fn watch<F, S>(label: &str, after: Duration, operation: F, on_slow: S) -> Watched<F::Output>
where
    F: Future,
    S: FnOnce(&str),
{
    tokio::pin!(operation);
    tokio::select! {
        output = &mut operation => return Watched { output, slow: false },
        _ = sleep(after) => {
            warn!(operation = label, after_secs = after.as_secs_f64(), "{SLOW_OPERATION_MESSAGE}");
            on_slow(SLOW_OPERATION_MESSAGE);
        }
    }
    Watched {
        output: operation.await,
        slow: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn slow_operation_is_flagged_but_completes() {
        let notified = AtomicBool::new(false);
        let watched = watch(
            "save",
            Duration::from_secs(1),
            async {
                sleep(Duration::from_secs(3)).await;
                42
            },
            |_| notified.store(true, Ordering::SeqCst),
        )
        .await;
        assert_eq!(watched.output, 42);
        assert!(watched.slow);
        assert!(notified.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operation_is_not_flagged() {
        let watched = watch("save", Duration::from_secs(5), async { "done" }, |_| {
            panic!("should not fire")
        })
        .await;
        assert_eq!(watched.output, "done");
        assert!(!watched.slow);
    }
}
