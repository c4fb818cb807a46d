//! Small helpers shared by the long-running loops.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Sleep for `duration` unless the token fires first.
///
/// Returns `false` when the sleep was cut short by cancellation, so callers
/// can break out of their loop at the next defined suspension point.
pub async fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Token that fires on Ctrl-C. The watcher task runs for the life of the
/// process.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            watcher.cancel();
        }
    });
    token
}
