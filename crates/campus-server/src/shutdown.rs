//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default time allowed for sessions to close before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the open-session count is re-checked while draining.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Coordinates shutdown of the listener and every live session.
///
/// Sessions select on [`Self::token`] and close with 1001 once it fires.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait for `handles` to finish and for
    /// `open_sessions()` to reach zero.
    ///
    /// Returns `false` if `timeout` elapsed first; the caller exits anyway.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        open_sessions: impl Fn() -> usize,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            sessions = open_sessions(),
            timeout_secs = timeout.as_secs(),
            "draining"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            while open_sessions() > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                sessions = open_sessions(),
                "shutdown timed out after {timeout:?}, some sessions may still be open"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
