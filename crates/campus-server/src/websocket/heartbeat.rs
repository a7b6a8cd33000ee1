//! Liveness monitoring driven by client activity.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stayed silent for the whole timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Number of consecutive silent ticks that make up `timeout`, at least one.
fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch a connection's alive flag.
///
/// The session marks the connection alive on every inbound frame (pongs
/// included). At each `interval` tick the flag is checked and cleared; after
/// `timeout / interval` consecutive silent ticks the client is considered
/// gone.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // The first tick completes immediately.
    let _ = check_interval.tick().await;
    let max_missed = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::ConnectionId;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(ClientConnection::new(ConnectionId::from("hb_conn"), tx, 0))
    }

    #[test]
    fn max_missed_from_durations() {
        assert_eq!(max_missed(Duration::from_secs(30), Duration::from_secs(90)), 3);
        assert_eq!(max_missed(Duration::from_millis(100), Duration::from_millis(250)), 2);
        assert_eq!(max_missed(Duration::from_secs(10), Duration::from_secs(5)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let conn = make_connection();
        conn.is_alive.store(false, Ordering::Relaxed);

        let result = run_heartbeat(
            conn,
            Duration::from_secs(30),
            Duration::from_secs(90),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_takes_the_full_window() {
        let conn = make_connection();
        let start = time::Instant::now();

        let result = run_heartbeat(
            conn,
            Duration::from_secs(10),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
        // one tick consumes the initial alive flag, then three silent ticks
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn active_client_stays_alive() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(10),
            Duration::from_secs(20),
            cancel.clone(),
        ));

        for _ in 0..10 {
            time::sleep(Duration::from_secs(5)).await;
            conn.mark_alive();
        }
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test]
    async fn cancel_stops_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(
            make_connection(),
            Duration::from_secs(60),
            Duration::from_secs(180),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }
}
