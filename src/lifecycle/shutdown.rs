//! Ordered shutdown: server first, access log second.

use std::future::Future;
use std::io;

use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};

/// Broadcast stop signal for one group of background tasks.
///
/// The server and its limiter purge task share one; the access log drain
/// task gets its own so it can outlive the server.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Returns how many receivers were listening.
    pub fn trigger(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the process stopped other than on request.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("server failed: {0}")]
    Server(#[from] io::Error),
    #[error("background task aborted: {0}")]
    Task(#[from] JoinError),
}

/// Wait until `signal` fires or the server exits on its own, then stop the
/// server and drain the access log, in that order.
///
/// The log is drained even when the server failed, so entries queued before
/// the failure are still written. The server's error is reported after that.
pub async fn stop_in_order(
    signal: impl Future<Output = ()>,
    server: &Shutdown,
    mut server_task: JoinHandle<io::Result<()>>,
    access_log: &Shutdown,
    log_drain: JoinHandle<()>,
) -> Result<(), ShutdownError> {
    let served = tokio::select! {
        () = signal => {
            tracing::info!("Stopping server");
            server.trigger();
            server_task.await
        }
        result = &mut server_task => result,
    };

    access_log.trigger();
    log_drain.await?;
    served??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use crate::observability::access_log::{
        AccessDecision, AccessLogEntry, AccessLogger, MemorySink,
    };
    use chrono::Utc;

    fn entry() -> AccessLogEntry {
        AccessLogEntry {
            correlation_id: "last-words".to_string(),
            method: "GET".to_string(),
            path: "/users".to_string(),
            client_key: "10.0.0.1".to_string(),
            decision: AccessDecision::Admitted,
            status_code: 200,
            latency_ms: 1.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();

        assert_eq!(shutdown.trigger(), 2);
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn trigger_without_subscribers_is_harmless() {
        assert_eq!(Shutdown::new().trigger(), 0);
    }

    #[tokio::test]
    async fn server_failure_still_drains_access_log() {
        let server = Shutdown::new();
        let access_log = Shutdown::new();
        let sink = MemorySink::new();
        let (logger, log_drain) = AccessLogger::spawn(
            &LoggingConfig::default(),
            Box::new(sink.clone()),
            access_log.subscribe(),
        );
        logger.emit(entry());

        let server_task = tokio::spawn(async { Err(io::Error::other("listener lost")) });
        let result = stop_in_order(
            std::future::pending(),
            &server,
            server_task,
            &access_log,
            log_drain,
        )
        .await;

        assert!(matches!(result, Err(ShutdownError::Server(_))));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.entries()[0].correlation_id, "last-words");
    }

    #[tokio::test]
    async fn signal_stops_server_before_access_log() {
        let server = Shutdown::new();
        let access_log = Shutdown::new();
        let sink = MemorySink::new();
        let (logger, log_drain) = AccessLogger::spawn(
            &LoggingConfig::default(),
            Box::new(sink.clone()),
            access_log.subscribe(),
        );

        // Logs one entry while stopping, as an in-flight request would.
        let mut stop = server.subscribe();
        let server_task = tokio::spawn(async move {
            let _ = stop.recv().await;
            logger.emit(entry());
            Ok(())
        });

        stop_in_order(async {}, &server, server_task, &access_log, log_drain)
            .await
            .unwrap();

        assert_eq!(sink.len(), 1);
    }
}
