//! HTTP listener lifecycle: bind, serve, and bounded graceful shutdown.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn, error};

/// Which OS signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// In-flight requests finished within the grace period.
    Drained,
    /// The grace period elapsed and the server task was aborted.
    Forced,
}

/// A running server. Dropping the handle does not stop it; call [`ServerHandle::stop`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<io::Result<()>>,
    grace: Duration,
}

/// Bind `addr` and start serving `router` on a background task.
pub async fn start(addr: SocketAddr, router: Router, grace: Duration) -> io::Result<ServerHandle> {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            if e.kind() == io::ErrorKind::AddrInUse {
                error!(
                    "Port {} is already in use. Please ensure no other instance is running or use a different port.",
                    addr.port()
                );
            }
            return Err(e);
        }
    };
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let serve = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(async move {
        // A dropped sender also counts as a stop request
        let _ = shutdown_rx.await;
    });
    let task = tokio::spawn(async move { serve.await });

    info!(addr = %local_addr, "HTTP server listening");
    Ok(ServerHandle {
        local_addr,
        shutdown: Some(shutdown_tx),
        task,
        grace,
    })
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves only if the server stops on its own, e.g. an accept loop error.
    pub async fn finished(&mut self) -> io::Result<()> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    /// Stop accepting connections and wait up to the grace period for
    /// in-flight requests. After that the server task is aborted.
    pub async fn stop(mut self, signal: ShutdownSignal) -> io::Result<ShutdownOutcome> {
        info!(
            signal = ?signal,
            grace_ms = self.grace.as_millis() as u64,
            "Shutdown requested, draining connections"
        );
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(Ok(result)) => {
                result?;
                info!("HTTP server drained");
                Ok(ShutdownOutcome::Drained)
            }
            Ok(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
            Err(_) => {
                warn!(grace_ms = self.grace.as_millis() as u64, "Grace period elapsed, aborting open connections");
                self.task.abort();
                Ok(ShutdownOutcome::Forced)
            }
        }
    }
}

/// Stop the server, then run `cleanup` whether or not stopping succeeded.
pub async fn stop_then<F>(handle: ServerHandle, signal: ShutdownSignal, cleanup: F) -> io::Result<ShutdownOutcome>
where
    F: Future<Output = ()>,
{
    let stopped = handle.stop(signal).await;
    if let Err(e) = &stopped {
        error!(error = %e, "HTTP server failed while stopping");
    }
    cleanup.await;
    stopped
}

/// Wait for SIGTERM or SIGINT.
#[cfg(unix)]
pub async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let received = tokio::select! {
        _ = term.recv() => ShutdownSignal::Terminate,
        _ = interrupt.recv() => ShutdownSignal::Interrupt,
    };
    info!(signal = ?received, "Received shutdown signal");
    Ok(received)
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    info!(signal = ?ShutdownSignal::Interrupt, "Received shutdown signal");
    Ok(ShutdownSignal::Interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn slow_router(delay: Duration) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route(
                "/slow",
                get(move || async move {
                    tokio::time::sleep(delay).await;
                    "done"
                }),
            )
    }

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_idle_server_drains() {
        let handle = start(loopback(), slow_router(Duration::from_secs(5)), Duration::from_secs(2))
            .await
            .unwrap();
        let addr = handle.local_addr();

        let body = reqwest::get(format!("http://{}/ping", addr)).await.unwrap().text().await.unwrap();
        assert_eq!(body, "pong");

        let outcome = handle.stop(ShutdownSignal::Terminate).await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::Drained);

        let after = reqwest::Client::new()
            .get(format!("http://{}/ping", addr))
            .timeout(Duration::from_millis(500))
            .send()
            .await;
        assert!(after.is_err(), "listener should be closed after shutdown");
    }

    #[tokio::test]
    async fn test_stuck_request_forces_shutdown() {
        let handle = start(loopback(), slow_router(Duration::from_secs(30)), Duration::from_millis(200))
            .await
            .unwrap();
        let url = format!("http://{}/slow", handle.local_addr());
        let in_flight = tokio::spawn(async move { reqwest::get(url).await });
        tokio::time::sleep(Duration::from_millis(150)).await;

        let started = std::time::Instant::now();
        let outcome = handle.stop(ShutdownSignal::Interrupt).await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert!(started.elapsed() < Duration::from_secs(5));
        in_flight.abort();
    }

    #[tokio::test]
    async fn test_cleanup_runs_when_stop_fails() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (tx, _rx) = oneshot::channel();
        let handle = ServerHandle {
            local_addr: loopback(),
            shutdown: Some(tx),
            task: tokio::spawn(async { Err(io::Error::new(io::ErrorKind::Other, "accept loop failed")) }),
            grace: Duration::from_secs(1),
        };
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();

        let result = stop_then(handle, ShutdownSignal::Terminate, async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(result.is_err());
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_drain() {
        let handle = start(loopback(), slow_router(Duration::ZERO), Duration::from_secs(1)).await.unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        let outcome = stop_then(handle, ShutdownSignal::Interrupt, async move {
            let _ = done_tx.send(());
        })
        .await
        .unwrap();
        assert_eq!(outcome, ShutdownOutcome::Drained);
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = start(loopback(), slow_router(Duration::ZERO), Duration::from_secs(1)).await.unwrap();
        let err = start(first.local_addr(), slow_router(Duration::ZERO), Duration::from_secs(1))
            .await
            .err()
            .expect("second bind should fail");
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        first.stop(ShutdownSignal::Terminate).await.unwrap();
    }
}
