//! Graceful Shutdown Manager
//!
//! Background tasks take child tokens from one controller and hold a
//! [`TaskGuard`] while they run, so shutdown waits for a reload pass or
//! sweep in progress before the process exits.
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! let guard = shutdown.register_task();
//! let token = shutdown.token();
//! tokio::spawn(async move {
//!     poller.run(token).await;
//!     drop(guard);
//! });
//! shutdown_signal_with_controller(shutdown.clone()).await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default drain timeout in seconds
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Tokens cancelled, waiting for in-flight work
    Draining,
    /// Drain timed out
    Terminating,
    /// Shutdown complete
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Shutdown controller for coordinating graceful shutdown
#[derive(Debug)]
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase: AtomicU8,
    shutdown_initiated: AtomicBool,
    active_tasks: AtomicU32,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a new shutdown controller with default timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }

    /// Create a new shutdown controller with custom drain timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase: AtomicU8::new(ShutdownPhase::Running as u8),
            shutdown_initiated: AtomicBool::new(false),
            active_tasks: AtomicU32::new(0),
            timeout,
        })
    }

    /// Get a cancellation token for a component
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Get current shutdown phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Draining,
            2 => ShutdownPhase::Terminating,
            _ => ShutdownPhase::Terminated,
        }
    }

    /// Register an in-flight task
    pub fn register_task(self: &Arc<Self>) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: Arc::clone(self),
        }
    }

    /// Get the count of active tasks
    #[must_use]
    pub fn active_task_count(&self) -> u32 {
        self.active_tasks.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Cancel every token, then wait for active tasks (bounded by the timeout)
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        info!("Initiating graceful shutdown...");
        self.set_phase(ShutdownPhase::Draining);
        self.cancel_token.cancel();

        let drain_start = tokio::time::Instant::now();
        loop {
            let active = self.active_task_count();
            if active == 0 {
                info!("All tasks completed gracefully");
                break;
            }
            if drain_start.elapsed() >= self.timeout {
                warn!(
                    active_tasks = active,
                    timeout_secs = self.timeout.as_secs(),
                    "Shutdown timeout exceeded, force terminating"
                );
                self.set_phase(ShutdownPhase::Terminating);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.set_phase(ShutdownPhase::Terminated);
    }
}

/// Guard for an in-flight task; decrements the active count when dropped
#[derive(Debug)]
pub struct TaskGuard {
    controller: Arc<ShutdownController>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Wait for a shutdown signal, then run the controller's shutdown
pub async fn shutdown_signal_with_controller(controller: Arc<ShutdownController>) {
    wait_for_shutdown_signal().await;
    controller.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_tokens() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert_eq!(controller.phase(), ShutdownPhase::Running);

        controller.shutdown().await;
        assert!(token.is_cancelled());
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_task_guard_counts() {
        let controller = ShutdownController::new();
        let guard = controller.register_task();
        assert_eq!(controller.active_task_count(), 1);
        drop(guard);
        assert_eq!(controller.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let controller = ShutdownController::with_timeout(Duration::from_secs(5));
        let guard = controller.register_task();

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.phase(), ShutdownPhase::Draining);

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_shutdown_timeout() {
        let controller = ShutdownController::with_timeout(Duration::from_millis(10));
        let _guard = controller.register_task();
        controller.shutdown().await;
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }
}
