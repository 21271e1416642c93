//! Background task startup functions
//!
//! Both tasks stop when the shutdown controller's token is cancelled, and
//! hold a task guard until then so shutdown drains them.

use super::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use volcano_core::{ReloadSupervisor, ShutdownController, VolcanoEngine};

/// Start polling the definition source
pub fn start_reload_task(
    config: &AppConfig,
    supervisor: &Arc<ReloadSupervisor>,
    shutdown_controller: &Arc<ShutdownController>,
) {
    if !config.reload.enabled {
        info!("Definition reload disabled by configuration");
        return;
    }

    let interval = Duration::from_secs(config.reload.interval_secs.max(1));
    let supervisor = supervisor.clone();
    let token = shutdown_controller.token();
    let guard = shutdown_controller.register_task();
    tokio::spawn(async move {
        supervisor.run(interval, token).await;
        drop(guard);
    });
}

/// Start evicting expired sessions and closed workflow handles
pub fn start_session_sweep(
    config: &AppConfig,
    engine: &Arc<VolcanoEngine>,
    shutdown_controller: &Arc<ShutdownController>,
) {
    let interval = Duration::from_secs(config.reload.session_sweep_secs.max(1));
    let engine = engine.clone();
    let token = shutdown_controller.token();
    let guard = shutdown_controller.register_task();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = engine.sweep_sessions();
                    let handles = engine.durable().sweep();
                    if removed > 0 || handles > 0 {
                        debug!(sessions = removed, handles, "Housekeeping sweep finished");
                    }
                }
            }
        }
        debug!("Session sweep stopped");
        drop(guard);
    });

    info!(interval_secs = interval.as_secs(), "Session sweep started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_state;
    use volcano_core::ShutdownPhase;

    #[tokio::test]
    async fn test_shutdown_drains_background_tasks() {
        let config = AppConfig::default();
        let state = build_state(&config).await.unwrap();
        let controller = ShutdownController::with_timeout(Duration::from_secs(5));

        start_reload_task(&config, &state.supervisor, &controller);
        start_session_sweep(&config, &state.engine, &controller);
        assert_eq!(controller.active_task_count(), 2);

        controller.shutdown().await;
        assert_eq!(controller.active_task_count(), 0);
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_disabled_reload_registers_nothing() {
        let mut config = AppConfig::default();
        config.reload.enabled = false;
        let state = build_state(&config).await.unwrap();
        let controller = ShutdownController::new();

        start_reload_task(&config, &state.supervisor, &controller);
        assert_eq!(controller.active_task_count(), 0);
    }
}
