use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::AdminServer;
use crate::app::core::Application;
use crate::domain::control::ControlSignal;

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(
        &mut self,
        app: &Application,
        signals: Option<mpsc::UnboundedReceiver<ControlSignal>>,
    ) -> Result<()> {
        if let Some(signals) = signals {
            let control_loop_task = self.spawn_control_loop_task(app, signals);
            self.tasks.push(control_loop_task);
        }

        let admin_server_task = self.spawn_admin_server_task(app);
        self.tasks.push(admin_server_task);

        Ok(())
    }

    /// Waits for a shutdown signal or for any task to exit. Tasks keep running until
    /// [`Tasks::shutdown`].
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::signal;
                use tokio::signal::unix::SignalKind;
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
            }
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly");
            }
        }

        Ok(())
    }

    /// Cancels every task and waits for them for at most `timeout`.
    pub async fn shutdown(&mut self, timeout: Duration) {
        self.cancellation_token.cancel();
        tokio::time::timeout(timeout, async {
            for task in self.tasks.drain(..) {
                if task.is_finished() {
                    continue;
                }
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_control_loop_task(
        &self,
        app: &Application,
        signals: mpsc::UnboundedReceiver<ControlSignal>,
    ) -> JoinHandle<()> {
        let supervisor = app.services().supervisor.clone();
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tracing::info!("Starting control loop task");
            supervisor.run_control_loop(signals, token).await;
            tracing::info!("Control loop task completed");
        })
    }

    fn spawn_admin_server_task(&self, app: &Application) -> JoinHandle<()> {
        let args = app.args();
        let server = AdminServer::new(args.admin_listen_addr, args.shutdown_timeout());
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            if let Err(e) = server.run(token).await {
                tracing::error!("Admin server failed: {e:?}");
            } else {
                tracing::info!("Admin server task completed");
            }
        })
    }
}
