//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::errors::ControlError;
use crate::remote::ssh::OpenSshTransport;
use crate::remote::Orchestrator;
use crate::runner::ProcessRunner;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the control server until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControlError> {
    info!("Initializing control server...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);

    let server_handle = init_socket_server(&options, shutdown_tx.subscribe()).await?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown(server_handle, options.lifecycle.max_shutdown_delay).await
}

/// Assemble the shared state the HTTP handlers run against
pub fn build_state(options: &AppOptions) -> Arc<ServerState> {
    let runner = Arc::new(ProcessRunner::new(options.runner.clone()));
    let transport = Arc::new(OpenSshTransport::new(runner.clone(), options.ssh.clone()));
    let orchestrator = Arc::new(Orchestrator::new(transport, options.layout.clone()));

    info!(
        max_parallel = runner.gate().capacity(),
        project_root = %options.layout.root().display(),
        "Process runner ready"
    );

    Arc::new(ServerState::new(runner, orchestrator))
}

async fn init_socket_server(
    options: &AppOptions,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<JoinHandle<Result<(), ControlError>>, ControlError> {
    info!("Initializing HTTP server...");

    let state = build_state(options);
    serve(&options.server, state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await
}

async fn shutdown(
    server_handle: JoinHandle<Result<(), ControlError>>,
    max_delay: Duration,
) -> Result<(), ControlError> {
    match tokio::time::timeout(max_delay, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("HTTP server stopped");
            Ok(())
        }
        Ok(Ok(Err(e))) => {
            error!("HTTP server exited with error: {}", e);
            Err(e)
        }
        Ok(Err(e)) => Err(ControlError::ShutdownError(format!(
            "HTTP server task failed: {}",
            e
        ))),
        Err(_) => {
            warn!(
                "HTTP server did not stop within {:?}, abandoning in-flight requests",
                max_delay
            );
            Err(ControlError::ShutdownError(
                "Timed out waiting for HTTP server".to_string(),
            ))
        }
    }
}
