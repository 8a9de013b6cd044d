use std::net::SocketAddr;
use std::time::Duration;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers::get_health;
use super::handlers::get_metrics;
use super::handlers::get_version;

/// Admin HTTP server exposing `/metrics`, `/health` and `/version`
pub struct AdminServer {
    listen_addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl AdminServer {
    pub fn new(listen_addr: SocketAddr, shutdown_timeout: Duration) -> Self {
        Self {
            listen_addr,
            shutdown_timeout,
        }
    }

    pub(crate) fn routes() -> impl Endpoint {
        Route::new()
            .at("/metrics", get(get_metrics))
            .at("/health", get(get_health))
            .at("/version", get(get_version))
            .with(Tracing)
    }

    /// Serves until `token` is cancelled, then drains connections for at most the
    /// shutdown timeout.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to bind or serve
    pub async fn run(self, token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting admin server on {}", self.listen_addr);

        let server = Server::new(TcpListener::bind(self.listen_addr));
        let result = server
            .run_with_graceful_shutdown(
                Self::routes(),
                async move { token.cancelled().await },
                Some(self.shutdown_timeout),
            )
            .await;

        match result {
            Ok(()) => {
                info!("Admin server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Admin server failed: {e}");
                Err(Report::new(ApiError::ServerError {
                    message: format!("Server failed: {e}"),
                }))
            }
        }
    }
}
