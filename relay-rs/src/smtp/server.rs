use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::smtp::session::{SessionLimits, SmtpSession};
use crate::smtp::transaction::MessageStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Accepts SMTP connections and runs one session task per connection
pub struct RelayServer {
    listener: TcpListener,
    hostname: String,
    limits: SessionLimits,
    store: Arc<dyn MessageStore>,
}

impl RelayServer {
    /// Bind the configured listen address
    pub async fn bind(config: &Config, store: Arc<dyn MessageStore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.smtp.listen_addr)
            .await
            .map_err(|e| {
                RelayError::Config(format!(
                    "Failed to bind {}: {}",
                    config.smtp.listen_addr, e
                ))
            })?;

        Ok(Self {
            listener,
            hostname: config.server.hostname.clone(),
            limits: config.session_limits(),
            store,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Each session gets a child token, so shutting down also cancels any
    /// transaction still in flight.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!("SMTP relay listening on {}", self.local_addr()?);

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("SMTP relay stopped accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, addr)) => {
                    info!("New SMTP connection from {}", addr);

                    let session = SmtpSession::new(
                        self.hostname.clone(),
                        self.store.clone(),
                        self.limits.clone(),
                        shutdown.child_token(),
                    )
                    .with_peer(addr);

                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket).await {
                            error!("Session error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
