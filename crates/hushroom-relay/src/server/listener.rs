//! TCP accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use hushroom_core::RelayConfig;
use hushroom_crypto::RelaySigningKey;

use super::connection::handle_connection;
use super::state::RelayState;
use crate::error::RelayError;

/// A bound relay, ready to accept WebSocket clients.
#[derive(Debug)]
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl RelayServer {
    pub async fn bind(config: &RelayConfig, signing_key: RelaySigningKey) -> Result<Self, RelayError> {
        let state = Arc::new(RelayState::new(config, signing_key)?);
        let listener = TcpListener::bind(config.addr).await?;
        info!(
            addr = %listener.local_addr()?,
            fingerprint = %state.fingerprint(),
            "Relay listening"
        );
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub const fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), RelayError> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Relay shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, state).await {
                                debug!(peer = %peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
        Ok(())
    }
}
