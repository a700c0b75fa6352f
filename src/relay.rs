//! Connection acceptor
//!
//! Binds the listening socket, spawns a tracked session per connection and
//! runs the shutdown sequence once the cancellation signal fires.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, error, info, warn};

use crate::broadcaster::BroadcasterHandle;
use crate::error::RelayError;
use crate::session::handle_connection;
use crate::shutdown::Shutdown;

/// Pause after a failed accept, so a persistent error (e.g. EMFILE) doesn't spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The chat relay server
pub struct ChatRelay {
    listener: TcpListener,
    broadcaster: BroadcasterHandle,
    shutdown: Shutdown,
}

impl ChatRelay {
    /// Bind the listening socket. Failure is fatal to the caller.
    pub async fn bind<A>(
        addr: A,
        broadcaster: BroadcasterHandle,
        shutdown: Shutdown,
    ) -> Result<Self, RelayError>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self::from_listener(listener, broadcaster, shutdown))
    }

    /// Wrap an already bound listener
    pub fn from_listener(
        listener: TcpListener,
        broadcaster: BroadcasterHandle,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            listener,
            broadcaster,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown, then wait for every session
    ///
    /// Returns only after the listener is closed and all session tasks
    /// have finished.
    pub async fn run(self) {
        let Self {
            listener,
            broadcaster,
            shutdown,
        } = self;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                // A connection that raced the signal is dropped, not served
                Ok(_) if shutdown.is_triggered() => break,
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let broadcaster = broadcaster.clone();
                    let token = shutdown.token();
                    shutdown.spawn_session(async move {
                        if let Err(e) = handle_connection(stream, broadcaster, token).await {
                            error!("Session error for {}: {}", addr, e);
                        }
                    });
                }
                Err(_) if shutdown.is_triggered() => break,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::select! {
                        _ = shutdown.triggered() => break,
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }

        drop(listener);
        info!(
            "Listener closed, draining {} sessions",
            shutdown.active_sessions()
        );
        shutdown.wait_for_sessions().await;
        info!("All sessions closed");
    }
}
