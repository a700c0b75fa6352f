//! Shutdown coordination
//!
//! `Shutdown` owns the one-shot cancellation signal and the set of running
//! session tasks. Triggers are an OS signal or an `exit` line on the
//! operator's control input.

use std::future::Future;
use std::io::BufRead;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Operator command that stops the server
pub const EXIT_COMMAND: &str = "exit";

/// Cancellation signal plus the join-set of session tasks
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cancellation signal, for components that must observe it
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the cancellation signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the signal has fired
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Spawn a session task that `wait_for_sessions` will wait on
    pub fn spawn_session<F>(&self, session: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sessions.spawn(session);
    }

    /// Number of session tasks still running
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Stop accepting new session tasks and wait for the running ones
    pub async fn wait_for_sessions(&self) {
        self.sessions.close();
        debug!("Waiting for {} sessions to finish", self.sessions.len());
        self.sessions.wait().await;
        debug!("All sessions finished");
    }
}

/// Completes on Ctrl-C, or SIGTERM on unix
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Read operator commands until `exit` or end of input
///
/// Blocking; run it on a dedicated thread. Returns true if it fired the
/// signal. End of input leaves the server running.
pub fn watch_control_input<R: BufRead>(input: R, shutdown: &Shutdown) -> bool {
    for line in input.lines() {
        match line {
            Ok(line) if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) => {
                info!("Operator requested exit");
                shutdown.trigger();
                return true;
            }
            Ok(line) => debug!("Ignoring control input: {:?}", line),
            Err(e) => {
                warn!("Control input error: {}", e);
                break;
            }
        }
    }
    false
}
