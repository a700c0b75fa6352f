//! Broadcaster actor implementation
//!
//! The single owner of the registry of outbound queues. Registration,
//! deregistration and fan-out all go through one command channel and one
//! event loop, so they are totally ordered and the registry needs no lock.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::SessionId;

/// Sending side of a session's outbound queue
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Commands sent from sessions to the Broadcaster actor
#[derive(Debug)]
pub enum BroadcastCommand {
    /// Start delivering broadcasts to this queue
    Register { session_id: SessionId, queue: Outbound },
    /// Stop delivering and close the queue
    Deregister { session_id: SessionId },
    /// Fan a message out to every registered queue
    Broadcast { message: ServerMessage },
}

/// Cloneable handle used by sessions to talk to the Broadcaster
#[derive(Debug, Clone)]
pub struct BroadcasterHandle {
    sender: mpsc::UnboundedSender<BroadcastCommand>,
}

impl BroadcasterHandle {
    /// Hand a session's queue over to the Broadcaster
    pub fn register(&self, session_id: SessionId, queue: Outbound) -> Result<(), SendError> {
        self.send(BroadcastCommand::Register { session_id, queue })
    }

    /// Remove a session's queue; the Broadcaster closes it
    pub fn deregister(&self, session_id: SessionId) -> Result<(), SendError> {
        self.send(BroadcastCommand::Deregister { session_id })
    }

    /// Send a message to every registered session, including the sender
    pub fn broadcast(&self, message: ServerMessage) -> Result<(), SendError> {
        self.send(BroadcastCommand::Broadcast { message })
    }

    fn send(&self, cmd: BroadcastCommand) -> Result<(), SendError> {
        self.sender
            .send(cmd)
            .map_err(|_| SendError::BroadcasterClosed)
    }
}

/// The Broadcaster actor
///
/// Owns the registry: SessionId -> outbound queue.
pub struct Broadcaster {
    registry: HashMap<SessionId, Outbound>,
    receiver: mpsc::UnboundedReceiver<BroadcastCommand>,
    shutdown: CancellationToken,
}

impl Broadcaster {
    /// Create a Broadcaster and the handle sessions use to reach it
    pub fn new(shutdown: CancellationToken) -> (Self, BroadcasterHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let broadcaster = Self {
            registry: HashMap::new(),
            receiver,
            shutdown,
        };
        (broadcaster, BroadcasterHandle { sender })
    }

    /// Number of currently registered queues
    pub fn registered(&self) -> usize {
        self.registry.len()
    }

    /// Run the Broadcaster event loop
    ///
    /// Returns on cancellation, or when every handle has been dropped.
    /// The registry is not flushed on exit; dropping it closes any queue
    /// still registered.
    pub async fn run(mut self) {
        info!("Broadcaster started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Broadcaster observed shutdown");
                    break;
                }
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        info!("Broadcaster stopped with {} sessions registered", self.registry.len());
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: BroadcastCommand) {
        match cmd {
            BroadcastCommand::Register { session_id, queue } => {
                self.registry.insert(session_id, queue);
                debug!("Registered {}, total sessions: {}", session_id, self.registry.len());
            }
            BroadcastCommand::Deregister { session_id } => {
                // Dropping the sender is what closes the queue
                if self.registry.remove(&session_id).is_some() {
                    debug!("Deregistered {}, total sessions: {}", session_id, self.registry.len());
                }
            }
            BroadcastCommand::Broadcast { message } => {
                for queue in self.registry.values() {
                    // A writer that already quit has dropped its receiver
                    let _ = queue.send(message.clone());
                }
            }
        }
    }
}
