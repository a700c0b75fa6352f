//! Line-based TCP Chat Relay Library
//!
//! Every line a client sends is relayed to every connected client,
//! and the whole server drains its sessions cleanly on shutdown.
//!
//! # Protocol
//! - `nickname:<name>` sets the sender's display name
//! - any other line is chat, relayed as `<name>: <line>`
//! - the server announces arrivals, renames and departures
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Broadcaster` is the central actor owning the set of outbound queues
//! - Each connection runs a session with a reader and a writer task
//! - `Shutdown` owns the cancellation token and tracks session tasks
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use chat_relay::{Broadcaster, ChatRelay, Shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_relay::RelayError> {
//!     let shutdown = Shutdown::new();
//!     let (broadcaster, handle) = Broadcaster::new(shutdown.token());
//!     tokio::spawn(broadcaster.run());
//!
//!     let relay = ChatRelay::bind("127.0.0.1:8000", handle, shutdown.clone()).await?;
//!     tokio::spawn(async move {
//!         chat_relay::shutdown::wait_for_signal().await;
//!         shutdown.trigger();
//!     });
//!     relay.run().await;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod error;
pub mod message;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod types;

// Re-export main types for convenience
pub use broadcaster::{BroadcastCommand, Broadcaster, BroadcasterHandle};
pub use error::{RelayError, SendError};
pub use message::{ClientLine, ServerMessage};
pub use relay::ChatRelay;
pub use session::{handle_connection, run_session, Session};
pub use shutdown::Shutdown;
pub use types::SessionId;
