//! Client session handling
//!
//! One session per connection: a reader that turns input lines into
//! broadcaster commands, and a writer task that drains the session's
//! outbound queue onto the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcaster::BroadcasterHandle;
use crate::error::RelayError;
use crate::message::{ClientLine, ServerMessage};
use crate::types::SessionId;

/// Longest accepted input line in bytes
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Per-connection state
///
/// Only the reader side touches it, so it needs no synchronization.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier, the registry key
    pub id: SessionId,
    /// Remote address, the stable identity string
    pub identity: String,
    /// Nickname (None until set to something non-empty)
    pub nickname: Option<String>,
}

impl Session {
    /// Create a new session for the given connection identity
    pub fn new(identity: String) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            nickname: None,
        }
    }

    /// Nickname if set, otherwise the connection identity
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.identity)
    }

    /// Set the nickname; an empty one falls back to the identity
    pub fn set_nickname(&mut self, nickname: String) {
        self.nickname = if nickname.is_empty() {
            None
        } else {
            Some(nickname)
        };
    }
}

/// Handle a new TCP connection
///
/// Runs the session to completion: returns only after both the reader and
/// the writer side are done.
pub async fn handle_connection(
    stream: TcpStream,
    broadcaster: BroadcasterHandle,
    shutdown: CancellationToken,
) -> Result<(), RelayError> {
    let identity = stream.peer_addr()?.to_string();
    let (reader, writer) = stream.into_split();
    run_session(identity, reader, writer, broadcaster, shutdown).await
}

/// Run a session over any byte stream pair
pub async fn run_session<R, W>(
    identity: String,
    reader: R,
    writer: W,
    broadcaster: BroadcasterHandle,
    shutdown: CancellationToken,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut session = Session::new(identity);
    let (queue, queue_rx) = mpsc::unbounded_channel();

    let write_task = tokio::spawn(write_loop(
        session.id,
        FramedWrite::new(writer, LinesCodec::new()),
        queue_rx,
        shutdown.clone(),
    ));

    // Welcome goes straight onto our own queue, before anyone else hears of us
    let _ = queue.send(ServerMessage::Welcome {
        identity: session.identity.clone(),
    });
    let registered = broadcaster
        .broadcast(ServerMessage::Arrived {
            name: session.identity.clone(),
        })
        .and_then(|_| broadcaster.register(session.id, queue));

    match registered {
        Ok(()) => {
            info!("{} has arrived ({})", session.identity, session.id);
            let lines = FramedRead::new(
                reader,
                LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
            );
            read_loop(&mut session, lines, &broadcaster, &shutdown).await;

            if broadcaster.deregister(session.id).is_err()
                || broadcaster
                    .broadcast(ServerMessage::Left {
                        name: session.display_name().to_string(),
                    })
                    .is_err()
            {
                debug!("Broadcaster closed before {} left", session.id);
            }
            info!("{} has left ({})", session.display_name(), session.id);
        }
        Err(_) => {
            // Queue was dropped with the failed command, so the writer drains the welcome and stops
            debug!("Broadcaster closed, not registering {}", session.id);
        }
    }

    if let Err(e) = write_task.await {
        warn!("Write task for {} panicked: {}", session.id, e);
    }

    Ok(())
}

/// Session Reader: input lines -> broadcaster commands
///
/// Stops at end of stream, on any read error, or on shutdown.
async fn read_loop<R>(
    session: &mut Session,
    mut lines: FramedRead<R, LinesCodec>,
    broadcaster: &BroadcasterHandle,
    shutdown: &CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Read loop for {} observed shutdown", session.id);
                break;
            }
            next = lines.next() => match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Read error for {}: {}", session.identity, e);
                    break;
                }
                None => {
                    debug!("{} closed the connection", session.identity);
                    break;
                }
            },
        };

        let message = match ClientLine::parse(&line) {
            ClientLine::Nickname(nickname) => {
                session.set_nickname(nickname.clone());
                ServerMessage::Renamed {
                    identity: session.identity.clone(),
                    nickname,
                }
            }
            ClientLine::Chat(text) => ServerMessage::Chat {
                from: session.display_name().to_string(),
                text,
            },
        };

        if broadcaster.broadcast(message).is_err() {
            debug!("Broadcaster closed, ending read loop for {}", session.id);
            break;
        }
    }
}

/// Session Writer: outbound queue -> socket
///
/// Drains until the broadcaster closes the queue. Shutdown or a write
/// error ends it early, dropping whatever is still queued.
async fn write_loop<W>(
    session_id: SessionId,
    mut sink: FramedWrite<W, LinesCodec>,
    mut queue: mpsc::UnboundedReceiver<ServerMessage>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Write loop for {} observed shutdown", session_id);
                break;
            }
            msg = queue.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        // A peer that stops reading must not pin the writer past shutdown
        let sent = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Write loop for {} observed shutdown mid-write", session_id);
                break;
            }
            sent = sink.send(msg.to_string()) => sent,
        };

        if let Err(e) = sent {
            warn!("Write error for {}: {}", session_id, e);
            break;
        }
    }
    debug!("Write task ended for {}", session_id);

    // Half-close so the peer sees end of stream; the flush is cut short by shutdown too
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {}
        _ = SinkExt::<String>::close(&mut sink) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::broadcaster::Broadcaster;

    const IDENTITY: &str = "10.0.0.1:4000";

    struct Harness {
        client: BufReader<tokio::io::ReadHalf<DuplexStream>>,
        client_tx: tokio::io::WriteHalf<DuplexStream>,
        observer: mpsc::UnboundedReceiver<ServerMessage>,
        session: JoinHandle<Result<(), RelayError>>,
        shutdown: CancellationToken,
    }

    /// Start a broadcaster with one observer queue, then one session over a duplex pipe
    fn start() -> Harness {
        start_with_buffer(4096)
    }

    fn start_with_buffer(max_buf_size: usize) -> Harness {
        let shutdown = CancellationToken::new();
        let (broadcaster, handle) = Broadcaster::new(shutdown.clone());
        tokio::spawn(broadcaster.run());

        let (observer_tx, observer) = mpsc::unbounded_channel();
        handle.register(SessionId::new(), observer_tx).unwrap();

        let (server_io, client_io) = tokio::io::duplex(max_buf_size);
        let (server_rx, server_tx) = tokio::io::split(server_io);
        let (client_rx, client_tx) = tokio::io::split(client_io);

        let session = tokio::spawn(run_session(
            IDENTITY.to_string(),
            server_rx,
            server_tx,
            handle,
            shutdown.clone(),
        ));

        Harness {
            client: BufReader::new(client_rx),
            client_tx,
            observer,
            session,
            shutdown,
        }
    }

    async fn observe(observer: &mut mpsc::UnboundedReceiver<ServerMessage>) -> String {
        timeout(Duration::from_secs(5), observer.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("observer queue closed")
            .to_string()
    }

    async fn read_line<R: AsyncBufRead + Unpin>(client: &mut R) -> Option<String> {
        let mut line = String::new();
        let n = timeout(Duration::from_secs(5), client.read_line(&mut line))
            .await
            .expect("timed out waiting for line")
            .unwrap();
        (n > 0).then(|| line.trim_end_matches('\n').to_string())
    }

    #[test]
    fn test_display_name_falls_back_to_identity() {
        let mut session = Session::new(IDENTITY.to_string());
        assert_eq!(session.display_name(), IDENTITY);

        session.set_nickname("Alice".to_string());
        assert_eq!(session.display_name(), "Alice");

        session.set_nickname(String::new());
        assert_eq!(session.display_name(), IDENTITY);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let mut h = start();

        assert_eq!(read_line(&mut h.client).await.unwrap(), format!("You are {}", IDENTITY));
        assert_eq!(observe(&mut h.observer).await, format!("{} has arrived", IDENTITY));

        h.client_tx.write_all(b"hello\nnickname:Bob\nhi\n").await.unwrap();

        assert_eq!(observe(&mut h.observer).await, format!("{}: hello", IDENTITY));
        assert_eq!(observe(&mut h.observer).await, format!("{} is now Bob", IDENTITY));
        assert_eq!(observe(&mut h.observer).await, "Bob: hi");

        // Sender gets its own broadcasts too, but not its own arrival
        assert_eq!(read_line(&mut h.client).await.unwrap(), format!("{}: hello", IDENTITY));
        assert_eq!(read_line(&mut h.client).await.unwrap(), format!("{} is now Bob", IDENTITY));
        assert_eq!(read_line(&mut h.client).await.unwrap(), "Bob: hi");

        h.client_tx.shutdown().await.unwrap();

        assert_eq!(observe(&mut h.observer).await, "Bob has left");
        assert_eq!(read_line(&mut h.client).await, None);
        timeout(Duration::from_secs(5), h.session)
            .await
            .expect("session did not finish")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_crlf_is_stripped() {
        let mut h = start();
        observe(&mut h.observer).await;

        h.client_tx.write_all(b"nickname:Carol\r\nyo\r\n").await.unwrap();

        assert_eq!(observe(&mut h.observer).await, format!("{} is now Carol", IDENTITY));
        assert_eq!(observe(&mut h.observer).await, "Carol: yo");
    }

    #[tokio::test]
    async fn test_read_error_emits_single_departure() {
        let mut h = start();
        observe(&mut h.observer).await;

        // Invalid UTF-8 is a framing error and ends the reader
        h.client_tx.write_all(b"\xff\xfe\n").await.unwrap();

        assert_eq!(observe(&mut h.observer).await, format!("{} has left", IDENTITY));
        timeout(Duration::from_secs(5), h.session)
            .await
            .expect("session did not finish")
            .unwrap()
            .unwrap();

        h.client_tx.write_all(b"ignored\n").await.ok();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_ends_idle_session() {
        let mut h = start();
        assert!(read_line(&mut h.client).await.is_some());

        h.shutdown.cancel();

        timeout(Duration::from_secs(5), h.session)
            .await
            .expect("session did not observe shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(read_line(&mut h.client).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_ends_session_blocked_on_write() {
        // Tiny pipe and a client that never reads: the writer fills it and blocks
        let mut h = start_with_buffer(64);
        observe(&mut h.observer).await;

        let line = format!("{}\n", "x".repeat(100));
        for _ in 0..20 {
            h.client_tx.write_all(line.as_bytes()).await.unwrap();
        }
        for _ in 0..20 {
            observe(&mut h.observer).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.session.is_finished());

        h.shutdown.cancel();

        timeout(Duration::from_secs(5), h.session)
            .await
            .expect("session stayed blocked on a stalled write")
            .unwrap()
            .unwrap();
    }
}
