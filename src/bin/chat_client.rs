//! Chat Relay Client - Entry Point
//!
//! Prints every line from the server and sends every line typed on
//! standard input. `exit`, Ctrl-C, or the server hanging up ends it.

use std::env;
use std::io::BufRead;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::shutdown::{wait_for_signal, EXIT_COMMAND};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_client=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let stream = TcpStream::connect(&addr).await?;
    let local_addr = stream.local_addr()?;
    let (reader, writer) = stream.into_split();
    let mut incoming = FramedRead::new(reader, LinesCodec::new());
    let mut outgoing = FramedWrite::new(writer, LinesCodec::new());

    // Blocking stdin reads live on their own thread
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin error: {}", e);
                    break;
                }
            }
        }
    });

    let signal = wait_for_signal();
    tokio::pin!(signal);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut signal => break,
            line = incoming.next() => match line {
                Some(Ok(line)) => println!("{}", line),
                Some(Err(e)) => {
                    warn!("Read error: {}", e);
                    break;
                }
                None => {
                    debug!("Server closed the connection");
                    break;
                }
            },
            line = input_rx.recv(), if stdin_open => match line {
                Some(line) if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) => break,
                Some(line) => {
                    if let Err(e) = outgoing.send(line).await {
                        warn!("Write error: {}", e);
                        break;
                    }
                }
                // Stdin closed: keep listening
                None => stdin_open = false,
            },
        }
    }

    let _ = SinkExt::<String>::close(&mut outgoing).await;
    println!("{}: exit", local_addr);

    Ok(())
}
