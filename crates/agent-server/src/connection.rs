//! Per-connection handler
//!
//! Each accepted socket gets its own task running [`handle_connection`], which
//! owns exactly one [`Session`] and one [`LineFramer`].

use agent_core::Session;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::framing::{Inbound, LineFramer, Reply, decode_line};
use crate::state::AppState;

const READ_CHUNK: usize = 4096;
const PREVIEW_CHARS: usize = 80;

/// Serve one client until it disconnects, a read fails, or shutdown is requested.
///
/// Shutdown is only observed between reads, so a message that is already
/// being processed runs to completion and gets its reply.
pub async fn handle_connection<S>(mut stream: S, peer: String, mut state: AppState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(state.agent.clone());
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_CHUNK];
    tracing::info!(%peer, session = %session.id(), "Client connected");

    'conn: loop {
        let n = tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Read failed");
                    break;
                }
            },
            _ = state.shutdown.changed() => {
                tracing::info!(%peer, "Closing for shutdown");
                break;
            }
        };
        framer.extend(&buf[..n]);

        while let Some(line) = framer.next_line() {
            let reply = match decode_line(&line) {
                Inbound::Ignored => continue,
                Inbound::Invalid => {
                    tracing::debug!(%peer, "Invalid JSON line");
                    Reply::invalid_json()
                }
                Inbound::Message(text) => {
                    tracing::info!(%peer, "> {}", preview(&text));
                    let reply = session.process(&text).await;
                    tracing::info!(%peer, "< {}", preview(&reply));
                    Reply::Content(reply)
                }
            };

            if let Err(e) = send(&mut stream, &reply).await {
                tracing::debug!(%peer, error = %e, "Reply dropped");
                break 'conn;
            }
        }
    }

    tracing::info!(
        %peer,
        session = %session.id(),
        turns = session.turn_count(),
        unframed_bytes = framer.buffered(),
        "Client disconnected"
    );
}

async fn send<S>(stream: &mut S, reply: &Reply) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let bytes = reply.encode()?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
