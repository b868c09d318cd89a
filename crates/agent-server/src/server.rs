//! TCP listener and connection supervisor

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::Agent;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::connection::handle_connection;
use crate::state::AppState;

pub struct Server {
    listener: TcpListener,
    agent: Arc<Agent>,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, agent: Arc<Agent>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, agent })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `shutdown` resolves, then wait for every open
    /// connection to finish the message it is working on.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = AppState {
            agent: self.agent,
            shutdown: stop_rx,
        };
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let peer = peer.to_string();
                        connections.spawn(handle_connection(stream, peer, state.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(accept_backoff(&e)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        tracing::info!(open = connections.len(), "Shutting down");
        drop(self.listener);
        let _ = stop_tx.send(true);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task failed");
            }
        }
    }
}

/// Pause after a failed `accept`. Errors about one aborted handshake retry
/// at once; anything else (EMFILE, ENOMEM) persists until something changes.
fn accept_backoff(err: &std::io::Error) -> Duration {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionRefused => Duration::ZERO,
        _ => Duration::from_millis(100),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agent_core::{AgentBuilder, ProviderResponse};
    use agent_core::testing::ScriptedProvider;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    type Running = (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>);

    async fn start(script: Vec<ProviderResponse>) -> Running {
        let agent = AgentBuilder::new()
            .provider(Arc::new(ScriptedProvider::new(script)))
            .build()
            .unwrap();
        let server = Server::bind("127.0.0.1:0", Arc::new(agent)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));
        (addr, stop, handle)
    }

    async fn ask(stream: &mut BufReader<TcpStream>, line: &str) -> String {
        stream.get_mut().write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        stream.read_line(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_connections_have_separate_sessions() {
        let (addr, stop, handle) = start(vec![
            ScriptedProvider::text("one"),
            ScriptedProvider::text("two"),
        ])
        .await;

        let mut first = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let mut second = BufReader::new(TcpStream::connect(addr).await.unwrap());

        assert_eq!(ask(&mut first, "{\"content\":\"a\"}\n").await, "{\"content\":\"one\"}\n");
        assert_eq!(ask(&mut second, "{\"content\":\"b\"}\n").await, "{\"content\":\"two\"}\n");

        stop.send(()).unwrap();
        handle.await.unwrap();

        // open connections are closed once shutdown completes
        let mut rest = String::new();
        assert_eq!(first.read_line(&mut rest).await.unwrap(), 0);
    }

    #[test]
    fn test_accept_backoff() {
        use std::io::{Error, ErrorKind};

        assert_eq!(accept_backoff(&Error::from(ErrorKind::ConnectionAborted)), Duration::ZERO);
        assert_eq!(accept_backoff(&Error::from(ErrorKind::ConnectionReset)), Duration::ZERO);
        assert!(accept_backoff(&Error::from(ErrorKind::Other)) > Duration::ZERO);
        #[cfg(unix)]
        assert!(accept_backoff(&Error::from_raw_os_error(24)) > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_stops_accepting_after_shutdown() {
        let (addr, stop, handle) = start(Vec::new()).await;
        stop.send(()).unwrap();
        handle.await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
