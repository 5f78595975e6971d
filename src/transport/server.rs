//! transport::server
//!
//! Tokio TCP server speaking the JSON-lines protocol.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::{Dispatcher, Reply, Request, TransportError};
use crate::service::Status;

/// Longest request line accepted, newline excluded.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

/// A bound listener plus the dispatcher that answers its requests.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl Server {
    /// Bind `addr`. Port 0 picks a free port; see [`Server::local_addr`].
    pub async fn bind(addr: SocketAddr, dispatcher: Dispatcher) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> Result<(), TransportError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. Connections already accepted keep
    /// running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, "listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(%addr, "shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };
                    debug!(%peer, "client connected");
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, dispatcher).await {
                            warn!(%peer, error = %e, "connection failed");
                        }
                        debug!(%peer, "client disconnected");
                    });
                }
            }
        }
    }
}

/// Answer requests on one connection until the peer hangs up.
///
/// A line longer than [`MAX_REQUEST_BYTES`] is answered with an internal
/// error and skipped without being buffered.
async fn handle_connection(stream: TcpStream, dispatcher: Dispatcher) -> Result<(), TransportError> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = Vec::new();

    loop {
        line.clear();
        let limit = MAX_REQUEST_BYTES as u64 + 1;
        if (&mut reader).take(limit).read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        } else if line.len() > MAX_REQUEST_BYTES {
            warn!(limit = MAX_REQUEST_BYTES, "request too long");
            let reply = Reply::Err(Status::Internal(format!(
                "request exceeds {MAX_REQUEST_BYTES} bytes"
            )));
            send(&mut write, &reply).await?;
            if !skip_line(&mut reader).await? {
                return Ok(());
            }
            continue;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let reply = match serde_json::from_slice::<Request>(&line) {
            Ok(request) => {
                let dispatcher = dispatcher.clone();
                // Git reads block on disk.
                tokio::task::spawn_blocking(move || dispatcher.dispatch(request))
                    .await
                    .unwrap_or_else(|e| {
                        Reply::Err(Status::Internal(format!("request task failed: {e}")))
                    })
            }
            Err(e) => {
                debug!(error = %e, "malformed request");
                Reply::Err(Status::Internal(format!("malformed request: {e}")))
            }
        };

        send(&mut write, &reply).await?;
    }
}

async fn send(write: &mut OwnedWriteHalf, reply: &Reply) -> Result<(), TransportError> {
    let mut encoded = serde_json::to_vec(reply)?;
    encoded.push(b'\n');
    write.write_all(&encoded).await?;
    Ok(())
}

/// Discard input through the next newline. Returns `false` at end of input.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<bool, TransportError> {
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(false);
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(true);
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}
