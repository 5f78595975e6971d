//! transport::client
//!
//! Blocking client for the JSON-lines protocol.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Reply, Request, Response, TransportError};
use crate::core::types::{BranchName, CommitHash};
use crate::refresh::PushEvent;
use crate::service::{Attributes, ResolutionService, Status, TreeEntryInfo};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// [`ResolutionService`] that forwards every call to a [`Server`](super::Server).
///
/// One connection is opened lazily and reused; calls are serialized over
/// it. Each call is a single attempt bounded by the configured timeout. A
/// failed call drops the connection and the next call reconnects.
pub struct RemoteService {
    addr: SocketAddr,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RemoteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteService")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteService {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Ask the server to refresh `refname`. Returns once the server has
    /// acknowledged receipt, not when the pull completes.
    pub fn refresh(&self, refname: &str) -> Result<(), Status> {
        match self.call(&Request::Refresh {
            refname: refname.to_string(),
        })? {
            Response::Ack => Ok(()),
            other => Err(unexpected("Refresh", &other)),
        }
    }

    /// Forward a push notification. Acknowledged like [`RemoteService::refresh`].
    pub fn push(&self, event: &PushEvent) -> Result<(), Status> {
        match self.call(&Request::Push {
            event: event.clone(),
        })? {
            Response::Ack => Ok(()),
            other => Err(unexpected("Push", &other)),
        }
    }

    /// Send one request and wait for its reply.
    pub fn call(&self, request: &Request) -> Result<Response, Status> {
        let mut conn = self.conn.lock();
        let result = self.round_trip(&mut conn, request);
        if result.is_err() {
            *conn = None;
        }
        match result {
            Ok(Reply::Ok(response)) => Ok(response),
            Ok(Reply::Err(status)) => Err(status),
            Err(e) => {
                warn!(addr = %self.addr, operation = request.operation(), error = %e, "request failed");
                Err(e.into())
            }
        }
    }

    fn round_trip(
        &self,
        conn: &mut Option<Connection>,
        request: &Request,
    ) -> Result<Reply, TransportError> {
        if conn.is_none() {
            *conn = Some(self.connect()?);
        }
        let Some(conn) = conn.as_mut() else {
            return Err(TransportError::Closed);
        };

        let mut encoded = serde_json::to_vec(request)?;
        encoded.push(b'\n');
        conn.writer
            .write_all(&encoded)
            .map_err(|e| self.classify(e))?;

        let mut line = String::new();
        let read = conn
            .reader
            .read_line(&mut line)
            .map_err(|e| self.classify(e))?;
        if read == 0 {
            return Err(TransportError::Closed);
        }
        Ok(serde_json::from_str(&line)?)
    }

    fn connect(&self) -> Result<Connection, TransportError> {
        debug!(addr = %self.addr, "connecting");
        let stream =
            TcpStream::connect_timeout(&self.addr, self.timeout).map_err(|e| self.classify(e))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Connection {
            reader,
            writer: stream,
        })
    }

    fn classify(&self, err: std::io::Error) -> TransportError {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout {
                addr: self.addr.to_string(),
                secs: self.timeout.as_secs_f64(),
            },
            _ => TransportError::Io(err),
        }
    }
}

fn unexpected(operation: &str, response: &Response) -> Status {
    Status::Internal(format!("{operation}: unexpected response {response:?}"))
}

impl ResolutionService for RemoteService {
    fn list_commits(&self) -> Result<Vec<CommitHash>, Status> {
        match self.call(&Request::ListCommits)? {
            Response::Commits { commits } => Ok(commits),
            other => Err(unexpected("ListCommits", &other)),
        }
    }

    fn list_branches(&self) -> Result<BTreeMap<BranchName, CommitHash>, Status> {
        match self.call(&Request::ListBranches)? {
            Response::Branches { branches } => Ok(branches),
            other => Err(unexpected("ListBranches", &other)),
        }
    }

    fn get_attributes(&self, commit: &str, path: &str) -> Result<Attributes, Status> {
        let request = Request::GetAttributes {
            commit: commit.to_string(),
            path: path.to_string(),
        };
        match self.call(&request)? {
            Response::Attributes { attributes } => Ok(attributes),
            other => Err(unexpected("GetAttributes", &other)),
        }
    }

    fn list_dir(&self, commit: &str, path: &str) -> Result<Vec<TreeEntryInfo>, Status> {
        let request = Request::ListDir {
            commit: commit.to_string(),
            path: path.to_string(),
        };
        match self.call(&request)? {
            Response::Entries { entries } => Ok(entries),
            other => Err(unexpected("ListDir", &other)),
        }
    }

    fn get_file(&self, commit: &str, path: &str) -> Result<Vec<u8>, Status> {
        let request = Request::GetFile {
            commit: commit.to_string(),
            path: path.to_string(),
        };
        match self.call(&request)? {
            Response::File { contents } => Ok(contents),
            other => Err(unexpected("GetFile", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn unreachable_server_is_internal() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client = RemoteService::new(addr, Duration::from_millis(500));
        assert!(matches!(client.list_commits(), Err(Status::Internal(_))));
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = RemoteService::new(addr, Duration::from_millis(200));

        let err = client.list_commits().unwrap_err();
        assert!(matches!(err, Status::Internal(_)));
        assert!(err.message().contains("no reply"), "{}", err.message());
        drop(listener);
    }

    #[test]
    fn closed_connection_is_internal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let client = RemoteService::new(addr, Duration::from_secs(2));
        assert!(matches!(client.list_branches(), Err(Status::Internal(_))));
        handle.join().unwrap();
    }
}
