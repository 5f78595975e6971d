//! transport
//!
//! Message shapes exchanged between the filesystem adapter and the
//! resolution service, and a JSON-lines TCP encoding of them.
//!
//! # Wire Format
//!
//! Each request is one JSON object on one line; each reply is one JSON
//! object on one line, in order, on the same connection:
//!
//! ```text
//! -> {"op":"get_attributes","commit":"<hash>","path":"/src"}
//! <- {"ok":{"kind":"attributes","attributes":{"mode":"DIRECTORY",...}}}
//! -> {"op":"get_file","commit":"<hash>","path":"missing.txt"}
//! <- {"err":{"code":"NOT_FOUND","message":"..."}}
//! ```
//!
//! File contents travel base64-encoded.
//!
//! # Components
//!
//! - [`Dispatcher`] turns a [`Request`] into a [`Reply`] using any
//!   [`ResolutionService`]
//! - [`Server`] accepts connections and dispatches each request on the
//!   blocking pool
//! - [`RemoteService`] is a blocking client implementing
//!   [`ResolutionService`]

mod client;
mod server;

pub use client::RemoteService;
pub use server::{Server, MAX_REQUEST_BYTES};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::types::{BranchName, CommitHash};
use crate::core::paths::store_path;
use crate::refresh::{PushEvent, RefreshTrigger};
use crate::service::{Attributes, ResolutionService, Status, TreeEntryInfo};

/// Errors from moving messages over the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    /// The peer closed the connection before replying.
    #[error("connection closed by peer")]
    Closed,

    /// No reply within the configured timeout.
    #[error("no reply from {addr} within {secs:.1}s")]
    Timeout { addr: String, secs: f64 },
}

impl From<TransportError> for Status {
    fn from(err: TransportError) -> Self {
        Status::Internal(format!("transport: {err}"))
    }
}

/// A resolution or refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListCommits,
    ListBranches,
    GetAttributes { commit: String, path: String },
    ListDir { commit: String, path: String },
    GetFile { commit: String, path: String },
    /// Refresh `refname` of the served repository; answered with
    /// [`Response::Ack`] before the pull runs.
    Refresh { refname: String },
    /// Refresh from a forge push notification for the served repository.
    Push { event: PushEvent },
}

impl Request {
    /// Operation name for logging.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::ListCommits => "ListCommits",
            Request::ListBranches => "ListBranches",
            Request::GetAttributes { .. } => "GetAttributes",
            Request::ListDir { .. } => "ListDir",
            Request::GetFile { .. } => "GetFile",
            Request::Refresh { .. } => "Refresh",
            Request::Push { .. } => "Push",
        }
    }
}

/// A successful answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Commits {
        commits: Vec<CommitHash>,
    },
    Branches {
        branches: BTreeMap<BranchName, CommitHash>,
    },
    Attributes {
        attributes: Attributes,
    },
    Entries {
        entries: Vec<TreeEntryInfo>,
    },
    File {
        #[serde(with = "base64_bytes")]
        contents: Vec<u8>,
    },
    Ack,
}

/// One line sent back for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ok(Response),
    Err(Status),
}

impl From<Result<Response, Status>> for Reply {
    fn from(result: Result<Response, Status>) -> Self {
        match result {
            Ok(response) => Reply::Ok(response),
            Err(status) => Reply::Err(status),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Refresh routing for the repository a server serves.
#[derive(Debug, Clone)]
struct ServedRefresh {
    trigger: RefreshTrigger,
    url: String,
}

impl ServedRefresh {
    /// Push events must name the served repository; events naming none are
    /// left for [`RefreshTrigger::on_push`] to reject.
    fn check_repository(&self, event: &PushEvent) -> Result<(), Status> {
        let Some(url) = event.repository_url() else {
            return Ok(());
        };
        match (store_path(url), store_path(&self.url)) {
            (Ok(pushed), Ok(served)) if pushed == served => Ok(()),
            _ => Err(Status::NotFound(format!(
                "Push: repository {url} is not served here"
            ))),
        }
    }
}

fn refresh_unsupported(operation: &str) -> Status {
    Status::Unimplemented(format!(
        "{operation}: this server does not accept refresh requests"
    ))
}

/// Answers requests with a [`ResolutionService`].
///
/// Without a refresh trigger, [`Request::Refresh`] and [`Request::Push`]
/// are answered with [`Status::Unimplemented`].
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<dyn ResolutionService>,
    refresh: Option<ServedRefresh>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(service: Arc<dyn ResolutionService>) -> Self {
        Self {
            service,
            refresh: None,
        }
    }

    /// Route refresh requests for `url` through `trigger`.
    pub fn with_refresh(mut self, trigger: RefreshTrigger, url: impl Into<String>) -> Self {
        self.refresh = Some(ServedRefresh {
            trigger,
            url: url.into(),
        });
        self
    }

    /// Answer one request. Blocks on the service.
    pub fn dispatch(&self, request: Request) -> Reply {
        debug!(operation = request.operation(), "dispatching request");
        self.answer(request).into()
    }

    fn answer(&self, request: Request) -> Result<Response, Status> {
        let service = &self.service;
        match request {
            Request::ListCommits => Ok(Response::Commits {
                commits: service.list_commits()?,
            }),
            Request::ListBranches => Ok(Response::Branches {
                branches: service.list_branches()?,
            }),
            Request::GetAttributes { commit, path } => Ok(Response::Attributes {
                attributes: service.get_attributes(&commit, &path)?,
            }),
            Request::ListDir { commit, path } => Ok(Response::Entries {
                entries: service.list_dir(&commit, &path)?,
            }),
            Request::GetFile { commit, path } => Ok(Response::File {
                contents: service.get_file(&commit, &path)?,
            }),
            Request::Refresh { refname } => match &self.refresh {
                Some(served) => {
                    served.trigger.trigger(&served.url, &refname)?;
                    Ok(Response::Ack)
                }
                None => Err(refresh_unsupported("Refresh")),
            },
            Request::Push { event } => match &self.refresh {
                Some(served) => {
                    served.check_repository(&event)?;
                    served.trigger.on_push(&event)?;
                    Ok(Response::Ack)
                }
                None => Err(refresh_unsupported("Push")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::MirrorPaths;
    use crate::core::types::FileMode;
    use crate::mirror::MirrorRegistry;
    use crate::service::mock::MockService;
    use tokio::runtime::Handle;

    mod wire {
        use super::*;

        #[test]
        fn request_is_tagged_by_op() {
            let request = Request::GetFile {
                commit: "abc".into(),
                path: "a.txt".into(),
            };
            let json = serde_json::to_string(&request).unwrap();
            assert_eq!(json, r#"{"op":"get_file","commit":"abc","path":"a.txt"}"#);

            let parsed: Request = serde_json::from_str(r#"{"op":"list_commits"}"#).unwrap();
            assert_eq!(parsed, Request::ListCommits);
        }

        #[test]
        fn file_contents_are_base64() {
            let reply = Reply::Ok(Response::File {
                contents: b"hello".to_vec(),
            });
            let json = serde_json::to_string(&reply).unwrap();
            assert_eq!(json, r#"{"ok":{"kind":"file","contents":"aGVsbG8="}}"#);
            let back: Reply = serde_json::from_str(&json).unwrap();
            assert_eq!(back, reply);
        }

        #[test]
        fn error_reply_carries_status() {
            let json = r#"{"err":{"code":"NOT_FOUND","message":"gone"}}"#;
            let reply: Reply = serde_json::from_str(json).unwrap();
            assert_eq!(reply, Reply::Err(Status::NotFound("gone".into())));
        }

        #[test]
        fn invalid_base64_is_rejected() {
            let json = r#"{"ok":{"kind":"file","contents":"***"}}"#;
            assert!(serde_json::from_str::<Reply>(json).is_err());
        }
    }

    mod dispatch {
        use super::*;

        #[test]
        fn forwards_to_service() {
            let hash = CommitHash::new("c".repeat(40)).unwrap();
            let service = MockService::new()
                .with_commit(&hash)
                .with_file(&hash, "a.txt", FileMode::Regular, b"hello");
            let dispatcher = Dispatcher::new(Arc::new(service));

            let reply = dispatcher.dispatch(Request::GetFile {
                commit: hash.to_string(),
                path: "a.txt".into(),
            });
            assert_eq!(
                reply,
                Reply::Ok(Response::File {
                    contents: b"hello".to_vec()
                })
            );

            let reply = dispatcher.dispatch(Request::GetFile {
                commit: hash.to_string(),
                path: "b.txt".into(),
            });
            assert!(matches!(reply, Reply::Err(Status::NotFound(_))));
        }

        #[test]
        fn refresh_without_trigger_is_unimplemented() {
            let dispatcher = Dispatcher::new(Arc::new(MockService::new()));
            let reply = dispatcher.dispatch(Request::Refresh {
                refname: "refs/heads/main".into(),
            });
            assert!(matches!(reply, Reply::Err(Status::Unimplemented(_))));

            let event = PushEvent::from_json(r#"{"ref":"refs/heads/main"}"#).unwrap();
            let reply = dispatcher.dispatch(Request::Push { event });
            assert!(matches!(reply, Reply::Err(Status::Unimplemented(_))));
        }

        fn refreshing(served: &str) -> Dispatcher {
            let registry = MirrorRegistry::new(MirrorPaths::new("/nonexistent/base"));
            let trigger = RefreshTrigger::new(Arc::new(registry), Handle::current());
            Dispatcher::new(Arc::new(MockService::new())).with_refresh(trigger, served)
        }

        #[tokio::test]
        async fn push_for_another_repository_is_not_found() {
            let dispatcher = refreshing("https://example.com/octo/widgets");
            let event = PushEvent::from_json(
                r#"{"ref":"refs/heads/main","repository":{"clone_url":"https://example.com/octo/gadgets.git"}}"#,
            )
            .unwrap();
            let reply = dispatcher.dispatch(Request::Push { event });
            assert!(
                matches!(&reply, Reply::Err(Status::NotFound(m)) if m.contains("not served")),
                "got {reply:?}"
            );
        }

        #[tokio::test]
        async fn push_deleting_a_ref_is_not_found() {
            let dispatcher = refreshing("https://example.com/octo/widgets");
            let event = PushEvent::from_json(
                r#"{"ref":"refs/heads/main","after":"0000000000000000000000000000000000000000",
                    "repository":{"clone_url":"https://example.com/octo/widgets.git"}}"#,
            )
            .unwrap();
            let reply = dispatcher.dispatch(Request::Push { event });
            assert!(matches!(reply, Reply::Err(Status::NotFound(_))), "got {reply:?}");
        }

        #[test]
        fn push_request_carries_the_event() {
            let json = r#"{"op":"push","event":{"ref":"refs/heads/main","repository":{"url":"https://example.com/a/b"}}}"#;
            let request: Request = serde_json::from_str(json).unwrap();
            match request {
                Request::Push { event } => {
                    assert_eq!(event.git_ref, "refs/heads/main");
                    assert_eq!(event.repository_url(), Some("https://example.com/a/b"));
                }
                other => panic!("unexpected request {other:?}"),
            }
        }
    }

    #[test]
    fn transport_errors_are_internal() {
        let status: Status = TransportError::Closed.into();
        assert!(matches!(status, Status::Internal(_)));
    }
}
