//! End-to-end tests over TCP: a served mirror, a remote client, and the
//! filesystem resolver on the client side.

mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::runtime::Runtime;

use commitfs::core::paths::MirrorPaths;
use commitfs::core::types::FileMode;
use commitfs::fs::{NodeKind, VirtualPathResolver};
use commitfs::mirror::MirrorRegistry;
use commitfs::refresh::{PushEvent, RefreshTrigger};
use commitfs::service::{GitResolutionService, ResolutionService, Status};
use commitfs::transport::{Dispatcher, RemoteService, Reply, Response, Server, MAX_REQUEST_BYTES};

use common::TestRepo;

/// A server running on its own runtime for the lifetime of the fixture.
struct Served {
    _runtime: Runtime,
    upstream: TestRepo,
    _store: TempDir,
    addr: SocketAddr,
}

impl Served {
    fn start(upstream: TestRepo, with_refresh: bool) -> Self {
        let store = TempDir::new().unwrap();
        let runtime = Runtime::new().unwrap();
        let url = upstream.url();

        let registry = Arc::new(MirrorRegistry::new(MirrorPaths::new(store.path())));
        let mirror = registry.get_or_create(&url).unwrap();
        mirror.init(&url).unwrap();

        let mut dispatcher = Dispatcher::new(Arc::new(GitResolutionService::new(mirror)));
        if with_refresh {
            let trigger = RefreshTrigger::new(registry, runtime.handle().clone());
            dispatcher = dispatcher.with_refresh(trigger, url);
        }

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = runtime.block_on(Server::bind(addr, dispatcher)).unwrap();
        let addr = server.local_addr().unwrap();
        runtime.spawn(server.run());

        Self {
            _runtime: runtime,
            upstream,
            _store: store,
            addr,
        }
    }

    fn client(&self) -> Arc<RemoteService> {
        Arc::new(RemoteService::new(self.addr, Duration::from_secs(10)))
    }
}

fn wait_for<F: FnMut() -> bool>(mut done: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn remote_queries_match_the_mirror() {
    let upstream = TestRepo::with_initial_commit();
    let c1 = upstream.head();
    let c2 = upstream.commit_file("a.txt", "hello", "Add a.txt");
    let served = Served::start(upstream, false);
    let client = served.client();

    let commits: Vec<String> = client
        .list_commits()
        .unwrap()
        .into_iter()
        .map(|h| h.to_string())
        .collect();
    assert_eq!(commits, vec![c2.clone(), c1.clone()]);

    let attrs = client.get_attributes(&c2, "a.txt").unwrap();
    assert_eq!((attrs.mode, attrs.size), (FileMode::Regular, 5));
    assert_eq!(client.get_file(&c2, "a.txt").unwrap(), b"hello");
    assert!(!client
        .list_dir(&c1, "/")
        .unwrap()
        .iter()
        .any(|e| e.name == "a.txt"));

    assert!(matches!(
        client.get_file(&c2, "missing"),
        Err(Status::NotFound(_))
    ));
    // The connection survives an error reply.
    assert_eq!(client.list_branches().unwrap().len(), 1);
}

#[test]
fn binary_content_survives_the_wire() {
    let upstream = TestRepo::with_initial_commit();
    let bytes: Vec<u8> = (0..=255u8).collect();
    std::fs::write(upstream.path().join("blob.bin"), &bytes).unwrap();
    common::run_git(upstream.path(), &["add", "blob.bin"], 1);
    let head = upstream.commit("Add binary");
    let served = Served::start(upstream, false);

    assert_eq!(served.client().get_file(&head, "blob.bin").unwrap(), bytes);
}

#[test]
fn resolver_over_the_wire() {
    let upstream = TestRepo::with_initial_commit();
    let head = upstream.commit_file("src/main.rs", "fn main() {}\n", "Add main");
    let served = Served::start(upstream, false);
    let resolver = VirtualPathResolver::new(served.client());

    assert_eq!(
        resolver.read_symlink_target("/branches/main").unwrap(),
        format!("../commits/{head}")
    );
    let attr = resolver.attributes(&format!("/commits/{head}/src")).unwrap();
    assert_eq!(attr.kind, NodeKind::Directory);
    assert_eq!(
        &*resolver.read(&format!("/commits/{head}/src/main.rs")).unwrap(),
        b"fn main() {}\n"
    );
    assert_eq!(
        resolver
            .attributes(&format!("/commits/{}", "a".repeat(40)))
            .unwrap_err()
            .errno(),
        libc::ENOENT
    );
}

#[test]
fn refresh_is_acknowledged_then_applied() {
    let upstream = TestRepo::with_initial_commit();
    let served = Served::start(upstream, true);
    let client = served.client();
    assert_eq!(client.list_commits().unwrap().len(), 1);

    let newer = served.upstream.commit_file("b.txt", "b", "Add b");
    client.refresh("refs/heads/main").unwrap();

    let applied = wait_for(|| {
        client
            .list_commits()
            .map(|commits| commits.first().map(|h| h.as_str()) == Some(newer.as_str()))
            .unwrap_or(false)
    });
    assert!(applied, "refresh never reached the mirror");
}

#[test]
fn push_event_is_acknowledged_then_applied() {
    let upstream = TestRepo::with_initial_commit();
    let served = Served::start(upstream, true);
    let client = served.client();

    let newer = served.upstream.commit_file("c.txt", "c", "Add c");
    let payload = serde_json::json!({
        "ref": "refs/heads/main",
        "after": &newer,
        "repository": { "full_name": "local/upstream", "clone_url": served.upstream.url() },
    });
    let event = PushEvent::from_json(&payload.to_string()).unwrap();
    client.push(&event).unwrap();

    let applied = wait_for(|| {
        client
            .list_commits()
            .map(|commits| commits.first().map(|h| h.as_str()) == Some(newer.as_str()))
            .unwrap_or(false)
    });
    assert!(applied, "push never reached the mirror");

    let foreign = PushEvent::from_json(
        r#"{"ref":"refs/heads/main","repository":{"clone_url":"https://example.com/other/repo.git"}}"#,
    )
    .unwrap();
    assert!(matches!(client.push(&foreign), Err(Status::NotFound(_))));
}

#[test]
fn concurrent_refreshes_keep_history_consistent() {
    let upstream = TestRepo::with_initial_commit();
    let served = Served::start(upstream, true);
    for i in 0..3 {
        served
            .upstream
            .commit_file(&format!("f{i}"), "x", &format!("Commit {i}"));
    }
    let head = served.upstream.head();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = served.client();
            std::thread::spawn(move || client.refresh("refs/heads/main"))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let client = served.client();
    let applied = wait_for(|| {
        client
            .list_commits()
            .map(|c| c.first().map(|h| h.as_str()) == Some(head.as_str()))
            .unwrap_or(false)
    });
    assert!(applied);
    let commits = client.list_commits().unwrap();
    assert_eq!(commits.len(), 4);
    for hash in commits {
        let root = client.get_attributes(hash.as_str(), "").unwrap();
        assert_eq!(root.mode, FileMode::Directory);
    }
}

#[test]
fn refresh_rejected_without_trigger_or_with_bad_ref() {
    let upstream = TestRepo::with_initial_commit();

    let plain = Served::start(upstream, false);
    assert!(matches!(
        plain.client().refresh("refs/heads/main"),
        Err(Status::Unimplemented(_))
    ));

    let upstream = TestRepo::with_initial_commit();
    let refreshing = Served::start(upstream, true);
    assert!(matches!(
        refreshing.client().refresh("main"),
        Err(Status::NotFound(_))
    ));
}

#[test]
fn oversized_request_is_refused_and_connection_survives() {
    let served = Served::start(TestRepo::with_initial_commit(), false);
    let mut stream = TcpStream::connect(served.addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut huge = vec![b'a'; MAX_REQUEST_BYTES + 10];
    huge.push(b'\n');
    stream.write_all(&huge).unwrap();
    stream.write_all(b"{\"op\":\"list_branches\"}\n").unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let reply: Reply = serde_json::from_str(&line).unwrap();
    assert!(
        matches!(&reply, Reply::Err(Status::Internal(m)) if m.contains("exceeds")),
        "got {reply:?}"
    );

    line.clear();
    reader.read_line(&mut line).unwrap();
    let reply: Reply = serde_json::from_str(&line).unwrap();
    assert!(
        matches!(reply, Reply::Ok(Response::Branches { .. })),
        "got {reply:?}"
    );
}
