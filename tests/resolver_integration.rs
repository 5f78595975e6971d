//! Integration tests for the git-backed resolution service and the
//! filesystem resolver on top of it.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use commitfs::core::types::{FileMode, RefName};
use commitfs::fs::{DirEntry, FsError, NodeKind, VirtualPathResolver};
use commitfs::mirror::Mirror;
use commitfs::service::{GitResolutionService, ResolutionService, Status, TreeEntryInfo};

use common::TestRepo;

/// Upstream plus an initialized mirror of it.
struct Fixture {
    upstream: TestRepo,
    _store: TempDir,
    service: Arc<GitResolutionService>,
}

impl Fixture {
    fn new(upstream: TestRepo) -> Self {
        let store = TempDir::new().unwrap();
        let mirror = Arc::new(Mirror::new(store.path().join("m.git")));
        mirror.init(&upstream.url()).unwrap();
        Self {
            upstream,
            _store: store,
            service: Arc::new(GitResolutionService::new(mirror)),
        }
    }

    fn pull_main(&self) {
        self.service
            .mirror()
            .pull(&RefName::new("refs/heads/main").unwrap())
            .unwrap();
    }

    fn resolver(&self) -> VirtualPathResolver {
        VirtualPathResolver::new(self.service.clone())
    }
}

/// `c1` has README.md only; `c2` adds a.txt with "hello".
fn two_commits() -> (Fixture, String, String) {
    let upstream = TestRepo::with_initial_commit();
    let c1 = upstream.head();
    let c2 = upstream.commit_file("a.txt", "hello", "Add a.txt");
    (Fixture::new(upstream), c1, c2)
}

/// A commit with nested directories, an executable and a symlink.
fn layered() -> (Fixture, String) {
    let upstream = TestRepo::with_initial_commit();
    upstream.commit_file("src/lib.rs", "pub fn x() {}\n", "Add lib");
    upstream.commit_file("src/deep/inner.rs", "// inner\n", "Add inner");
    upstream.commit_executable("run.sh", "#!/bin/sh\n", "Add script");
    let head = upstream.commit_symlink("docs", "src", "Add link");
    (Fixture::new(upstream), head)
}

fn names(entries: &[TreeEntryInfo]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

mod service {
    use super::*;

    #[test]
    fn child_commit_adds_file() {
        let (fx, c1, c2) = two_commits();

        let at_c1 = fx.service.list_dir(&c1, "/").unwrap();
        assert!(!names(&at_c1).contains(&"a.txt"));

        let at_c2 = fx.service.list_dir(&c2, "/").unwrap();
        assert!(at_c2.contains(&TreeEntryInfo {
            name: "a.txt".into(),
            mode: FileMode::Regular,
        }));

        assert_eq!(fx.service.get_file(&c2, "a.txt").unwrap(), b"hello");
        let attrs = fx.service.get_attributes(&c2, "a.txt").unwrap();
        assert_eq!(attrs.mode, FileMode::Regular);
        assert_eq!(attrs.size, 5);
    }

    #[test]
    fn commits_are_newest_first() {
        let (fx, c1, c2) = two_commits();
        let commits: Vec<String> = fx
            .service
            .list_commits()
            .unwrap()
            .into_iter()
            .map(|h| h.to_string())
            .collect();
        assert_eq!(commits, vec![c2, c1]);
    }

    #[test]
    fn every_listed_commit_has_a_root_directory() {
        let (fx, _) = layered();
        let commits = fx.service.list_commits().unwrap();
        assert_eq!(commits.len(), 5);
        for hash in commits {
            for root in ["", "/"] {
                let attrs = fx.service.get_attributes(hash.as_str(), root).unwrap();
                assert_eq!(attrs.mode, FileMode::Directory);
                assert_eq!(attrs.size, 0);
            }
        }
    }

    #[test]
    fn list_dir_returns_direct_children_only() {
        let (fx, head) = layered();

        let root = fx.service.list_dir(&head, "").unwrap();
        let mut root_names = names(&root);
        root_names.sort();
        assert_eq!(root_names, vec!["README.md", "docs", "run.sh", "src"]);

        for path in ["src", "/src", "src/", "/src/"] {
            let src = fx.service.list_dir(&head, path).unwrap();
            let mut src_names = names(&src);
            src_names.sort();
            assert_eq!(src_names, vec!["deep", "lib.rs"], "path {path:?}");
        }

        for path in ["", "src", "src/deep"] {
            for entry in fx.service.list_dir(&head, path).unwrap() {
                assert!(!entry.name.contains('/'), "{path:?} yielded {entry:?}");
            }
        }
    }

    #[test]
    fn modes_are_translated() {
        let (fx, head) = layered();
        let mode = |path: &str| fx.service.get_attributes(&head, path).unwrap().mode;
        assert_eq!(mode("src"), FileMode::Directory);
        assert_eq!(mode("src/lib.rs"), FileMode::Regular);
        assert_eq!(mode("run.sh"), FileMode::Executable);
        assert_eq!(mode("docs"), FileMode::Symlink);

        let link = fx.service.get_attributes(&head, "docs").unwrap();
        assert_eq!(link.size, 3);
        assert_eq!(fx.service.get_file(&head, "docs").unwrap(), b"src");
    }

    #[test]
    fn attributes_carry_commit_times() {
        let (fx, c1, c2) = two_commits();
        let first = fx.service.get_attributes(&c1, "README.md").unwrap();
        let second = fx.service.get_attributes(&c2, "README.md").unwrap();
        assert!(first.commit_time < second.commit_time);
        assert_eq!(first.author_time, first.commit_time);
    }

    #[test]
    fn unknown_inputs_are_not_found() {
        let (fx, _, c2) = two_commits();
        let unknown = "a".repeat(40);

        let cases = [
            fx.service.get_attributes(&unknown, "").map(|_| ()),
            fx.service.get_attributes("not-a-hash", "").map(|_| ()),
            fx.service.get_attributes(&c2, "missing.txt").map(|_| ()),
            fx.service.list_dir(&unknown, "/").map(|_| ()),
            fx.service.get_file(&unknown, "a.txt").map(|_| ()),
            fx.service.get_file(&c2, "missing.txt").map(|_| ()),
        ];
        for (i, result) in cases.into_iter().enumerate() {
            assert!(
                matches!(result, Err(Status::NotFound(_))),
                "case {i}: {result:?}"
            );
        }
    }

    #[test]
    fn branches_follow_pulls() {
        let (fx, c1, c2) = two_commits();
        let main = commitfs::core::types::BranchName::new("main").unwrap();
        assert_eq!(fx.service.list_branches().unwrap()[&main].as_str(), c2);

        fx.upstream.reset_branch("main", &c1);
        fx.pull_main();
        assert_eq!(fx.service.list_branches().unwrap()[&main].as_str(), c1);
    }
}

mod resolver {
    use super::*;

    #[test]
    fn branch_symlink_targets_listed_commit() {
        let (fx, _, c2) = two_commits();
        let resolver = fx.resolver();
        let main = commitfs::core::types::BranchName::new("main").unwrap();
        let expected = format!("../commits/{}", fx.service.list_branches().unwrap()[&main]);

        assert_eq!(resolver.read_symlink_target("/branches/main").unwrap(), expected);
        assert_eq!(expected, format!("../commits/{c2}"));

        let attr = resolver.attributes("/branches/main").unwrap();
        assert_eq!(attr.kind, NodeKind::Symlink);
        assert!(resolver
            .list_directory("/branches")
            .unwrap()
            .contains(&DirEntry::Symlink {
                name: "main".into(),
                target: expected,
            }));
    }

    #[test]
    fn branch_target_is_never_cached() {
        let (fx, c1, c2) = two_commits();
        let resolver = fx.resolver();
        assert_eq!(
            resolver.read_symlink_target("/branches/main").unwrap(),
            format!("../commits/{c2}")
        );

        fx.upstream.reset_branch("main", &c1);
        fx.pull_main();
        assert_eq!(
            resolver.read_symlink_target("/branches/main").unwrap(),
            format!("../commits/{c1}")
        );
    }

    #[test]
    fn walks_a_commit_tree() {
        let (fx, head) = layered();
        let resolver = fx.resolver();

        let root = format!("/commits/{head}");
        assert_eq!(resolver.attributes(&root).unwrap().kind, NodeKind::Directory);

        let script = resolver.attributes(&format!("{root}/run.sh")).unwrap();
        assert_eq!((script.kind, script.perm), (NodeKind::File, 0o555));
        let lib = resolver.attributes(&format!("{root}/src/lib.rs")).unwrap();
        assert_eq!((lib.kind, lib.perm), (NodeKind::File, 0o444));
        assert!(lib.author_time.is_some());

        assert_eq!(
            &*resolver.read(&format!("{root}/src/deep/inner.rs")).unwrap(),
            b"// inner\n"
        );
        assert_eq!(
            resolver.read_symlink_target(&format!("{root}/docs")).unwrap(),
            "src"
        );
        assert!(matches!(
            resolver.read(&format!("{root}/src")),
            Err(FsError::IsDirectory(_)) | Err(FsError::NotFound(_))
        ));

        let listed: Vec<String> = resolver
            .list_directory("/commits")
            .unwrap()
            .into_iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(listed.first(), Some(&head));
    }

    #[test]
    fn missing_things_are_enoent() {
        let (fx, _, c2) = two_commits();
        let resolver = fx.resolver();

        for path in [
            format!("/commits/{}", "g".repeat(40)),
            format!("/commits/{}", "a".repeat(40)),
            format!("/commits/{c2}/missing.txt"),
            "/branches/nope".to_string(),
            "/elsewhere".to_string(),
        ] {
            let err = resolver.attributes(&path).unwrap_err();
            assert_eq!(err.errno(), libc::ENOENT, "{path}: {err:?}");
        }
    }

    #[test]
    fn mutations_are_erofs() {
        let (fx, _, c2) = two_commits();
        let resolver = fx.resolver();
        let path = format!("/commits/{c2}/a.txt");
        assert_eq!(
            resolver.access(&path, libc::W_OK).unwrap_err().errno(),
            libc::EROFS
        );
        resolver.access(&path, libc::R_OK).unwrap();
        assert!(resolver.list_xattr(&path).unwrap().is_empty());
    }
}
