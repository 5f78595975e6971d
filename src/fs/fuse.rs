//! fs::fuse
//!
//! Kernel adapter: [`fuser::Filesystem`] over [`VirtualPathResolver`].
//!
//! # Architecture
//!
//! - `InodeTable`: inode <-> mount path mapping with kernel lookup counts;
//!   an entry is dropped once the kernel forgets it
//! - [`CommitFs`]: the filesystem; every call resolves its inode to a path
//!   and asks the resolver
//!
//! Open files hold their full content, fetched once at `open`; `read`
//! slices it by offset. All mutations reply `EROFS`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, ReplyXattr, Request,
    TimeOrNow, FUSE_ROOT_ID,
};
use tracing::{debug, info};

use super::{FsAttr, FsError, Mutation, NodeKind, VirtualPathResolver};

/// Cache lifetimes handed to the kernel.
#[derive(Debug, Clone, Copy)]
pub struct Ttls {
    /// Lifetime of positive entries and attributes.
    pub entry: Duration,
    /// Lifetime of "no such entry" answers.
    pub negative: Duration,
}

#[derive(Debug)]
struct Node {
    path: String,
    lookups: u64,
}

/// Inode <-> path mapping for the entries the kernel holds.
///
/// Only `lookup` registers a path. Inode numbers are never reused, and the
/// root is never forgotten.
#[derive(Debug)]
struct InodeTable {
    nodes: HashMap<u64, Node>,
    inodes: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            nodes: HashMap::new(),
            inodes: HashMap::new(),
            next: FUSE_ROOT_ID + 1,
        };
        table.nodes.insert(
            FUSE_ROOT_ID,
            Node {
                path: "/".to_string(),
                lookups: 1,
            },
        );
        table.inodes.insert("/".to_string(), FUSE_ROOT_ID);
        table
    }

    fn path(&self, ino: u64) -> Option<&str> {
        self.nodes.get(&ino).map(|node| node.path.as_str())
    }

    /// Inode for `path`, counting one kernel lookup.
    fn lookup(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.lookups += 1;
            }
            return ino;
        }
        let ino = self.fresh();
        self.nodes.insert(
            ino,
            Node {
                path: path.to_string(),
                lookups: 1,
            },
        );
        self.inodes.insert(path.to_string(), ino);
        ino
    }

    /// Inode to report in a directory listing. Unknown paths get an
    /// unregistered number; the kernel looks them up before use.
    fn listed(&mut self, path: &str) -> u64 {
        match self.inodes.get(path) {
            Some(&ino) => ino,
            None => self.fresh(),
        }
    }

    /// Drop `nlookup` lookups of `ino`, and the entry once none remain.
    fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        let Some(node) = self.nodes.get_mut(&ino) else {
            return;
        };
        node.lookups = node.lookups.saturating_sub(nlookup);
        if node.lookups == 0 {
            if let Some(node) = self.nodes.remove(&ino) {
                self.inodes.remove(&node.path);
            }
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn fresh(&mut self) -> u64 {
        let ino = self.next;
        self.next += 1;
        ino
    }
}

fn child_path(parent: &str, name: &OsStr) -> String {
    let name = name.to_string_lossy();
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
        NodeKind::Symlink => FileType::Symlink,
    }
}

/// The mounted filesystem.
pub struct CommitFs {
    resolver: VirtualPathResolver,
    ttls: Ttls,
    inodes: InodeTable,
    open_files: HashMap<u64, Arc<[u8]>>,
    next_fh: u64,
}

impl CommitFs {
    pub fn new(resolver: VirtualPathResolver, ttls: Ttls) -> Self {
        Self {
            resolver,
            ttls,
            inodes: InodeTable::new(),
            open_files: HashMap::new(),
            next_fh: 1,
        }
    }

    /// Mount read-only at `mount_point` and serve until unmounted.
    pub fn mount(self, mount_point: &Path) -> std::io::Result<()> {
        info!(mount_point = %mount_point.display(), "mounting");
        let options = [
            MountOption::RO,
            MountOption::FSName("commitfs".to_string()),
            MountOption::DefaultPermissions,
        ];
        fuser::mount2(self, mount_point, &options)
    }

    /// Attributes owned by the calling user.
    fn file_attr(req: &Request<'_>, ino: u64, attr: &FsAttr) -> FileAttr {
        let mtime = attr
            .author_time
            .map(SystemTime::from)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let ctime = attr.commit_time.map(SystemTime::from).unwrap_or(mtime);
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime,
            crtime: ctime,
            kind: file_type(attr.kind),
            perm: attr.perm,
            nlink: if attr.kind == NodeKind::Directory { 2 } else { 1 },
            uid: req.uid(),
            gid: req.gid(),
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, FsError> {
        self.inodes
            .path(ino)
            .map(str::to_string)
            .ok_or_else(|| FsError::NotFound(format!("inode {ino}")))
    }

    fn reject_at(&self, mutation: Mutation, parent: u64, name: &OsStr) -> i32 {
        let path = self
            .inodes
            .path(parent)
            .map(|p| child_path(p, name))
            .unwrap_or_default();
        self.resolver.reject(mutation, &path).errno()
    }

    fn reject_ino(&self, mutation: Mutation, ino: u64) -> i32 {
        let path = self.inodes.path(ino).unwrap_or_default().to_string();
        self.resolver.reject(mutation, &path).errno()
    }
}

impl Filesystem for CommitFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent_path = match self.path_of(parent) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        let path = child_path(&parent_path, name);
        match self.resolver.attributes(&path) {
            Ok(attr) => {
                let ino = self.inodes.lookup(&path);
                reply.entry(&self.ttls.entry, &Self::file_attr(req, ino, &attr), 0);
            }
            Err(FsError::NotFound(_)) if !self.ttls.negative.is_zero() => {
                // Inode 0 caches the miss for the negative TTL.
                let attr = FsAttr {
                    kind: NodeKind::File,
                    perm: 0,
                    size: 0,
                    author_time: None,
                    commit_time: None,
                };
                reply.entry(&self.ttls.negative, &Self::file_attr(req, 0, &attr), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.resolver.attributes(&path));
        match result {
            Ok(attr) => reply.attr(&self.ttls.entry, &Self::file_attr(req, ino, &attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.resolver.read_symlink_target(&path));
        match result {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return reply.error(self.reject_ino(Mutation::Write, ino));
        }
        let result = self.path_of(ino).and_then(|path| self.resolver.read(&path));
        match result {
            Ok(contents) => {
                let fh = self.next_fh;
                self.next_fh += 1;
                self.open_files.insert(fh, contents);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(contents) = self.open_files.get(&fh) else {
            return reply.error(libc::EBADF);
        };
        let start = usize::try_from(offset).unwrap_or(0).min(contents.len());
        let end = start.saturating_add(size as usize).min(contents.len());
        reply.data(&contents[start..end]);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.open_files.remove(&fh);
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        let entries = match self.resolver.list_directory(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };

        let parent = self
            .inodes
            .path(ino)
            .and_then(|p| p.rsplit_once('/'))
            .map(|(p, _)| if p.is_empty() { "/".to_string() } else { p.to_string() })
            .unwrap_or_else(|| "/".to_string());
        let parent_ino = self.inodes.listed(&parent);

        let mut listing = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let child = child_path(&path, OsStr::new(entry.name()));
            let child_ino = self.inodes.listed(&child);
            listing.push((child_ino, file_type(entry.kind()), entry.name().to_string()));
        }

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child_ino, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.resolver.get_xattr(&path, &name.to_string_lossy()));
        match result {
            Ok(value) if size == 0 => reply.size(value.len() as u32),
            Ok(value) if value.len() > size as usize => reply.error(libc::ERANGE),
            Ok(value) => reply.data(&value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.resolver.list_xattr(&path));
        match result {
            Ok(names) => {
                let mut buf = Vec::new();
                for name in names {
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(0);
                }
                if size == 0 {
                    reply.size(buf.len() as u32);
                } else if buf.len() > size as usize {
                    reply.error(libc::ERANGE);
                } else {
                    reply.data(&buf);
                }
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.resolver.access(&path, mask));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mutation = if mode.is_some() {
            Mutation::Chmod
        } else if uid.is_some() {
            Mutation::Chown
        } else if size.is_some() {
            Mutation::Truncate
        } else {
            Mutation::Utime
        };
        reply.error(self.reject_ino(mutation, ino));
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject_at(Mutation::Mknod, parent, name));
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject_at(Mutation::Mkdir, parent, name));
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.reject_at(Mutation::Unlink, parent, name));
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.reject_at(Mutation::Rmdir, parent, name));
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject_at(Mutation::Symlink, parent, link_name));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.reject_at(Mutation::Rename, parent, name));
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject_at(Mutation::Link, newparent, newname));
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(self.reject_ino(Mutation::Write, ino));
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(self.reject_at(Mutation::Create, parent, name));
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.reject_ino(Mutation::SetXattr, ino));
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.reject_ino(Mutation::RemoveXattr, ino));
    }

    fn destroy(&mut self) {
        debug!(
            open_files = self.open_files.len(),
            inodes = self.inodes.len(),
            "unmounted"
        );
    }
}
