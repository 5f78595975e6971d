//! cli::commands::inspect
//!
//! Browse the virtual tree without mounting it: `ls`, `cat`, `stat`.
//!
//! These go through the same resolver a mount uses, so they show exactly
//! what a filesystem client would see.

use std::io::Write;

use anyhow::{Context as _, Result};

use super::Context;
use crate::cli::args::ClientArgs;
use crate::fs::{DirEntry, FsAttr, NodeKind};

fn kind_char(kind: NodeKind) -> char {
    match kind {
        NodeKind::Directory => 'd',
        NodeKind::File => '-',
        NodeKind::Symlink => 'l',
    }
}

/// `drwxr-xr-x` style rendering of kind and permission bits.
fn mode_string(kind: NodeKind, perm: u16) -> String {
    let mut out = String::with_capacity(10);
    out.push(kind_char(kind));
    for shift in [6, 3, 0] {
        let bits = (perm >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Run the ls command.
pub fn ls(ctx: &Context, path: &str, long: bool, client: &ClientArgs) -> Result<()> {
    let resolver = super::resolver(ctx, client)?;
    let entries = resolver
        .list_directory(path)
        .with_context(|| format!("Cannot list {path}"))?;

    let mut out = std::io::stdout().lock();
    for entry in &entries {
        match (long, entry) {
            (false, entry) => writeln!(out, "{}", entry.name())?,
            (true, DirEntry::Symlink { name, target }) => {
                writeln!(out, "{} {name} -> {target}", mode_string(NodeKind::Symlink, 0o555))?
            }
            (true, DirEntry::Node { name, kind }) => {
                writeln!(out, "{} {name}", kind_char(*kind))?
            }
        }
    }
    Ok(())
}

/// Run the cat command.
pub fn cat(ctx: &Context, path: &str, client: &ClientArgs) -> Result<()> {
    let resolver = super::resolver(ctx, client)?;
    let contents = resolver
        .read(path)
        .with_context(|| format!("Cannot read {path}"))?;

    let mut out = std::io::stdout().lock();
    out.write_all(&contents)?;
    out.flush()?;
    Ok(())
}

/// Run the stat command.
pub fn stat(ctx: &Context, path: &str, client: &ClientArgs) -> Result<()> {
    let resolver = super::resolver(ctx, client)?;
    let attr = resolver
        .attributes(path)
        .with_context(|| format!("Cannot stat {path}"))?;
    let target = if attr.kind == NodeKind::Symlink {
        Some(resolver.read_symlink_target(path)?)
    } else {
        None
    };
    print!("{}", render_stat(path, &attr, target.as_deref()));
    Ok(())
}

fn render_stat(path: &str, attr: &FsAttr, target: Option<&str>) -> String {
    let mut out = String::new();
    match target {
        Some(target) => out.push_str(&format!("  File: {path} -> {target}\n")),
        None => out.push_str(&format!("  File: {path}\n")),
    }
    out.push_str(&format!(
        "  Size: {}\n  Mode: ({:04o}/{})\n",
        attr.size,
        attr.perm,
        mode_string(attr.kind, attr.perm)
    ));
    if let Some(author) = attr.author_time {
        out.push_str(&format!("Author: {}\n", author.to_rfc3339()));
    }
    if let Some(commit) = attr.commit_time {
        out.push_str(&format!("Commit: {}\n", commit.to_rfc3339()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings() {
        assert_eq!(mode_string(NodeKind::Directory, 0o555), "dr-xr-xr-x");
        assert_eq!(mode_string(NodeKind::File, 0o444), "-r--r--r--");
        assert_eq!(mode_string(NodeKind::Symlink, 0o555), "lr-xr-xr-x");
    }

    #[test]
    fn stat_without_times() {
        let attr = FsAttr {
            kind: NodeKind::Directory,
            perm: 0o555,
            size: 0,
            author_time: None,
            commit_time: None,
        };
        let rendered = render_stat("/commits", &attr, None);
        assert_eq!(
            rendered,
            "  File: /commits\n  Size: 0\n  Mode: (0555/dr-xr-xr-x)\n"
        );
    }
}
