//! The decoded, editable view of a container: a tree of files, directories and special entries.
//!
//! Entries are keyed by their normalized path relative to the container root and kept in sorted
//! order, so a directory's children are the ordered range of keys below it. Every insertion
//! goes through [`normalize_member_path`]; nothing that resolves outside the root can be stored.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes an archive member path relative to the container root.
///
/// `.` components are dropped and `..` pops the previous component. A `..` with nothing left to
/// pop, a rooted path, or a drive prefix would land outside the root and is rejected with
/// [`Error::UnsafeMemberPath`]. An empty result means the root itself.
pub fn normalize_member_path(member: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    let mut escape = false;

    for comp in member.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    escape = true;
                    break;
                }
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {
                escape = true;
                break;
            }
        }
    }

    if escape {
        return Err(Error::UnsafeMemberPath {
            member: member.display().to_string(),
            normalized: escaped_form(member),
        });
    }
    Ok(out)
}

/// The form an escaping member takes relative to the root, for error messages.
fn escaped_form(member: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut ups = 0usize;
    for comp in member.components() {
        match comp {
            Component::ParentDir => {
                if parts.pop().is_none() {
                    ups += 1;
                }
            }
            Component::Normal(c) => parts.push(c.to_string_lossy().into_owned()),
            Component::RootDir => parts.clear(),
            Component::CurDir | Component::Prefix(_) => {}
        }
    }
    if member.has_root() {
        return format!("/{}", parts.join("/"));
    }
    let mut segments = vec!["..".to_string(); ups];
    segments.extend(parts);
    segments.join("/")
}

/// Type-specific data of an entry that is neither a regular file nor a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialFile {
    Symlink { target: PathBuf },
    Fifo,
    CharDevice { major: u64, minor: u64 },
    BlockDevice { major: u64, minor: u64 },
    Socket,
}

impl SpecialFile {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SpecialFile::Symlink { .. } => "symlink",
            SpecialFile::Fifo => "fifo",
            SpecialFile::CharDevice { .. } => "character device",
            SpecialFile::BlockDevice { .. } => "block device",
            SpecialFile::Socket => "socket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File { data: Vec<u8> },
    Directory,
    Special(SpecialFile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub kind: EntryKind,
    /// Unix permission bits, when known.
    pub mode: Option<u32>,
}

impl FsEntry {
    pub fn file(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: EntryKind::File { data: data.into() },
            mode: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            mode: None,
        }
    }

    pub fn special(special: SpecialFile) -> Self {
        Self {
            kind: EntryKind::Special(special),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// File contents; `None` for directories and special entries.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::File { data } => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsTree {
    entries: BTreeMap<PathBuf, FsEntry>,
}

impl FsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry` at `path`, creating missing parent directories.
    ///
    /// Replaces any entry already stored at that path. A directory replaced by anything other
    /// than a directory takes its subtree with it. Fails if the path escapes the root, is the
    /// root itself, or has a non-directory entry as an ancestor.
    pub fn insert(&mut self, path: impl AsRef<Path>, entry: FsEntry) -> Result<()> {
        let path = path.as_ref();
        let normalized = normalize_member_path(path)?;
        if normalized.as_os_str().is_empty() {
            return Err(Error::Materialization {
                path: path.to_path_buf(),
                reason: "entry path refers to the container root".to_string(),
            });
        }

        let mut ancestors: Vec<&Path> = normalized.ancestors().skip(1).collect();
        ancestors.pop(); // the empty root
        for ancestor in ancestors.into_iter().rev() {
            match self.entries.get(ancestor) {
                Some(existing) if !existing.is_dir() => {
                    return Err(Error::Materialization {
                        path: normalized.clone(),
                        reason: format!("parent {} is not a directory", ancestor.display()),
                    });
                }
                Some(_) => {}
                None => {
                    self.entries
                        .insert(ancestor.to_path_buf(), FsEntry::directory());
                }
            }
        }

        let replaces_dir = self.entries.get(&normalized).is_some_and(FsEntry::is_dir);
        if replaces_dir && !entry.is_dir() {
            self.entries
                .retain(|p, _| p == &normalized || !p.starts_with(&normalized));
        }
        self.entries.insert(normalized, entry);
        Ok(())
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> Result<()> {
        self.insert(path, FsEntry::file(data))
    }

    pub fn add_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.insert(path, FsEntry::directory())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&FsEntry> {
        let normalized = normalize_member_path(path.as_ref()).ok()?;
        self.entries.get(&normalized)
    }

    pub fn get_mut(&mut self, path: impl AsRef<Path>) -> Option<&mut FsEntry> {
        let normalized = normalize_member_path(path.as_ref()).ok()?;
        self.entries.get_mut(&normalized)
    }

    /// Removes an entry and, for directories, everything below it.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<FsEntry> {
        let normalized = normalize_member_path(path.as_ref()).ok()?;
        let removed = self.entries.remove(&normalized)?;
        if removed.is_dir() {
            self.entries.retain(|p, _| !p.starts_with(&normalized));
        }
        Some(removed)
    }

    /// Direct children of `dir` in path order. The empty path lists top-level entries.
    pub fn children<'a>(
        &'a self,
        dir: &'a Path,
    ) -> impl Iterator<Item = (&'a Path, &'a FsEntry)> + 'a {
        self.entries
            .iter()
            .filter(move |(p, _)| p.parent() == Some(dir))
            .map(|(p, e)| (p.as_path(), e))
    }

    /// All entries, parents before children.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &FsEntry)> {
        self.entries.iter().map(|(p, e)| (p.as_path(), e))
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &FsEntry)> {
        self.iter().filter(|(_, e)| e.is_file())
    }

    pub fn directories(&self) -> impl Iterator<Item = (&Path, &FsEntry)> {
        self.iter().filter(|(_, e)| e.is_dir())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
