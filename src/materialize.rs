//! Round-tripping resources through the real filesystem for external tools.
//!
//! Everything handed out here is an RAII guard ([`tempfile::TempPath`], [`tempfile::TempDir`]):
//! the on-disk copy disappears when the guard drops, whether the operation finished, failed, or
//! its future was cancelled. Directory walks and bulk writes run on tokio's blocking pool.

use crate::error::{Error, IoContext, Result};
use crate::fs_tree::{EntryKind, FsEntry, FsTree, SpecialFile};
use crate::resource::ContainerResource;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use walkdir::WalkDir;

const TEMP_PREFIX: &str = "recompose-";

/// What to do with a special entry the host cannot recreate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialEntryPolicy {
    /// Leave it out of the directory, log a warning and record it in the [`FlushReport`].
    #[default]
    Skip,
    /// Abort the flush with [`Error::Materialization`].
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub skipped: Vec<SkippedEntry>,
}

/// A tree written out to a transient directory.
#[derive(Debug)]
pub struct FlushedTree {
    dir: TempDir,
    pub report: FlushReport,
}

impl FlushedTree {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Writes the resource's current content, queued patches included, to a uniquely named
/// temporary file.
///
/// `suffix` matters to tools that sniff the format from the extension. The file is removed when
/// the returned guard is dropped. The guard is created and filled on the blocking pool and only
/// handed back once the write has finished, so a cancelled call still removes the file.
pub async fn with_content_as_file(
    resource: &ContainerResource,
    suffix: Option<&str>,
) -> Result<TempPath> {
    let content = resource.current_content()?.into_owned();
    let suffix = suffix.unwrap_or("").to_string();

    let path = blocking(move || {
        let path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix)
            .tempfile()
            .io_context("Failed to create temporary file")?
            .into_temp_path();
        fs::write(&path, &content)
            .with_io_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    })
    .await?;

    debug!(
        "Materialized {} ({} bytes) at {}",
        resource.name(),
        resource.pending_length(),
        path.display()
    );
    Ok(path)
}

/// Creates a fresh, empty transient directory for a tool to write into.
pub fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir()
        .io_context("Failed to create temporary directory")
}

/// Serializes the resource's child tree into a transient directory.
pub async fn flush_tree_to_directory(
    resource: &ContainerResource,
    policy: SpecialEntryPolicy,
) -> Result<FlushedTree> {
    let tree = resource.tree().ok_or(Error::NotUnpacked)?.clone();
    flush_into(tree, std::env::temp_dir(), policy).await
}

/// The directory guard lives inside the blocking task so it is dropped after the last write,
/// even when the awaiting future is cancelled.
async fn flush_into(tree: FsTree, parent: PathBuf, policy: SpecialEntryPolicy) -> Result<FlushedTree> {
    blocking(move || {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&parent)
            .io_context("Failed to create temporary directory")?;
        let report = write_tree_to(&tree, dir.path(), policy)?;
        Ok(FlushedTree { dir, report })
    })
    .await
}

/// Replaces the resource's child tree with one mirroring `dir` exactly.
pub async fn load_tree_from_directory(resource: &mut ContainerResource, dir: &Path) -> Result<()> {
    let tree = read_tree(dir).await?;
    resource.set_tree(tree);
    Ok(())
}

/// Walks `dir` into a new tree without touching any resource.
pub async fn read_tree(dir: &Path) -> Result<FsTree> {
    let dir = dir.to_path_buf();
    blocking(move || load_tree(&dir)).await
}

impl ContainerResource {
    pub async fn initialize_from_disk(&mut self, dir: &Path) -> Result<()> {
        load_tree_from_directory(self, dir).await
    }

    pub async fn flush_to_disk(&self) -> Result<FlushedTree> {
        flush_tree_to_directory(self, SpecialEntryPolicy::default()).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::io("Filesystem task failed", std::io::Error::other(e)))?
}

/// Writes `tree` below `root`, which must already exist.
///
/// Directory permissions are applied last so read-only directories can still be populated.
pub fn write_tree_to(tree: &FsTree, root: &Path, policy: SpecialEntryPolicy) -> Result<FlushReport> {
    let mut report = FlushReport::default();
    let mut dir_modes = Vec::new();

    for (rel, entry) in tree.iter() {
        let dest = root.join(rel);
        match &entry.kind {
            EntryKind::Directory => {
                fs::create_dir_all(&dest)
                    .with_io_context(|| format!("Failed to create directory: {}", dest.display()))?;
                if let Some(mode) = entry.mode {
                    dir_modes.push((dest, mode));
                }
            }
            EntryKind::File { data } => {
                fs::write(&dest, data)
                    .with_io_context(|| format!("Failed to write file: {}", dest.display()))?;
                set_mode(&dest, entry.mode);
            }
            EntryKind::Special(special) => {
                if let Err(reason) = create_special(&dest, special, entry.mode) {
                    match policy {
                        SpecialEntryPolicy::Skip => {
                            warn!(
                                "Skipping {} {}: {}",
                                special.kind_name(),
                                rel.display(),
                                reason
                            );
                            report.skipped.push(SkippedEntry {
                                path: rel.to_path_buf(),
                                reason,
                            });
                        }
                        SpecialEntryPolicy::Fail => {
                            return Err(Error::Materialization {
                                path: rel.to_path_buf(),
                                reason,
                            });
                        }
                    }
                }
            }
        }
    }

    for (dest, mode) in dir_modes.into_iter().rev() {
        set_mode(&dest, Some(mode));
    }

    debug!(
        "Flushed {} entries to {} ({} skipped)",
        tree.len(),
        root.display(),
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            warn!("Failed to set permissions on {}: {}", path.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) {}

#[cfg(unix)]
fn create_special(
    dest: &Path,
    special: &SpecialFile,
    mode: Option<u32>,
) -> std::result::Result<(), String> {
    use nix::sys::stat::{mknod, Mode, SFlag};

    let perm = Mode::from_bits_truncate(mode.unwrap_or(0o644) as nix::libc::mode_t);
    match special {
        SpecialFile::Symlink { target } => {
            std::os::unix::fs::symlink(target, dest).map_err(|e| e.to_string())
        }
        SpecialFile::Fifo => nix::unistd::mkfifo(dest, perm).map_err(|e| e.to_string()),
        SpecialFile::CharDevice { major, minor } => {
            mknod(dest, SFlag::S_IFCHR, perm, join_dev(*major, *minor)).map_err(|e| e.to_string())
        }
        SpecialFile::BlockDevice { major, minor } => {
            mknod(dest, SFlag::S_IFBLK, perm, join_dev(*major, *minor)).map_err(|e| e.to_string())
        }
        SpecialFile::Socket => Err("sockets cannot be recreated from a tree".to_string()),
    }
}

#[cfg(not(unix))]
fn create_special(
    _dest: &Path,
    special: &SpecialFile,
    _mode: Option<u32>,
) -> std::result::Result<(), String> {
    Err(format!("{} entries are not supported on this host", special.kind_name()))
}

#[cfg(target_os = "linux")]
fn join_dev(major: u64, minor: u64) -> nix::libc::dev_t {
    (((major & 0xffff_f000) << 32)
        | ((major & 0x0000_0fff) << 8)
        | ((minor & 0xffff_ff00) << 12)
        | (minor & 0x0000_00ff)) as nix::libc::dev_t
}

#[cfg(target_os = "linux")]
fn split_dev(dev: u64) -> (u64, u64) {
    let major = ((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff);
    let minor = ((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff);
    (major, minor)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn join_dev(major: u64, minor: u64) -> nix::libc::dev_t {
    (((major & 0xff) << 24) | (minor & 0x00ff_ffff)) as nix::libc::dev_t
}

#[cfg(all(unix, not(target_os = "linux")))]
fn split_dev(dev: u64) -> (u64, u64) {
    ((dev >> 24) & 0xff, dev & 0x00ff_ffff)
}

/// Builds a tree mirroring everything below `dir`. Symlinks are recorded, never followed.
pub fn load_tree(dir: &Path) -> Result<FsTree> {
    let mut tree = FsTree::new();

    for item in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = item.map_err(|e| Error::Materialization {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            reason: e.to_string(),
        })?;
        let path = item.path();
        let rel = path.strip_prefix(dir).map_err(|_| Error::Materialization {
            path: path.to_path_buf(),
            reason: format!("not below {}", dir.display()),
        })?;
        let metadata = item
            .metadata()
            .map_err(|e| Error::Materialization {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let entry = entry_from_disk(path, &metadata)?;
        tree.insert(rel, entry)?;
    }

    debug!("Loaded {} entries from {}", tree.len(), dir.display());
    Ok(tree)
}

fn entry_from_disk(path: &Path, metadata: &fs::Metadata) -> Result<FsEntry> {
    let file_type = metadata.file_type();
    let entry = if file_type.is_dir() {
        FsEntry::directory()
    } else if file_type.is_file() {
        let data =
            fs::read(path).with_io_context(|| format!("Failed to read file: {}", path.display()))?;
        FsEntry::file(data)
    } else if file_type.is_symlink() {
        let target = fs::read_link(path)
            .with_io_context(|| format!("Failed to read symlink: {}", path.display()))?;
        FsEntry::special(SpecialFile::Symlink { target })
    } else {
        FsEntry::special(other_special(path, metadata)?)
    };
    Ok(with_disk_mode(entry, metadata))
}

#[cfg(unix)]
fn other_special(path: &Path, metadata: &fs::Metadata) -> Result<SpecialFile> {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let file_type = metadata.file_type();
    if file_type.is_fifo() {
        Ok(SpecialFile::Fifo)
    } else if file_type.is_char_device() {
        let (major, minor) = split_dev(metadata.rdev());
        Ok(SpecialFile::CharDevice { major, minor })
    } else if file_type.is_block_device() {
        let (major, minor) = split_dev(metadata.rdev());
        Ok(SpecialFile::BlockDevice { major, minor })
    } else if file_type.is_socket() {
        Ok(SpecialFile::Socket)
    } else {
        Err(Error::Materialization {
            path: path.to_path_buf(),
            reason: "unknown file type".to_string(),
        })
    }
}

#[cfg(not(unix))]
fn other_special(path: &Path, _metadata: &fs::Metadata) -> Result<SpecialFile> {
    Err(Error::Materialization {
        path: path.to_path_buf(),
        reason: "unknown file type".to_string(),
    })
}

#[cfg(unix)]
fn with_disk_mode(entry: FsEntry, metadata: &fs::Metadata) -> FsEntry {
    use std::os::unix::fs::PermissionsExt;
    if metadata.file_type().is_symlink() {
        return entry;
    }
    entry.with_mode(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn with_disk_mode(entry: FsEntry, _metadata: &fs::Metadata) -> FsEntry {
    entry
}
