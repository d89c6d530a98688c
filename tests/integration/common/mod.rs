//! Common utilities for integration tests

use anyhow::Result;
use recompose::tool::ExternalTool;
use recompose::FsTree;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Builds an in-memory tar archive from `(path, content)` pairs. Paths ending in `/` become
/// directories.
pub fn build_tar(entries: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut builder = tar_rs::Builder::new(Vec::new());
    for (path, content) in entries {
        let mut header = tar_rs::Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(tar_rs::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
        } else {
            header.set_entry_type(tar_rs::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(content.len() as u64);
        }
        header.set_mtime(1_700_000_000);
        builder.append_data(&mut header, path, content.as_bytes())?;
    }
    Ok(builder.into_inner()?)
}

/// Builds a single-member archive whose member name is written verbatim, bypassing the
/// `tar` crate's own path checks.
pub fn build_tar_with_raw_name(name: &[u8], content: &[u8]) -> Result<Vec<u8>> {
    let mut header = tar_rs::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_entry_type(tar_rs::EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(content.len() as u64);
    header.set_mtime(1_700_000_000);
    header.set_cksum();

    let mut builder = tar_rs::Builder::new(Vec::new());
    builder.append(&header, content)?;
    Ok(builder.into_inner()?)
}

/// File paths mapped to contents, plus the directory set, for tree comparisons.
pub fn tree_summary(tree: &FsTree) -> (BTreeMap<PathBuf, Vec<u8>>, Vec<PathBuf>) {
    let files = tree
        .files()
        .map(|(path, entry)| (path.to_path_buf(), entry.data().unwrap_or_default().to_vec()))
        .collect();
    let dirs = tree.directories().map(|(path, _)| path.to_path_buf()).collect();
    (files, dirs)
}

/// Writes an executable shell script and returns a descriptor pointing at it.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, check_arg: &str, body: &str) -> Result<ExternalTool> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(ExternalTool::new(name, "https://example.com", check_arg).at_path(path))
}
