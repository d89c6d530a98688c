//! Tar archives, decoded and encoded with the system `tar`.
//!
//! Member names in a tar archive are attacker-controlled, so unpacking lists the archive first
//! and refuses it outright if any member would land outside the extraction root. Nothing is
//! extracted until every member has passed.

use crate::error::Result;
use crate::fs_tree::normalize_member_path;
use crate::materialize;
use crate::pack::{self, PackConfig, Packer};
use crate::process;
use crate::resource::{ContainerResource, ResourceTag};
use crate::signature::SignatureRegistryBuilder;
use crate::tool::ExternalTool;
use crate::unpack::{self, Unpacker};
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use std::path::PathBuf;

pub static TAR: Lazy<ExternalTool> = Lazy::new(|| {
    ExternalTool::new("tar", "https://www.gnu.org/software/tar/", "--help").apt_package("tar")
});

const TARGETS: &[ResourceTag] = &[ResourceTag::TarArchive];

pub fn register_signatures(builder: SignatureRegistryBuilder) -> SignatureRegistryBuilder {
    builder
        .register_mime(ResourceTag::TarArchive, "application/x-tar")
        .register_magic(ResourceTag::TarArchive, 257, b"ustar")
        .register_description(ResourceTag::TarArchive, |s| {
            s.to_lowercase().contains("tar archive")
        })
}

/// Turns one line of `tar -tf` output into a path without lossy conversion where possible.
fn member_path(line: &[u8]) -> PathBuf {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(std::ffi::OsStr::from_bytes(line))
    }

    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(line).into_owned())
    }
}

/// Checks every member of a `tar -P -tf` listing against the extraction root.
///
/// Fails with [`crate::Error::UnsafeMemberPath`] on the first member that is rooted or
/// normalizes to a parent-directory escape.
pub fn check_members(listing: &[u8]) -> Result<usize> {
    let mut count = 0;
    for line in listing.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        normalize_member_path(&member_path(line))?;
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct TarUnpacker {
    tar: ExternalTool,
}

impl TarUnpacker {
    pub fn new() -> Self {
        Self::with_tool(TAR.clone())
    }

    pub fn with_tool(tar: ExternalTool) -> Self {
        Self { tar }
    }
}

impl Default for TarUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Unpacker for TarUnpacker {
    fn name(&self) -> &'static str {
        "TarUnpacker"
    }

    fn targets(&self) -> &[ResourceTag] {
        TARGETS
    }

    fn external_dependencies(&self) -> Vec<&ExternalTool> {
        vec![&self.tar]
    }

    async fn unpack(&self, resource: &mut ContainerResource) -> Result<()> {
        let archive = materialize::with_content_as_file(resource, Some(".tar")).await?;

        // -P keeps leading slashes so rooted members are seen as they are
        let list = self.tar.command().arg("-P").arg("-tf").arg(&*archive);
        let listing = process::run_captured(&list).await?;
        let members = check_members(&listing)?;
        debug!("{}: {} members passed path checks", resource.name(), members);

        let out = materialize::scratch_dir()?;
        let extract = self
            .tar
            .command()
            .arg("--xattrs")
            .arg("-C")
            .arg(out.path())
            .arg("-xf")
            .arg(&*archive);
        process::run(&extract).await?;

        unpack::populate(resource, out.path()).await
    }
}

#[derive(Debug, Clone)]
pub struct TarPacker {
    tar: ExternalTool,
}

impl TarPacker {
    pub fn new() -> Self {
        Self::with_tool(TAR.clone())
    }

    pub fn with_tool(tar: ExternalTool) -> Self {
        Self { tar }
    }
}

impl Default for TarPacker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Packer for TarPacker {
    fn name(&self) -> &'static str {
        "TarPacker"
    }

    fn targets(&self) -> &[ResourceTag] {
        TARGETS
    }

    fn external_dependencies(&self, _config: &PackConfig) -> Vec<&ExternalTool> {
        vec![&self.tar]
    }

    async fn pack(&self, resource: &mut ContainerResource, config: &PackConfig) -> Result<()> {
        let flushed = materialize::flush_tree_to_directory(resource, config.special_entries).await?;

        let archive = pack::temp_artifact(".tar")?;
        let create = self
            .tar
            .command()
            .arg("--xattrs")
            .arg("-C")
            .arg(flushed.path())
            .arg("-cf")
            .arg(&*archive)
            .arg(".");
        process::run(&create).await?;

        let data = pack::read_final_artifact(&archive).await?;
        pack::reassemble(resource, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_check_members_accepts_safe_listing() {
        let listing = b"./\n./dir/\n./dir/file1\n./file2\na/b.txt\n";
        assert_eq!(check_members(listing).unwrap(), 5);
    }

    #[test]
    fn test_check_members_rejects_parent_escape() {
        let listing = b"./ok\n../../etc/passwd\n./never-checked\n";
        match check_members(listing) {
            Err(Error::UnsafeMemberPath { member, normalized }) => {
                assert_eq!(member, "../../etc/passwd");
                assert_eq!(normalized, "../../etc/passwd");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_members_rejects_rooted_and_sneaky_paths() {
        assert!(check_members(b"/etc/shadow\n").is_err());
        assert!(check_members(b"./a/../../b\n").is_err());
        assert!(check_members(b"a/./../b\n").is_ok());
    }

    #[test]
    fn test_tar_signatures() {
        let registry = register_signatures(crate::SignatureRegistry::builder()).build();
        assert!(registry
            .classify_description("POSIX tar archive (GNU)")
            .contains(&ResourceTag::TarArchive));
        assert!(registry
            .classify_mime("application/x-tar")
            .contains(&ResourceTag::TarArchive));
    }
}
