//! In-memory container resources.
//!
//! [`ContainerResource`] is the narrow store contract the orchestrators consume: byte content
//! addressed by range, a pending patch log, a set of type tags, and the unpacked [`FsTree`].
//! Structural mutation needs `&mut ContainerResource`, so at most one unpack or pack can be in
//! flight per resource while tag inspection through `&` stays unrestricted.

use crate::error::{Error, Result};
use crate::fs_tree::FsTree;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

/// Classification of a resource. A resource may carry several tags at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceTag {
    GenericBinary,
    FilesystemRoot,
    ZipArchive,
    JavaArchive,
    TarArchive,
    Apk,
}

impl ResourceTag {
    /// Tags that always accompany this one.
    pub fn implied(self) -> &'static [ResourceTag] {
        match self {
            ResourceTag::GenericBinary | ResourceTag::FilesystemRoot => &[],
            ResourceTag::ZipArchive | ResourceTag::JavaArchive => &[ResourceTag::GenericBinary],
            ResourceTag::TarArchive => &[ResourceTag::GenericBinary, ResourceTag::FilesystemRoot],
            ResourceTag::Apk => &[ResourceTag::ZipArchive, ResourceTag::GenericBinary],
        }
    }

    /// Depth in the implication graph; more specific tags score higher.
    pub fn specificity(self) -> usize {
        self.implied()
            .iter()
            .map(|t| t.specificity() + 1)
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceTag::GenericBinary => "GenericBinary",
            ResourceTag::FilesystemRoot => "FilesystemRoot",
            ResourceTag::ZipArchive => "ZipArchive",
            ResourceTag::JavaArchive => "JavaArchive",
            ResourceTag::TarArchive => "TarArchive",
            ResourceTag::Apk => "Apk",
        };
        f.write_str(name)
    }
}

/// Which representation currently holds the truth about the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Byte content is current; the tree, if any, is a stale view.
    Bytes,
    /// The tree was unpacked (and possibly edited); bytes are stale until the next pack.
    Tree,
}

/// A byte-range replacement recorded against the committed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub range: Range<usize>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ContainerResource {
    name: String,
    data: Vec<u8>,
    patches: Vec<Patch>,
    tags: BTreeSet<ResourceTag>,
    tree: Option<FsTree>,
    authority: Authority,
}

impl ContainerResource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            patches: Vec::new(),
            tags: BTreeSet::new(),
            tree: None,
            authority: Authority::Bytes,
        }
    }

    pub fn with_tag(mut self, tag: ResourceTag) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the committed content.
    pub fn data_length(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get_bytes(&self, range: Range<usize>) -> Result<&[u8]> {
        self.check_range(&range)?;
        Ok(&self.data[range])
    }

    /// Records a patch. It takes effect on [`ContainerResource::commit_patches`].
    ///
    /// `range` addresses the content as it stands after the patches already queued. A patch
    /// covering all of that content supersedes everything queued before it.
    pub fn queue_patch(&mut self, range: Range<usize>, data: Vec<u8>) -> Result<()> {
        let len = self.pending_length();
        if range.start > range.end || range.end > len {
            return Err(Error::InvalidRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        if range.start == 0 && range.end == len {
            self.patches.clear();
            self.patches.push(Patch {
                range: 0..self.data.len(),
                data,
            });
            return Ok(());
        }
        self.patches.push(Patch { range, data });
        Ok(())
    }

    pub fn pending_patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Length of the content once the queued patches are applied.
    pub fn pending_length(&self) -> usize {
        self.patches
            .iter()
            .fold(self.data.len(), |len, p| len.saturating_sub(p.range.len()) + p.data.len())
    }

    /// The content with queued patches applied. Borrows the committed bytes when nothing is
    /// pending.
    pub fn current_content(&self) -> Result<Cow<'_, [u8]>> {
        if self.patches.is_empty() {
            return Ok(Cow::Borrowed(&self.data));
        }
        self.apply_patches().map(Cow::Owned)
    }

    /// Applies queued patches in order. Either every patch applies or the content and the
    /// patch log are left unchanged.
    pub fn commit_patches(&mut self) -> Result<()> {
        if self.patches.is_empty() {
            return Ok(());
        }
        self.data = self.apply_patches()?;
        self.patches.clear();
        Ok(())
    }

    fn apply_patches(&self) -> Result<Vec<u8>> {
        let mut content = self.data.clone();
        for patch in &self.patches {
            if patch.range.start > patch.range.end || patch.range.end > content.len() {
                return Err(Error::InvalidRange {
                    start: patch.range.start,
                    end: patch.range.end,
                    len: content.len(),
                });
            }
            content.splice(patch.range.clone(), patch.data.iter().copied());
        }
        Ok(content)
    }

    /// Adds `tag` and everything it implies. Existing tags are never removed.
    pub fn add_tag(&mut self, tag: ResourceTag) {
        self.tags.insert(tag);
        self.tags.extend(tag.implied().iter().copied());
    }

    pub fn has_tag(&self, tag: ResourceTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = ResourceTag> + '_ {
        self.tags.iter().copied()
    }

    pub fn tags_display(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn tree(&self) -> Option<&FsTree> {
        self.tree.as_ref()
    }

    pub fn tree_mut(&mut self) -> Option<&mut FsTree> {
        self.tree.as_mut()
    }

    /// Replaces the whole child tree and marks the tree authoritative.
    pub fn set_tree(&mut self, tree: FsTree) {
        self.tree = Some(tree);
        self.authority = Authority::Tree;
    }

    /// Records a full-content replacement produced from the tree.
    pub(crate) fn replace_content(&mut self, data: Vec<u8>) -> Result<()> {
        self.queue_patch(0..self.pending_length(), data)?;
        self.authority = Authority::Bytes;
        Ok(())
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    fn check_range(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.data.len() {
            return Err(Error::InvalidRange {
                start: range.start,
                end: range.end,
                len: self.data.len(),
            });
        }
        Ok(())
    }
}
