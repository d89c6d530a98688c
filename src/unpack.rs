//! Decoding a container into its child tree.

use crate::error::Result;
use crate::materialize;
use crate::resource::{ContainerResource, ResourceTag};
use crate::tool::ExternalTool;
use async_trait::async_trait;
use log::info;
use std::path::Path;

/// Decodes a container with an external tool and populates the resource's child tree.
///
/// Unpacking is all-or-nothing: the tree is only replaced once decoding and validation have
/// both succeeded, so a failed call leaves the resource exactly as it was.
#[async_trait]
pub trait Unpacker: Send + Sync {
    fn name(&self) -> &'static str;

    fn targets(&self) -> &[ResourceTag];

    fn external_dependencies(&self) -> Vec<&ExternalTool>;

    async fn unpack(&self, resource: &mut ContainerResource) -> Result<()>;
}

/// Loads a tool's output directory and installs it as the resource's tree.
pub(crate) async fn populate(resource: &mut ContainerResource, dir: &Path) -> Result<()> {
    let tree = materialize::read_tree(dir).await?;
    info!(
        "Unpacked {}: {} files, {} directories",
        resource.name(),
        tree.files().count(),
        tree.directories().count()
    );
    resource.set_tree(tree);
    Ok(())
}
