//! Encoding a child tree back into container bytes.
//!
//! A pack is a fixed, strictly sequential pipeline: flush the tree, run the encoder, optionally
//! run post-process stages on its output, then patch the resource's whole byte range with the
//! final artifact.

use crate::error::{Error, IoContext, Result};
use crate::materialize::SpecialEntryPolicy;
use crate::resource::{ContainerResource, ResourceTag};
use crate::tool::ExternalTool;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Run post-process stages (such as signing). When off, the encoder's raw output is final.
    pub apply_post_process: bool,
    /// How to treat special entries the host cannot recreate while flushing.
    pub special_entries: SpecialEntryPolicy,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            apply_post_process: true,
            special_entries: SpecialEntryPolicy::Skip,
        }
    }
}

impl PackConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[async_trait]
pub trait Packer: Send + Sync {
    fn name(&self) -> &'static str;

    fn targets(&self) -> &[ResourceTag];

    /// Tools the pipeline will run under `config`.
    fn external_dependencies(&self, config: &PackConfig) -> Vec<&ExternalTool>;

    async fn pack(&self, resource: &mut ContainerResource, config: &PackConfig) -> Result<()>;
}

/// A fresh path for a stage to write its artifact to. Removed when dropped.
pub fn temp_artifact(suffix: &str) -> Result<TempPath> {
    Ok(tempfile::Builder::new()
        .prefix("recompose-")
        .suffix(suffix)
        .tempfile()
        .io_context("Failed to create temporary artifact")?
        .into_temp_path())
}

/// Reads the last stage's output, which must exist and be non-empty.
pub async fn read_final_artifact(path: &Path) -> Result<Vec<u8>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ArtifactMissing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(Error::io(format!("Failed to read {}", path.display()), e)),
    };
    if data.is_empty() {
        return Err(Error::ArtifactEmpty {
            path: path.to_path_buf(),
        });
    }
    Ok(data)
}

/// Replaces the resource's entire byte range with `data` as one patch.
pub fn reassemble(resource: &mut ContainerResource, data: Vec<u8>) -> Result<()> {
    info!(
        "Repacked {}: {} -> {} bytes",
        resource.name(),
        resource.data_length(),
        data.len()
    );
    resource.replace_content(data)
}
