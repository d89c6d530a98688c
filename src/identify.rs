//! Refining loose type tags by inspecting a container's listing.

use crate::error::Result;
use crate::materialize;
use crate::process;
use crate::resource::{ContainerResource, ResourceTag};
use crate::tool::ExternalTool;
use async_trait::async_trait;
use log::{debug, info};

/// Adds a more specific tag to resources that already carry one of [`Identifier::targets`].
///
/// Implementations only ever add tags. They never remove tags and never touch byte content.
#[async_trait]
pub trait Identifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn targets(&self) -> &[ResourceTag];

    fn external_dependencies(&self) -> Vec<&ExternalTool>;

    async fn identify(&self, resource: &mut ContainerResource) -> Result<()>;
}

/// Identifies a container type by a marker file name in an external tool's content listing.
#[derive(Debug, Clone)]
pub struct ListingIdentifier {
    name: &'static str,
    targets: Vec<ResourceTag>,
    tool: ExternalTool,
    list_args: Vec<String>,
    suffix: String,
    marker: String,
    tag: ResourceTag,
}

impl ListingIdentifier {
    /// `tool` is run as `<tool> <list_args...> <file>` on a copy of the resource named `*<suffix>`.
    pub fn new(
        name: &'static str,
        targets: &[ResourceTag],
        tool: ExternalTool,
        list_args: &[&str],
        suffix: &str,
        marker: &str,
        tag: ResourceTag,
    ) -> Self {
        Self {
            name,
            targets: targets.to_vec(),
            tool,
            list_args: list_args.iter().map(|a| a.to_string()).collect(),
            suffix: suffix.to_string(),
            marker: marker.to_string(),
            tag,
        }
    }

    pub fn tag(&self) -> ResourceTag {
        self.tag
    }
}

#[async_trait]
impl Identifier for ListingIdentifier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn targets(&self) -> &[ResourceTag] {
        &self.targets
    }

    fn external_dependencies(&self) -> Vec<&ExternalTool> {
        vec![&self.tool]
    }

    async fn identify(&self, resource: &mut ContainerResource) -> Result<()> {
        let listing = {
            let temp = materialize::with_content_as_file(resource, Some(&self.suffix)).await?;
            let cmd = self.tool.command().args(&self.list_args).arg(&*temp);
            process::run_captured(&cmd).await?
        };

        if listing_contains(&listing, &self.marker) {
            info!("{}: tagging {} as {}", self.name, resource.name(), self.tag);
            resource.add_tag(self.tag);
        } else {
            debug!("{}: no '{}' in listing of {}", self.name, self.marker, resource.name());
        }
        Ok(())
    }
}

/// Case-insensitive search for `marker` anywhere in a listing.
pub fn listing_contains(listing: &[u8], marker: &str) -> bool {
    let marker = marker.to_ascii_lowercase();
    if marker.is_empty() {
        return true;
    }
    let listing = listing.to_ascii_lowercase();
    listing
        .windows(marker.len())
        .any(|window| window == marker.as_bytes())
}
