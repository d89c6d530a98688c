//! Type-directed dispatch of identifiers, unpackers and packers.
//!
//! This module provides [`Transcoder`], which:
//! - runs every [`Identifier`] whose targets overlap a resource's tags,
//! - picks the most specific [`Unpacker`] / [`Packer`] for a resource,
//! - verifies (once per process, cached) that the component's external tools are installed
//!   before anything is spawned,
//! - and hands the resource to the component.
//!
//! Construction helpers:
//! - [`Transcoder::new`]: empty, register components yourself.
//! - [`Transcoder::builtin`]: tar and APK support.

use crate::error::{Error, Result};
use crate::formats::{apk, ApkPacker, ApkUnpacker, TarPacker, TarUnpacker};
use crate::identify::Identifier;
use crate::pack::{PackConfig, Packer};
use crate::resource::{ContainerResource, ResourceTag};
use crate::tool::ToolAvailability;
use crate::unpack::Unpacker;
use log::{debug, info};

/// Routes container resources to the components that understand them.
///
/// ### Concurrency
/// A `Transcoder` is `Sync`; share one across tasks to process independent resources
/// concurrently. Each operation takes `&mut ContainerResource`, so one resource can never be
/// unpacked and packed at the same time.
pub struct Transcoder {
    identifiers: Vec<Box<dyn Identifier>>,
    unpackers: Vec<Box<dyn Unpacker>>,
    packers: Vec<Box<dyn Packer>>,
    availability: ToolAvailability,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder {
    pub fn new() -> Self {
        Self {
            identifiers: Vec::new(),
            unpackers: Vec::new(),
            packers: Vec::new(),
            availability: ToolAvailability::new(),
        }
    }

    /// A transcoder with every built-in format registered.
    pub fn builtin() -> Self {
        Self::new()
            .with_identifier(apk::identifier())
            .with_unpacker(TarUnpacker::new())
            .with_unpacker(ApkUnpacker::new())
            .with_packer(TarPacker::new())
            .with_packer(ApkPacker::new())
    }

    pub fn with_identifier(mut self, identifier: impl Identifier + 'static) -> Self {
        self.identifiers.push(Box::new(identifier));
        self
    }

    pub fn with_unpacker(mut self, unpacker: impl Unpacker + 'static) -> Self {
        self.unpackers.push(Box::new(unpacker));
        self
    }

    pub fn with_packer(mut self, packer: impl Packer + 'static) -> Self {
        self.packers.push(Box::new(packer));
        self
    }

    pub fn availability(&self) -> &ToolAvailability {
        &self.availability
    }

    /// Runs applicable identifiers in registration order. Returns the names of those that ran.
    ///
    /// Applicability is re-evaluated before each identifier, so a tag added by one identifier
    /// can enable a later one.
    pub async fn identify(&self, resource: &mut ContainerResource) -> Result<Vec<&'static str>> {
        let mut ran = Vec::new();
        for identifier in &self.identifiers {
            if !applies(identifier.targets(), resource) {
                continue;
            }
            self.availability
                .ensure(&identifier.external_dependencies())
                .await?;
            debug!("Running {} on {}", identifier.name(), resource.name());
            identifier.identify(resource).await?;
            ran.push(identifier.name());
        }
        Ok(ran)
    }

    /// Unpacks `resource` with the most specific unpacker for its tags.
    pub async fn unpack(&self, resource: &mut ContainerResource) -> Result<()> {
        let unpacker = most_specific(&self.unpackers, |u| u.targets(), resource)
            .ok_or_else(|| no_component("unpack", resource))?;
        self.availability
            .ensure(&unpacker.external_dependencies())
            .await?;

        info!("Unpacking {} with {}", resource.name(), unpacker.name());
        unpacker.unpack(resource).await
    }

    /// Packs `resource`'s tree back into its bytes with the most specific packer for its tags.
    pub async fn pack(&self, resource: &mut ContainerResource, config: &PackConfig) -> Result<()> {
        if resource.tree().is_none() {
            return Err(Error::NotUnpacked);
        }
        let packer = most_specific(&self.packers, |p| p.targets(), resource)
            .ok_or_else(|| no_component("pack", resource))?;
        self.availability
            .ensure(&packer.external_dependencies(config))
            .await?;

        info!("Packing {} with {}", resource.name(), packer.name());
        packer.pack(resource, config).await
    }
}

fn applies(targets: &[ResourceTag], resource: &ContainerResource) -> bool {
    targets.iter().any(|t| resource.has_tag(*t))
}

/// The component whose matching target tag is deepest in the tag hierarchy; earlier
/// registrations win ties.
fn most_specific<'a, C: ?Sized, F>(
    components: &'a [Box<C>],
    targets: F,
    resource: &ContainerResource,
) -> Option<&'a C>
where
    F: Fn(&C) -> &[ResourceTag],
{
    let mut best: Option<(&'a C, usize)> = None;
    for component in components {
        let component: &'a C = component.as_ref();
        let score = targets(component)
            .iter()
            .filter(|t| resource.has_tag(**t))
            .map(|t| t.specificity())
            .max();
        if let Some(score) = score {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((component, score));
            }
        }
    }
    best.map(|(c, _)| c)
}

fn no_component(operation: &'static str, resource: &ContainerResource) -> Error {
    Error::NoComponent {
        operation,
        tags: resource.tags_display(),
    }
}
