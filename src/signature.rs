//! Registration hooks that map content signatures to [`ResourceTag`]s.
//!
//! Registrations happen once while building a [`SignatureRegistry`]; the built registry is
//! immutable and is consulted by the dispatch layer, never by the orchestrators themselves.

use crate::resource::{ContainerResource, ResourceTag};
use std::collections::BTreeSet;
use std::fmt;

type DescriptionPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct MagicPattern {
    tag: ResourceTag,
    offset: usize,
    bytes: Vec<u8>,
}

struct DescriptionPattern {
    tag: ResourceTag,
    predicate: DescriptionPredicate,
}

#[derive(Default)]
pub struct SignatureRegistryBuilder {
    mime: Vec<(String, ResourceTag)>,
    magic: Vec<MagicPattern>,
    descriptions: Vec<DescriptionPattern>,
}

impl SignatureRegistryBuilder {
    /// Tag resources whose MIME type is exactly `mime`.
    pub fn register_mime(mut self, tag: ResourceTag, mime: &str) -> Self {
        self.mime.push((mime.to_ascii_lowercase(), tag));
        self
    }

    /// Tag resources whose content holds `bytes` at `offset`.
    pub fn register_magic(mut self, tag: ResourceTag, offset: usize, bytes: &[u8]) -> Self {
        self.magic.push(MagicPattern {
            tag,
            offset,
            bytes: bytes.to_vec(),
        });
        self
    }

    /// Tag resources whose textual description satisfies `predicate`.
    pub fn register_description<F>(mut self, tag: ResourceTag, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.descriptions.push(DescriptionPattern {
            tag,
            predicate: Box::new(predicate),
        });
        self
    }

    pub fn build(self) -> SignatureRegistry {
        SignatureRegistry {
            mime: self.mime,
            magic: self.magic,
            descriptions: self.descriptions,
        }
    }
}

pub struct SignatureRegistry {
    mime: Vec<(String, ResourceTag)>,
    magic: Vec<MagicPattern>,
    descriptions: Vec<DescriptionPattern>,
}

impl fmt::Debug for SignatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureRegistry")
            .field("mime", &self.mime.len())
            .field("magic", &self.magic.len())
            .field("descriptions", &self.descriptions.len())
            .finish()
    }
}

impl SignatureRegistry {
    pub fn builder() -> SignatureRegistryBuilder {
        SignatureRegistryBuilder::default()
    }

    /// The signatures of every container format this crate knows.
    pub fn builtin() -> Self {
        let builder = Self::builder();
        let builder = crate::formats::zip::register_signatures(builder);
        let builder = crate::formats::tar::register_signatures(builder);
        crate::formats::apk::register_signatures(builder).build()
    }

    pub fn classify_mime(&self, mime: &str) -> BTreeSet<ResourceTag> {
        let mime = mime.trim().to_ascii_lowercase();
        self.mime
            .iter()
            .filter(|(m, _)| *m == mime)
            .map(|(_, tag)| *tag)
            .collect()
    }

    pub fn classify_content(&self, data: &[u8]) -> BTreeSet<ResourceTag> {
        self.magic
            .iter()
            .filter(|p| {
                data.get(p.offset..p.offset + p.bytes.len())
                    .is_some_and(|window| window == p.bytes.as_slice())
            })
            .map(|p| p.tag)
            .collect()
    }

    pub fn classify_description(&self, description: &str) -> BTreeSet<ResourceTag> {
        self.descriptions
            .iter()
            .filter(|p| (p.predicate)(description))
            .map(|p| p.tag)
            .collect()
    }

    /// Applies every matching tag to `resource`, returning the tags that matched.
    pub fn tag(
        &self,
        resource: &mut ContainerResource,
        mime: Option<&str>,
        description: Option<&str>,
    ) -> BTreeSet<ResourceTag> {
        let mut tags = self.classify_content(resource.data());
        if let Some(mime) = mime {
            tags.extend(self.classify_mime(mime));
        }
        if let Some(description) = description {
            tags.extend(self.classify_description(description));
        }
        for tag in &tags {
            resource.add_tag(*tag);
        }
        tags
    }
}
