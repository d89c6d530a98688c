//! Zip-like containers. There is no zip unpacker; zip tags exist so more specific
//! identifiers (APK) have something to refine.

use crate::resource::ResourceTag;
use crate::signature::SignatureRegistryBuilder;
use crate::tool::ExternalTool;
use once_cell::sync::Lazy;

pub static UNZIP: Lazy<ExternalTool> = Lazy::new(|| {
    ExternalTool::new("unzip", "https://linux.die.net/man/1/unzip", "--help").apt_package("unzip")
});

pub fn register_signatures(builder: SignatureRegistryBuilder) -> SignatureRegistryBuilder {
    builder
        .register_mime(ResourceTag::ZipArchive, "application/zip")
        .register_mime(ResourceTag::JavaArchive, "application/java-archive")
        .register_magic(ResourceTag::ZipArchive, 0, b"PK\x03\x04")
        // empty archive: end-of-central-directory record only
        .register_magic(ResourceTag::ZipArchive, 0, b"PK\x05\x06")
        .register_description(ResourceTag::ZipArchive, |s| {
            s.to_lowercase().contains("zip archive")
        })
}
