//! Android application packages.
//!
//! Decoding and building go through `apktool`. Signing goes through `uber-apk-signer`, a jar
//! started with `java -jar`, which writes its result under a name derived from its input.

use crate::error::Result;
use crate::identify::ListingIdentifier;
use crate::materialize;
use crate::pack::{self, PackConfig, Packer};
use crate::process;
use crate::resource::{ContainerResource, ResourceTag};
use crate::signature::SignatureRegistryBuilder;
use crate::tool::{ExternalTool, PathRule, PathStrategy};
use crate::unpack::{self, Unpacker};
use async_trait::async_trait;
use log::info;
use once_cell::sync::Lazy;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub static APKTOOL: Lazy<ExternalTool> = Lazy::new(|| {
    ExternalTool::new("apktool", "https://ibotpeaches.github.io/Apktool/", "-version")
});

pub static JAVA: Lazy<ExternalTool> = Lazy::new(|| {
    ExternalTool::new("java", "https://openjdk.org/projects/jdk/17/", "-help")
        .apt_package("openjdk-17-jdk")
        .brew_package("openjdk@17")
});

pub static UBER_APK_SIGNER: Lazy<ExternalTool> = Lazy::new(|| {
    let strategy = PathStrategy {
        windows: PathRule::Fixed(PathBuf::from(
            r"C:\Program Files (x86)\uber-apk-signer\uber-apk-signer.jar",
        )),
        unix: PathRule::Fixed(PathBuf::from("/usr/local/bin/uber-apk-signer.jar")),
        other: PathRule::Home(PathBuf::from("uber-apk-signer.jar")),
    };
    ExternalTool::jar(
        "uber-apk-signer",
        "https://github.com/patrickfav/uber-apk-signer",
        "--help",
        &strategy,
        JAVA.clone(),
    )
});

const TARGETS: &[ResourceTag] = &[ResourceTag::Apk];

/// Suffix uber-apk-signer puts in place of `.apk` on the files it writes.
const SIGNED_SUFFIX: &str = "-aligned-debugSigned.apk";

pub fn register_signatures(builder: SignatureRegistryBuilder) -> SignatureRegistryBuilder {
    builder.register_mime(ResourceTag::Apk, "application/vnd.android.package-archive")
}

/// Tags zip and jar resources containing an `AndroidManifest.xml` as APKs.
///
/// Some APKs are recognized by MIME type; others only look like generic zip or java archives
/// until their listing is inspected.
pub fn identifier() -> ListingIdentifier {
    identifier_with_tool(crate::formats::zip::UNZIP.clone())
}

pub fn identifier_with_tool(unzip: ExternalTool) -> ListingIdentifier {
    ListingIdentifier::new(
        "ApkIdentifier",
        &[ResourceTag::JavaArchive, ResourceTag::ZipArchive],
        unzip,
        &["-l"],
        ".zip",
        "androidmanifest.xml",
        ResourceTag::Apk,
    )
}

/// Where uber-apk-signer leaves the signed copy of `unsigned` when told `--out out_dir`.
pub fn signed_artifact_path(unsigned: &Path, out_dir: &Path) -> PathBuf {
    let mut name: OsString = unsigned.file_stem().unwrap_or_default().to_os_string();
    name.push(SIGNED_SUFFIX);
    out_dir.join(name)
}

/// Decodes APKs with `apktool decode`.
#[derive(Debug, Clone)]
pub struct ApkUnpacker {
    apktool: ExternalTool,
}

impl ApkUnpacker {
    pub fn new() -> Self {
        Self::with_tool(APKTOOL.clone())
    }

    pub fn with_tool(apktool: ExternalTool) -> Self {
        Self { apktool }
    }
}

impl Default for ApkUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Unpacker for ApkUnpacker {
    fn name(&self) -> &'static str {
        "ApkUnpacker"
    }

    fn targets(&self) -> &[ResourceTag] {
        TARGETS
    }

    fn external_dependencies(&self) -> Vec<&ExternalTool> {
        vec![&self.apktool]
    }

    async fn unpack(&self, resource: &mut ContainerResource) -> Result<()> {
        let apk = materialize::with_content_as_file(resource, Some(".apk")).await?;
        let out = materialize::scratch_dir()?;

        let decode = self
            .apktool
            .command()
            .arg("decode")
            .arg("--output")
            .arg(out.path())
            .arg("--force")
            .arg(&*apk);
        process::run(&decode).await?;

        unpack::populate(resource, out.path()).await
    }
}

/// Builds APKs with `apktool build`, then signs them unless post-processing is off.
#[derive(Debug, Clone)]
pub struct ApkPacker {
    apktool: ExternalTool,
    signer: ExternalTool,
}

impl ApkPacker {
    pub fn new() -> Self {
        Self::with_tools(APKTOOL.clone(), UBER_APK_SIGNER.clone())
    }

    /// `signer` is expected to be a jar descriptor carrying its java runtime.
    pub fn with_tools(apktool: ExternalTool, signer: ExternalTool) -> Self {
        Self { apktool, signer }
    }

    async fn sign(&self, unsigned: &Path) -> Result<Vec<u8>> {
        let out = materialize::scratch_dir()?;
        let sign = self
            .signer
            .command()
            .arg("--apks")
            .arg(unsigned)
            .arg("--out")
            .arg(out.path())
            .arg("--allowResign");
        process::run(&sign).await?;

        let signed = signed_artifact_path(unsigned, out.path());
        info!("Signed APK at {}", signed.display());
        pack::read_final_artifact(&signed).await
    }
}

impl Default for ApkPacker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Packer for ApkPacker {
    fn name(&self) -> &'static str {
        "ApkPacker"
    }

    fn targets(&self) -> &[ResourceTag] {
        TARGETS
    }

    fn external_dependencies(&self, config: &PackConfig) -> Vec<&ExternalTool> {
        let mut tools = vec![&self.apktool];
        if config.apply_post_process {
            if let crate::tool::Invocation::Jar { runtime } = self.signer.invocation() {
                tools.push(&**runtime);
            }
            tools.push(&self.signer);
        }
        tools
    }

    async fn pack(&self, resource: &mut ContainerResource, config: &PackConfig) -> Result<()> {
        let flushed = materialize::flush_tree_to_directory(resource, config.special_entries).await?;

        let unsigned = pack::temp_artifact(".apk")?;
        let build = self
            .apktool
            .command()
            .arg("build")
            .arg("--force-all")
            .arg(flushed.path())
            .arg("--output")
            .arg(&*unsigned);
        process::run(&build).await?;

        let data = if config.apply_post_process {
            self.sign(&unsigned).await?
        } else {
            pack::read_final_artifact(&unsigned).await?
        };
        pack::reassemble(resource, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_artifact_path() {
        assert_eq!(
            signed_artifact_path(Path::new("/tmp/recompose-a1b2.apk"), Path::new("/tmp/out")),
            PathBuf::from("/tmp/out/recompose-a1b2-aligned-debugSigned.apk")
        );
    }

    #[test]
    fn test_signer_runs_through_java() {
        let cmd = UBER_APK_SIGNER.command().to_string();
        assert!(cmd.contains(" -jar "));
        assert!(cmd.ends_with("uber-apk-signer.jar"));
    }

    #[test]
    fn test_dependencies_follow_post_process() {
        let packer = ApkPacker::new();
        let signed = PackConfig::default();
        let unsigned = PackConfig {
            apply_post_process: false,
            ..PackConfig::default()
        };
        let names = |tools: Vec<&ExternalTool>| {
            tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(
            names(packer.external_dependencies(&signed)),
            vec!["apktool", "java", "uber-apk-signer"]
        );
        assert_eq!(names(packer.external_dependencies(&unsigned)), vec!["apktool"]);
    }

    #[test]
    fn test_identifier_targets_zip_like_tags() {
        use crate::identify::Identifier;
        let identifier = identifier();
        assert_eq!(identifier.name(), "ApkIdentifier");
        assert!(identifier.targets().contains(&ResourceTag::ZipArchive));
        assert!(identifier.targets().contains(&ResourceTag::JavaArchive));
        assert_eq!(identifier.tag(), ResourceTag::Apk);
    }
}
