//! APK pipelines against shell-script stand-ins for `apktool`, `java` and `unzip`.
//!
//! The stand-ins honour the same argument templates as the real tools, so these tests check
//! the exact command lines and the artifact naming without an Android toolchain.

#![cfg(unix)]

use crate::integration::common::fake_tool;
use anyhow::Result;
use recompose::formats::apk::{self, ApkPacker, ApkUnpacker};
use recompose::tool::{ExternalTool, PathStrategy};
use recompose::{ContainerResource, Error, FsTree, PackConfig, ResourceTag, Transcoder};
use std::path::Path;
use tempfile::TempDir;

/// `apktool decode --output DIR --force FILE` writes a manifest into DIR;
/// `apktool build --force-all DIR --output OUT` writes `build_output` to OUT.
fn fake_apktool(dir: &Path, build_output: &str) -> Result<ExternalTool> {
    let body = format!(
        r#"case "$1" in
  -version) echo 2.9.3 ;;
  decode) mkdir -p "$3" && printf '<manifest/>' > "$3/AndroidManifest.xml" ;;
  build) printf '%s' '{}' > "$5" ;;
  *) exit 1 ;;
esac"#,
        build_output
    );
    fake_tool(dir, "apktool", "-version", &body)
}

/// `java -jar JAR --apks IN --out DIR --allowResign`, writing the signed copy only when
/// `write_signed` is set.
fn fake_java(dir: &Path, write_signed: bool) -> Result<ExternalTool> {
    let sign = if write_signed {
        r#"printf 'PK-signed' > "$6/$(basename "$4" .apk)-aligned-debugSigned.apk""#
    } else {
        ":"
    };
    let body = format!(
        r#"case "$1" in
  -help) exit 0 ;;
  -jar) [ "$3" = "--help" ] && exit 0
        [ "$3" = "--apks" ] && [ "$5" = "--out" ] && [ "$7" = "--allowResign" ] || exit 2
        {} ;;
  *) exit 1 ;;
esac"#,
        sign
    );
    fake_tool(dir, "java", "-help", &body)
}

fn fake_signer(dir: &Path, java: ExternalTool) -> Result<ExternalTool> {
    let jar = dir.join("uber-apk-signer.jar");
    std::fs::write(&jar, b"PK")?;
    Ok(ExternalTool::jar(
        "uber-apk-signer",
        "https://github.com/patrickfav/uber-apk-signer",
        "--help",
        &PathStrategy::search("uber-apk-signer.jar"),
        java,
    )
    .at_path(jar))
}

fn unpacked_apk() -> Result<ContainerResource> {
    let mut tree = FsTree::new();
    tree.add_file("AndroidManifest.xml", b"<manifest/>".to_vec())?;
    tree.add_file("res/values/strings.xml", b"<resources/>".to_vec())?;
    let mut resource =
        ContainerResource::new("app.apk", b"PK-original".to_vec()).with_tag(ResourceTag::Apk);
    resource.set_tree(tree);
    Ok(resource)
}

fn packer_transcoder(dir: &Path, build_output: &str, write_signed: bool) -> Result<Transcoder> {
    let apktool = fake_apktool(dir, build_output)?;
    let signer = fake_signer(dir, fake_java(dir, write_signed)?)?;
    Ok(Transcoder::new().with_packer(ApkPacker::with_tools(apktool, signer)))
}

#[tokio::test]
async fn test_post_process_off_uses_raw_build_output() -> Result<()> {
    let tools = TempDir::new()?;
    let transcoder = packer_transcoder(tools.path(), "PK-unsigned", true)?;
    let mut resource = unpacked_apk()?;
    let config = PackConfig {
        apply_post_process: false,
        ..PackConfig::default()
    };

    transcoder.pack(&mut resource, &config).await?;

    let patches = resource.pending_patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].range, 0..b"PK-original".len());
    assert_eq!(patches[0].data, b"PK-unsigned");
    Ok(())
}

#[tokio::test]
async fn test_post_process_on_uses_signed_artifact() -> Result<()> {
    let tools = TempDir::new()?;
    let transcoder = packer_transcoder(tools.path(), "PK-unsigned", true)?;
    let mut resource = unpacked_apk()?;

    transcoder.pack(&mut resource, &PackConfig::default()).await?;
    resource.commit_patches()?;

    assert_eq!(resource.data(), b"PK-signed");
    Ok(())
}

#[tokio::test]
async fn test_empty_build_output_leaves_resource_unpatched() -> Result<()> {
    let tools = TempDir::new()?;
    let transcoder = packer_transcoder(tools.path(), "", true)?;
    let mut resource = unpacked_apk()?;
    let config = PackConfig {
        apply_post_process: false,
        ..PackConfig::default()
    };

    let result = transcoder.pack(&mut resource, &config).await;

    assert!(matches!(result, Err(Error::ArtifactEmpty { .. })));
    assert!(resource.pending_patches().is_empty());
    assert_eq!(resource.data(), b"PK-original");
    Ok(())
}

#[tokio::test]
async fn test_missing_signed_artifact() -> Result<()> {
    let tools = TempDir::new()?;
    let transcoder = packer_transcoder(tools.path(), "PK-unsigned", false)?;
    let mut resource = unpacked_apk()?;

    match transcoder.pack(&mut resource, &PackConfig::default()).await {
        Err(Error::ArtifactMissing { path }) => {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.ends_with("-aligned-debugSigned.apk"), "{}", name);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(resource.pending_patches().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_signer_jar_is_reported_before_build() -> Result<()> {
    let tools = TempDir::new()?;
    let apktool = fake_apktool(tools.path(), "PK-unsigned")?;
    let signer = fake_signer(tools.path(), fake_java(tools.path(), true)?)?
        .at_path(tools.path().join("absent.jar"));
    let transcoder = Transcoder::new().with_packer(ApkPacker::with_tools(apktool, signer));
    let mut resource = unpacked_apk()?;

    match transcoder.pack(&mut resource, &PackConfig::default()).await {
        Err(Error::ToolNotInstalled { tool, .. }) => assert_eq!(tool, "uber-apk-signer"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(resource.pending_patches().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_zip_with_manifest_is_identified_and_decoded() -> Result<()> {
    let tools = TempDir::new()?;
    let unzip = fake_tool(
        tools.path(),
        "unzip",
        "--help",
        r#"[ "$1" = "-l" ] || exit 0
echo "Archive:  $2"
echo "     2216  1981-01-01 01:01   AndroidManifest.xml"
echo "   611720  1981-01-01 01:01   classes.dex""#,
    )?;
    let apktool = fake_apktool(tools.path(), "PK-unsigned")?;
    let transcoder = Transcoder::new()
        .with_identifier(apk::identifier_with_tool(unzip))
        .with_unpacker(ApkUnpacker::with_tool(apktool));

    let mut resource =
        ContainerResource::new("app.zip", b"PK\x03\x04".to_vec()).with_tag(ResourceTag::ZipArchive);
    let ran = transcoder.identify(&mut resource).await?;
    assert_eq!(ran, vec!["ApkIdentifier"]);
    assert!(resource.has_tag(ResourceTag::Apk));
    assert!(resource.has_tag(ResourceTag::ZipArchive));

    transcoder.unpack(&mut resource).await?;
    let tree = resource.tree().unwrap();
    assert_eq!(
        tree.get("AndroidManifest.xml").unwrap().data(),
        Some(&b"<manifest/>"[..])
    );
    Ok(())
}

#[tokio::test]
async fn test_plain_zip_is_left_alone() -> Result<()> {
    let tools = TempDir::new()?;
    let unzip = fake_tool(
        tools.path(),
        "unzip",
        "--help",
        r#"[ "$1" = "-l" ] || exit 0
echo "       10  2024-01-01 00:00   META-INF/MANIFEST.MF""#,
    )?;
    let transcoder = Transcoder::new().with_identifier(apk::identifier_with_tool(unzip));

    let mut resource =
        ContainerResource::new("lib.jar", b"PK\x03\x04".to_vec()).with_tag(ResourceTag::JavaArchive);
    transcoder.identify(&mut resource).await?;

    assert!(!resource.has_tag(ResourceTag::Apk));
    assert!(resource.has_tag(ResourceTag::JavaArchive));
    assert_eq!(resource.data(), b"PK\x03\x04");
    Ok(())
}
