//! Tar round trips through the system `tar`.

use crate::integration::common::{build_tar, build_tar_with_raw_name, tree_summary};
use anyhow::Result;
use recompose::formats::tar::TAR;
use recompose::{Authority, ContainerResource, Error, PackConfig, ResourceTag, Transcoder};
use std::io::Write;

async fn tar_missing() -> Result<bool> {
    if TAR.is_installed().await? {
        return Ok(false);
    }
    println!("Skipping test: tar is not installed");
    Ok(true)
}

fn tar_resource(name: &str, data: Vec<u8>) -> ContainerResource {
    ContainerResource::new(name, data).with_tag(ResourceTag::TarArchive)
}

#[tokio::test]
async fn test_two_entry_archive() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let data = build_tar(&[("dir/file1", "0123456789"), ("file2", "")])?;
    let mut resource = tar_resource("two.tar", data);

    Transcoder::builtin().unpack(&mut resource).await?;

    let tree = resource.tree().expect("tree after unpack");
    assert_eq!(tree.directories().count(), 1);
    assert_eq!(tree.files().count(), 2);
    assert!(tree.get("dir").unwrap().is_dir());
    assert_eq!(tree.get("dir/file1").unwrap().data().unwrap().len(), 10);
    assert_eq!(tree.get("file2").unwrap().data().unwrap().len(), 0);
    assert_eq!(resource.authority(), Authority::Tree);
    Ok(())
}

#[tokio::test]
async fn test_safe_member_lands_at_its_path() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let data = build_tar(&[("a/b.txt", "hello from b")])?;
    let mut resource = tar_resource("safe.tar", data);

    Transcoder::builtin().unpack(&mut resource).await?;

    let tree = resource.tree().unwrap();
    assert_eq!(tree.files().count(), 1);
    assert_eq!(tree.get("a/b.txt").unwrap().data(), Some(&b"hello from b"[..]));
    Ok(())
}

#[tokio::test]
async fn test_parent_escape_is_refused() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let marker = "recompose-escape-marker";
    let escaped = std::env::temp_dir().join(marker);
    let _ = std::fs::remove_file(&escaped);

    let name = format!("../{}", marker);
    let data = build_tar_with_raw_name(name.as_bytes(), b"owned")?;
    let mut resource = tar_resource("evil.tar", data.clone());

    match Transcoder::builtin().unpack(&mut resource).await {
        Err(Error::UnsafeMemberPath { member, .. }) => assert_eq!(member, name),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(resource.tree().is_none());
    assert_eq!(resource.data(), data.as_slice());
    assert!(!escaped.exists(), "nothing may be written outside the root");
    Ok(())
}

#[tokio::test]
async fn test_etc_passwd_escape_is_refused() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let data = build_tar_with_raw_name(b"../../etc/passwd", b"root::0:0::/:/bin/sh\n")?;
    let mut resource = tar_resource("passwd.tar", data);

    let err = Transcoder::builtin()
        .unpack(&mut resource)
        .await
        .expect_err("escape must fail");
    assert!(err.to_string().contains("../../etc/passwd"));
    assert!(resource.tree().is_none());
    Ok(())
}

#[tokio::test]
async fn test_pack_of_unpack_decodes_to_equivalent_tree() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let data = build_tar(&[
        ("etc/", ""),
        ("etc/hostname", "box\n"),
        ("usr/bin/tool", "#!/bin/sh\necho hi\n"),
        ("empty", ""),
    ])?;
    let transcoder = Transcoder::builtin();

    let mut original = tar_resource("rootfs.tar", data);
    transcoder.unpack(&mut original).await?;
    let before = tree_summary(original.tree().unwrap());

    original
        .tree_mut()
        .unwrap()
        .add_file("etc/motd", b"edited\n".to_vec())?;
    transcoder.pack(&mut original, &PackConfig::default()).await?;
    assert_eq!(original.pending_patches().len(), 1);
    assert_eq!(original.authority(), Authority::Bytes);
    original.commit_patches()?;
    assert!(original.data_length() > 0);

    let mut repacked = tar_resource("repacked.tar", original.data().to_vec());
    transcoder.unpack(&mut repacked).await?;
    let (files, dirs) = tree_summary(repacked.tree().unwrap());

    let (mut expected_files, expected_dirs) = before;
    expected_files.insert("etc/motd".into(), b"edited\n".to_vec());
    assert_eq!(files, expected_files);
    assert_eq!(dirs, expected_dirs);
    Ok(())
}

#[tokio::test]
async fn test_gzip_compressed_archive() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let plain = build_tar(&[("docs/readme.txt", "compressed")])?;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&plain)?;
    let mut resource = tar_resource("docs.tar.gz", encoder.finish()?);

    Transcoder::builtin().unpack(&mut resource).await?;

    let tree = resource.tree().unwrap();
    assert_eq!(tree.get("docs/readme.txt").unwrap().data(), Some(&b"compressed"[..]));
    Ok(())
}

#[tokio::test]
async fn test_independent_resources_unpack_concurrently() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let transcoder = Transcoder::builtin();
    let mut first = tar_resource("first.tar", build_tar(&[("one", "1")])?);
    let mut second = tar_resource("second.tar", build_tar(&[("two", "22")])?);

    let (a, b) = tokio::join!(transcoder.unpack(&mut first), transcoder.unpack(&mut second));
    a?;
    b?;

    assert!(first.tree().unwrap().get("one").is_some());
    assert!(first.tree().unwrap().get("two").is_none());
    assert!(second.tree().unwrap().get("two").is_some());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_archive_reports_process_failure() -> Result<()> {
    if tar_missing().await? {
        return Ok(());
    }
    let mut resource = tar_resource("junk.tar", b"this is not a tar archive".to_vec());

    match Transcoder::builtin().unpack(&mut resource).await {
        Err(Error::ProcessFailed { command, code }) => {
            assert!(command.contains("-tf"));
            assert!(code.is_some());
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(resource.tree().is_none());
    Ok(())
}
