use std::os::unix::fs::PermissionsExt;

use async_recursion::async_recursion;

pub async fn setup_test_dir() -> anyhow::Result<tempfile::TempDir> {
    let tmp_dir = tempfile::tempdir()?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- 5.txt -> ../bar/2.txt
    //    |- fifo
    let foo_path = tmp_dir.path().join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    tokio::fs::write(bar_path.join("3.txt"), "3").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("4.txt"), "4").await?;
    tokio::fs::symlink("../bar/2.txt", baz_path.join("5.txt")).await?;
    nix::unistd::mkfifo(&baz_path.join("fifo"), nix::sys::stat::Mode::S_IRWXU)?;
    Ok(tmp_dir)
}

/// Creates a directory under `base` whose path is at least `len` bytes long.
pub async fn deep_dir(base: &std::path::Path, len: usize) -> anyhow::Result<std::path::PathBuf> {
    let mut path = base.to_path_buf();
    while path.as_os_str().len() < len {
        let remaining = len - path.as_os_str().len();
        // each component costs a separator plus its name
        let name_len = std::cmp::min(200, remaining.saturating_sub(1)).max(1);
        path.push("d".repeat(name_len));
    }
    tokio::fs::create_dir_all(&path).await?;
    Ok(path)
}

fn is_copied_kind(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file() || metadata.is_dir()
}

/// Checks that `dst` holds exactly the regular files and directories of `src`, with the same
/// contents and permission bits, and nothing else.
#[async_recursion]
pub async fn check_dirs_identical(
    src: &std::path::Path,
    dst: &std::path::Path,
) -> anyhow::Result<()> {
    let src_md = tokio::fs::symlink_metadata(src).await?;
    let dst_md = tokio::fs::symlink_metadata(dst).await?;
    assert_eq!(
        src_md.permissions().mode() & 0o7777,
        dst_md.permissions().mode() & 0o7777,
        "mode mismatch: {src:?} vs {dst:?}"
    );
    let mut src_entries = tokio::fs::read_dir(src).await?;
    while let Some(src_entry) = src_entries.next_entry().await? {
        let src_entry_path = src_entry.path();
        let dst_entry_path = dst.join(src_entry.file_name());
        let src_entry_md = tokio::fs::symlink_metadata(&src_entry_path).await?;
        if !is_copied_kind(&src_entry_md) {
            assert!(
                tokio::fs::symlink_metadata(&dst_entry_path).await.is_err(),
                "{dst_entry_path:?} should not have been copied"
            );
            continue;
        }
        let dst_entry_md = tokio::fs::symlink_metadata(&dst_entry_path).await?;
        assert_eq!(src_entry_md.is_file(), dst_entry_md.is_file());
        assert_eq!(src_entry_md.is_dir(), dst_entry_md.is_dir());
        if src_entry_md.is_file() {
            assert_eq!(
                src_entry_md.permissions().mode() & 0o7777,
                dst_entry_md.permissions().mode() & 0o7777,
                "mode mismatch: {src_entry_path:?} vs {dst_entry_path:?}"
            );
            let src_contents = tokio::fs::read(&src_entry_path).await?;
            let dst_contents = tokio::fs::read(&dst_entry_path).await?;
            assert_eq!(src_contents, dst_contents, "{dst_entry_path:?} differs");
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path).await?;
        }
    }
    let mut dst_entries = tokio::fs::read_dir(dst).await?;
    while let Some(dst_entry) = dst_entries.next_entry().await? {
        let src_entry_path = src.join(dst_entry.file_name());
        let src_entry_md = tokio::fs::symlink_metadata(&src_entry_path).await;
        assert!(
            src_entry_md.is_ok_and(|md| is_copied_kind(&md)),
            "{:?} has no counterpart in {src:?}",
            dst_entry.path()
        );
    }
    Ok(())
}
