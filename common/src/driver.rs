use std::os::unix::fs::PermissionsExt;

use tracing::instrument;

use crate::copy::{self, Settings, Summary};
use crate::task::CopyTask;

/// Reasons the copy is refused before anything is copied.
///
/// Displayed as `"copy_tree: <kind> error: ..."`, the same shape as per-entry failures.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("copy_tree: realpath error: source {path:?}")]
    SourceUnresolvable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("copy_tree: lstat error: source {0:?} is not a directory")]
    SourceNotDirectory(std::path::PathBuf),
    #[error("copy_tree: realpath error: destination {path:?}")]
    DestinationUnresolvable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("copy_tree: nesting error: destination {dst:?} is inside source {src:?}")]
    DestinationInsideSource {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
    },
    #[error("copy_tree: mkdir error: destination {path:?}")]
    DestinationCreate {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("copy_tree: mkdir error: destination {0:?} is not a directory")]
    DestinationNotDirectory(std::path::PathBuf),
}

/// Copies the directory tree at `src` into `dst`.
///
/// Validation happens first and is the only thing that can fail: once the root directory task
/// starts, per-entry failures are logged and the copy carries on with everything else.
#[instrument(skip(settings))]
pub async fn copy_tree(
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: Settings,
) -> Result<Summary, DriverError> {
    let src = tokio::fs::canonicalize(src)
        .await
        .map_err(|source| DriverError::SourceUnresolvable {
            path: src.to_owned(),
            source,
        })?;
    let src_metadata = tokio::fs::symlink_metadata(&src).await.map_err(|source| {
        DriverError::SourceUnresolvable {
            path: src.clone(),
            source,
        }
    })?;
    if !src_metadata.is_dir() {
        return Err(DriverError::SourceNotDirectory(src));
    }
    // nothing may be created before we know the destination is outside the source
    let planned_dst =
        resolve_destination(dst)
            .await
            .map_err(|source| DriverError::DestinationUnresolvable {
                path: dst.to_owned(),
                source,
            })?;
    check_outside(&src, &planned_dst)?;
    let created = create_root(dst, src_metadata.permissions().mode()).await?;
    let dst = tokio::fs::canonicalize(dst)
        .await
        .map_err(|source| DriverError::DestinationUnresolvable {
            path: dst.to_owned(),
            source,
        })?;
    check_outside(&src, &dst)?;
    tracing::info!("copy: {:?} -> {:?}", &src, &dst);
    let mut summary = copy::copy_dir(CopyTask::new(src, dst), settings).await;
    if created && summary.directories_unchanged > 0 {
        // the root task found the directory we just made
        summary.directories_unchanged -= 1;
        summary.directories_created += 1;
    }
    Ok(summary)
}

fn check_outside(src: &std::path::Path, dst: &std::path::Path) -> Result<(), DriverError> {
    // component-wise, "/a/bc" is not inside "/a/b"
    if dst.starts_with(src) {
        return Err(DriverError::DestinationInsideSource {
            src: src.to_owned(),
            dst: dst.to_owned(),
        });
    }
    Ok(())
}

/// Absolute form of a path that may not exist yet.
///
/// The longest existing prefix is canonicalized and the rest is applied lexically.
async fn resolve_destination(path: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
    let path = std::path::absolute(path)?;
    let mut existing = path.as_path();
    let mut remainder = vec![];
    loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(mut resolved) => {
                for component in remainder.iter().rev() {
                    match component {
                        std::path::Component::ParentDir => {
                            resolved.pop();
                        }
                        std::path::Component::Normal(name) => resolved.push(name),
                        _ => {}
                    }
                }
                return Ok(resolved);
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                let (Some(last), Some(parent)) = (existing.components().next_back(), existing.parent())
                else {
                    return Err(error);
                };
                remainder.push(last);
                existing = parent;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Creates the destination root, returns false if it already existed.
async fn create_root(dst: &std::path::Path, mode: u32) -> Result<bool, DriverError> {
    let created = tokio::fs::DirBuilder::new()
        .mode(mode | 0o700)
        .create(dst)
        .await;
    match created {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            let metadata =
                tokio::fs::metadata(dst)
                    .await
                    .map_err(|source| DriverError::DestinationCreate {
                        path: dst.to_owned(),
                        source,
                    })?;
            if !metadata.is_dir() {
                return Err(DriverError::DestinationNotDirectory(dst.to_owned()));
            }
            Ok(false)
        }
        Err(source) => Err(DriverError::DestinationCreate {
            path: dst.to_owned(),
            source,
        }),
    }
}
