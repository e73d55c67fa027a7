use std::os::unix::fs::PermissionsExt;

use async_recursion::async_recursion;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::error::{Error, ErrorKind};
use crate::task::{CopyTask, EntryKind};

/// Size of the buffer each file copy reads into.
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Permission bits carried over from source to destination.
const MODE_MASK: u32 = 0o7777;

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    /// Sleep between attempts when out of file descriptors.
    pub retry_backoff: std::time::Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry_backoff: retry::DEFAULT_BACKOFF,
        }
    }
}

/// Work that completed. Failures are logged where they happen and are not counted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub files_copied: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
    /// Symlinks, devices, sockets and FIFOs.
    pub entries_skipped: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_copied: self.bytes_copied + other.bytes_copied,
            files_copied: self.files_copied + other.files_copied,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
            entries_skipped: self.entries_skipped + other.entries_skipped,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files copied: {}\n\
            directories created: {}\n\
            directories unchanged: {}\n\
            entries skipped: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.directories_created,
            self.directories_unchanged,
            self.entries_skipped,
        )
    }
}

/// Copies one regular file's bytes and permission bits.
///
/// Any failure is logged and only abandons this file.
#[instrument(skip(settings))]
pub async fn copy_file(task: CopyTask, settings: Settings) -> Summary {
    match try_copy_file(&task, &settings).await {
        Ok(summary) => summary,
        Err(error) => {
            error.log();
            Summary::default()
        }
    }
}

async fn try_copy_file(task: &CopyTask, settings: &Settings) -> Result<Summary, Error> {
    const OP: &str = "copy_file";
    let src_metadata = tokio::fs::symlink_metadata(&task.src)
        .await
        .map_err(|err| Error::io(OP, ErrorKind::MetadataQueryFailed, &task.src, err))?;
    if !src_metadata.is_file() {
        // replaced by something else since the parent looked at it
        return Err(Error::new(OP, ErrorKind::MetadataQueryFailed, &task.src));
    }
    let mode = src_metadata.permissions().mode() & MODE_MASK;
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut read_options = tokio::fs::OpenOptions::new();
    read_options.read(true);
    let mut reader = retry::open_file(&task.src, &read_options, settings.retry_backoff)
        .await
        .map_err(|err| Error::io(OP, ErrorKind::OpenFailed, &task.src, err))?;
    let mut write_options = tokio::fs::OpenOptions::new();
    write_options.write(true).create(true).truncate(true).mode(mode);
    let mut writer = retry::open_file(&task.dst, &write_options, settings.retry_backoff)
        .await
        .map_err(|err| Error::io(OP, ErrorKind::OpenFailed, &task.dst, err))?;
    tracing::debug!("copying data");
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_copied: u64 = 0;
    loop {
        let read = match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::io(OP, ErrorKind::ReadFailed, &task.src, err)),
        };
        // a single write may take only part of the chunk
        let mut written = 0;
        while written < read {
            match writer.write(&buffer[written..read]).await {
                Ok(0) => {
                    return Err(Error::io(
                        OP,
                        ErrorKind::WriteFailed,
                        &task.dst,
                        std::io::ErrorKind::WriteZero.into(),
                    ));
                }
                Ok(n) => written += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(Error::io(OP, ErrorKind::WriteFailed, &task.dst, err)),
            }
        }
        bytes_copied += read as u64;
    }
    // tokio defers writes to the blocking pool, errors only show up here
    writer
        .flush()
        .await
        .map_err(|err| Error::io(OP, ErrorKind::WriteFailed, &task.dst, err))?;
    tracing::debug!("setting permissions");
    // the create mode went through the umask and an existing file keeps its old mode
    writer
        .set_permissions(std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|err| Error::io(OP, ErrorKind::SetPermissionsFailed, &task.dst, err))?;
    Ok(Summary {
        bytes_copied,
        files_copied: 1,
        ..Default::default()
    })
}

/// Copies a directory and, through one spawned task per entry, everything below it.
///
/// Returns only after every task it spawned has finished, so the returned summary covers the
/// whole subtree. Failures are logged and abandon only the entry (or subtree) they hit.
#[instrument(skip(settings))]
#[async_recursion]
pub async fn copy_dir(task: CopyTask, settings: Settings) -> Summary {
    const OP: &str = "copy_dir";
    tracing::debug!("reading source metadata");
    let src_metadata = match tokio::fs::symlink_metadata(&task.src).await {
        Ok(metadata) if metadata.is_dir() => metadata,
        Ok(_) => {
            Error::new(OP, ErrorKind::MetadataQueryFailed, &task.src).log();
            return Summary::default();
        }
        Err(err) => {
            Error::io(OP, ErrorKind::MetadataQueryFailed, &task.src, err).log();
            return Summary::default();
        }
    };
    let mode = src_metadata.permissions().mode() & MODE_MASK;
    let summary = match create_dir(&task.dst, mode).await {
        Ok(summary) => summary,
        Err(error) => {
            error.log();
            return Summary::default();
        }
    };
    let summary = summary + copy_contents(&task, settings).await;
    // applies on a failed open_dir too, create_dir left it at mode | 0o700
    tracing::debug!("set 'dst' directory permissions");
    if let Err(err) =
        tokio::fs::set_permissions(&task.dst, std::fs::Permissions::from_mode(mode)).await
    {
        Error::io(OP, ErrorKind::SetPermissionsFailed, &task.dst, err).log();
    }
    summary
}

/// Enumerates `task.src`, copies every entry and waits for all of it.
async fn copy_contents(task: &CopyTask, settings: Settings) -> Summary {
    const OP: &str = "copy_dir";
    tracing::debug!("process contents of 'src' directory");
    let entries = match retry::open_dir(&task.src, settings.retry_backoff).await {
        Ok(entries) => entries,
        Err(err) => {
            Error::io(OP, ErrorKind::OpenFailed, &task.src, err).log();
            return Summary::default();
        }
    };
    let mut join_set = tokio::task::JoinSet::new();
    let (mut summary, subdirs) = enumerate(task, settings, entries, &mut join_set).await;
    // our handle is closed by now, subdirectories open their own
    for subdir in subdirs {
        retry::spawn(&mut join_set, "copy_dir", copy_dir(subdir, settings));
    }
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok(child_summary) => summary = summary + child_summary,
            Err(err) => {
                Error::io(OP, ErrorKind::JoinFailed, &task.src, err.into()).log();
            }
        }
    }
    summary
}

/// Creates `dst`, writable by us until its children are in place.
async fn create_dir(dst: &std::path::Path, mode: u32) -> Result<Summary, Error> {
    const OP: &str = "copy_dir";
    let Err(error) = tokio::fs::DirBuilder::new()
        .mode(mode | 0o700)
        .create(dst)
        .await
    else {
        return Ok(Summary {
            directories_created: 1,
            ..Default::default()
        });
    };
    if error.kind() != std::io::ErrorKind::AlreadyExists {
        return Err(Error::io(OP, ErrorKind::CreateFailed, dst, error));
    }
    // left over from an earlier run, reuse it as long as it is a directory
    let dst_metadata = tokio::fs::metadata(dst)
        .await
        .map_err(|err| Error::io(OP, ErrorKind::MetadataQueryFailed, dst, err))?;
    if !dst_metadata.is_dir() {
        return Err(Error::io(OP, ErrorKind::CreateFailed, dst, error));
    }
    tracing::debug!("'dst' is a directory, leaving it as is");
    Ok(Summary {
        directories_unchanged: 1,
        ..Default::default()
    })
}

/// Reads all of `entries`, spawning a task per file and collecting the subdirectories.
///
/// `entries` is consumed, so the directory handle is closed once this returns and before any
/// subdirectory task is started.
async fn enumerate(
    task: &CopyTask,
    settings: Settings,
    mut entries: tokio::fs::ReadDir,
    join_set: &mut tokio::task::JoinSet<Summary>,
) -> (Summary, Vec<CopyTask>) {
    const OP: &str = "copy_dir";
    let mut summary = Summary::default();
    let mut subdirs = vec![];
    loop {
        // ReadDir never yields "." or ".."
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                Error::io(OP, ErrorKind::ReadFailed, &task.src, err).log();
                break;
            }
        };
        let child = match task.child(&entry.file_name()) {
            Ok(child) => child,
            Err(error) => {
                error.log();
                continue;
            }
        };
        let metadata = match tokio::fs::symlink_metadata(&child.src).await {
            Ok(metadata) => metadata,
            Err(err) => {
                Error::io(OP, ErrorKind::MetadataQueryFailed, &child.src, err).log();
                continue;
            }
        };
        match EntryKind::of(&metadata) {
            EntryKind::RegularFile => {
                retry::spawn(join_set, "copy_file", copy_file(child, settings));
            }
            EntryKind::Directory => subdirs.push(child),
            EntryKind::Other => {
                tracing::debug!("skipping {:?}: {:?}", &child.src, metadata.file_type());
                summary.entries_skipped += 1;
            }
        }
    }
    (summary, subdirs)
}
