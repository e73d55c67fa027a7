use crate::error::Error;
use crate::path;

/// One unit of copy work: a source entry and the place it is copied to.
///
/// Moved into the task that performs the copy, which drops it on every exit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub src: std::path::PathBuf,
    pub dst: std::path::PathBuf,
}

impl CopyTask {
    #[must_use]
    pub fn new(src: std::path::PathBuf, dst: std::path::PathBuf) -> Self {
        Self { src, dst }
    }

    /// Task for the entry `name` inside this (directory) task.
    pub fn child(&self, name: &std::ffi::OsStr) -> Result<Self, Error> {
        Ok(Self {
            src: path::join(&self.src, name)?,
            dst: path::join(&self.dst, name)?,
        })
    }
}

/// How an entry is handled, decided from metadata that does not follow symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    RegularFile,
    Directory,
    /// Symlinks, devices, sockets and FIFOs: skipped without spawning anything.
    Other,
}

impl EntryKind {
    #[must_use]
    pub fn of(metadata: &std::fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        if file_type.is_file() {
            EntryKind::RegularFile
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends_both_paths() {
        let task = CopyTask::new("/src".into(), "/dst/copy".into());
        let child = task.child(std::ffi::OsStr::new("sub")).unwrap();
        assert_eq!(child, CopyTask::new("/src/sub".into(), "/dst/copy/sub".into()));
    }

    #[test]
    fn child_fails_when_destination_is_too_long() {
        // the source side fits, the longer destination root does not
        let long_dst = format!("/{}", "d".repeat(path::MAX_PATH_LEN - 20));
        let task = CopyTask::new("/src".into(), long_dst.into());
        let name = "n".repeat(30);
        let error = task.child(std::ffi::OsStr::new(&name)).unwrap_err();
        assert_eq!(error.kind, crate::error::ErrorKind::PathTooLong);
    }

    #[test]
    fn classifies_without_following_symlinks() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let file = tmp_dir.path().join("file");
        let link = tmp_dir.path().join("link");
        std::fs::write(&file, "x").unwrap();
        std::os::unix::fs::symlink(&file, &link).unwrap();
        let kind = |path: &std::path::Path| EntryKind::of(&std::fs::symlink_metadata(path).unwrap());
        assert_eq!(kind(&file), EntryKind::RegularFile);
        assert_eq!(kind(tmp_dir.path()), EntryKind::Directory);
        assert_eq!(kind(&link), EntryKind::Other);
    }

    #[test]
    fn fifo_is_other() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let fifo = tmp_dir.path().join("fifo");
        nix::unistd::mkfifo(&fifo, nix::sys::stat::Mode::S_IRWXU).unwrap();
        let metadata = std::fs::symlink_metadata(&fifo).unwrap();
        assert_eq!(EntryKind::of(&metadata), EntryKind::Other);
    }
}
