/// What went wrong in a copy task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Out of file descriptors or tasks. Names the class that is waited out rather than
    /// reported: `retry` sleeps through `EMFILE` and tokio queues tasks, so no copy task ever
    /// logs this kind.
    ResourceExhausted,
    PathTooLong,
    MetadataQueryFailed,
    CreateFailed,
    OpenFailed,
    ReadFailed,
    WriteFailed,
    SetPermissionsFailed,
    JoinFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::PathTooLong => "path too long",
            ErrorKind::MetadataQueryFailed => "lstat",
            ErrorKind::CreateFailed => "mkdir",
            ErrorKind::OpenFailed => "open",
            ErrorKind::ReadFailed => "read",
            ErrorKind::WriteFailed => "write",
            ErrorKind::SetPermissionsFailed => "chmod",
            ErrorKind::JoinFailed => "join",
        };
        f.write_str(name)
    }
}

/// Failure of a single copy task.
///
/// These never propagate past the task that hit them: the task logs the error with
/// [`Error::log`] and gives up on its own entry only.
///
/// # Logging Convention
/// Display shows `"<operation>: <kind> error: <path>"`; the OS error is the source, so use
/// [`Error::log`] (or `{:#}` on an `anyhow::Error`) to print the whole chain.
#[derive(Debug, thiserror::Error)]
#[error("{operation}: {kind} error: {path:?}")]
pub struct Error {
    pub operation: &'static str,
    pub kind: ErrorKind,
    pub path: std::path::PathBuf,
    #[source]
    pub source: Option<std::io::Error>,
}

impl Error {
    #[must_use]
    pub fn new(operation: &'static str, kind: ErrorKind, path: &std::path::Path) -> Self {
        Error {
            operation,
            kind,
            path: path.to_owned(),
            source: None,
        }
    }

    #[must_use]
    pub fn io(
        operation: &'static str,
        kind: ErrorKind,
        path: &std::path::Path,
        source: std::io::Error,
    ) -> Self {
        Error {
            operation,
            kind,
            path: path.to_owned(),
            source: Some(source),
        }
    }

    pub fn log(self) {
        tracing::error!("{:#}", anyhow::Error::from(self));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation_and_kind() {
        let error = Error::new(
            "copy_file",
            ErrorKind::OpenFailed,
            std::path::Path::new("/src/a.txt"),
        );
        assert_eq!(error.to_string(), "copy_file: open error: \"/src/a.txt\"");
    }

    #[test]
    fn kinds_use_syscall_names() {
        assert_eq!(ErrorKind::MetadataQueryFailed.to_string(), "lstat");
        assert_eq!(ErrorKind::SetPermissionsFailed.to_string(), "chmod");
        assert_eq!(ErrorKind::ResourceExhausted.to_string(), "resource exhausted");
    }

    #[test]
    fn alternate_format_includes_os_error() {
        let error = Error::io(
            "copy_dir",
            ErrorKind::CreateFailed,
            std::path::Path::new("/dst/sub"),
            std::io::Error::from_raw_os_error(libc::EACCES),
        );
        let message = format!("{:#}", anyhow::Error::from(error));
        assert!(message.starts_with("copy_dir: mkdir error: \"/dst/sub\": "));
        assert!(message.contains("Permission denied"), "{message}");
    }
}
