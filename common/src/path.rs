use std::os::unix::ffi::OsStrExt;

use crate::error::{Error, ErrorKind};

/// Longest path, in bytes, the OS accepts, including the terminating NUL.
pub const MAX_PATH_LEN: usize = libc::PATH_MAX as usize;

/// Joins `base` and `name` with a single separator.
///
/// Fails instead of truncating when the result plus its terminator would not fit in
/// [`MAX_PATH_LEN`]. Neither input is modified.
pub fn join(base: &std::path::Path, name: &std::ffi::OsStr) -> Result<std::path::PathBuf, Error> {
    let len = base.as_os_str().as_bytes().len() + name.as_bytes().len() + 2;
    if len > MAX_PATH_LEN {
        return Err(Error::io(
            "build_path",
            ErrorKind::PathTooLong,
            &base.join(name),
            std::io::Error::from_raw_os_error(libc::ENAMETOOLONG),
        ));
    }
    Ok(base.join(name))
}
