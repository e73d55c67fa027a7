/// Too many open file descriptors in this process.
#[must_use]
pub fn is_fd_exhausted(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(libc::EMFILE)
}
