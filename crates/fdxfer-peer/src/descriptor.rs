use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{PeerError, Result};

/// Duplicate `fd` into a fresh, close-on-exec descriptor.
///
/// The original stays open and owned by the caller.
pub fn duplicate(fd: BorrowedFd<'_>) -> Result<OwnedFd> {
    let dup = fd.try_clone_to_owned().map_err(PeerError::Duplicate)?;
    if dup.as_raw_fd() == fd.as_raw_fd() {
        return Err(PeerError::DuplicateReused { fd: fd.as_raw_fd() });
    }
    Ok(dup)
}

/// Whether `fd` refers to an open descriptor in this process.
pub fn check_open(fd: BorrowedFd<'_>) -> std::io::Result<()> {
    // SAFETY: F_GETFD only inspects the descriptor table entry.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Take ownership of descriptors the kernel just installed.
///
/// # Safety
///
/// Every value must be an open descriptor that nothing else in the process
/// owns or will close.
pub(crate) unsafe fn adopt(fds: &[RawFd]) -> Vec<OwnedFd> {
    fds.iter()
        // SAFETY: upheld by the caller.
        .map(|&fd| unsafe { OwnedFd::from_raw_fd(fd) })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd;

    use super::*;

    #[test]
    fn duplicate_is_distinct_and_open() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let dup = duplicate(file.as_fd()).unwrap();
        assert_ne!(dup.as_raw_fd(), file.as_raw_fd());
        check_open(dup.as_fd()).unwrap();
        drop(dup);
        check_open(file.as_fd()).unwrap();
    }
}
