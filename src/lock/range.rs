//! Advisory byte-range locks
//!
//! Non-blocking POSIX `fcntl(F_SETLK)` write locks. These only exclude other
//! processes: locks are owned by the process, so two handles inside one
//! process never conflict. The protocol state itself (DEL/EWL counters,
//! record lock words) lives in the file and is what separates handles.
//!
//! On non-unix targets the primitive is a no-op that always succeeds.

use std::fs::File;

use crate::errors::{MstError, MstResult};

/// Held byte-range lock; released on drop.
pub struct RangeGuard<'a> {
    file: &'a File,
    start: u64,
    len: u64,
}

impl<'a> RangeGuard<'a> {
    /// Attempts to lock `start..start + len`. `Ok(None)` means another
    /// process holds a conflicting lock.
    pub fn try_lock(file: &'a File, start: u64, len: u64) -> MstResult<Option<Self>> {
        if sys::try_lock(file, start, len)
            .map_err(|e| MstError::io(format!("Failed to lock bytes {}+{}", start, len), e))?
        {
            Ok(Some(Self { file, start, len }))
        } else {
            Ok(None)
        }
    }

    pub fn range(&self) -> (u64, u64) {
        (self.start, self.len)
    }
}

impl Drop for RangeGuard<'_> {
    fn drop(&mut self) {
        let _ = sys::unlock(self.file, self.start, self.len);
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::fd::{AsFd, AsRawFd};

    use nix::errno::Errno;
    use nix::fcntl::{fcntl, FcntlArg};

    /// `Ok(false)` when another process holds a conflicting lock.
    fn set_lock(file: &File, kind: libc::c_int, start: u64, len: u64) -> io::Result<bool> {
        let flock = libc::flock {
            l_type: kind as _,
            l_whence: libc::SEEK_SET as _,
            l_start: start as libc::off_t,
            l_len: len as libc::off_t,
            l_pid: 0,
        };
        match fcntl(file.as_fd().as_raw_fd(), FcntlArg::F_SETLK(&flock)) {
            Ok(_) => Ok(true),
            Err(Errno::EACCES | Errno::EAGAIN) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn try_lock(file: &File, start: u64, len: u64) -> io::Result<bool> {
        set_lock(file, libc::F_WRLCK as libc::c_int, start, len)
    }

    pub fn unlock(file: &File, start: u64, len: u64) -> io::Result<()> {
        set_lock(file, libc::F_UNLCK as libc::c_int, start, len).map(|_| ())
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    pub fn try_lock(_file: &File, _start: u64, _len: u64) -> io::Result<bool> {
        Ok(true)
    }

    pub fn unlock(_file: &File, _start: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_lock_and_release() {
        let file = tempfile().unwrap();
        file.set_len(64).unwrap();
        let guard = RangeGuard::try_lock(&file, 24, 8).unwrap();
        assert!(guard.is_some());
        assert_eq!(guard.as_ref().map(|g| g.range()), Some((24, 8)));
        drop(guard);
        assert!(RangeGuard::try_lock(&file, 24, 8).unwrap().is_some());
    }

    #[test]
    fn test_relock_after_unlock_of_wider_range() {
        let file = tempfile().unwrap();
        file.set_len(64).unwrap();
        drop(RangeGuard::try_lock(&file, 0, 32).unwrap().unwrap());
        let guard = RangeGuard::try_lock(&file, 16, 16).unwrap().unwrap();
        assert_eq!(guard.range(), (16, 16));
    }

    #[test]
    fn test_same_process_never_conflicts() {
        let file = tempfile().unwrap();
        let _first = RangeGuard::try_lock(&file, 0, 24).unwrap().unwrap();
        assert!(RangeGuard::try_lock(&file, 0, 24).unwrap().is_some());
    }
}
