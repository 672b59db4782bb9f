use anyhow::anyhow;
use std::fs::File;
use syscalls::{syscall2, Sysno};

/// Exclusive advisory lock held for as long as the file stays open.
pub(crate) trait FileLock: Sized {
    /// Fails instead of blocking when another handle holds the lock.
    fn try_lock(self) -> anyhow::Result<Self>;
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
impl FileLock for File {
    fn try_lock(self) -> anyhow::Result<Self> {
        const LOCK_EX: usize = 0x2;
        const LOCK_NB: usize = 0x4;
        let fd = self.as_raw_fd();
        let result = unsafe { syscall2(Sysno::flock, fd as usize, LOCK_EX | LOCK_NB) };
        match result {
            Ok(_) => Ok(self),
            Err(err) => Err(anyhow!(
                "cannot lock storage file (fd={fd}), it may be in use by another storage: {err}"
            )),
        }
    }
}
