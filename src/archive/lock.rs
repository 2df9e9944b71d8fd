use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;

use parking_lot::Mutex;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Uid;

/// Outcome of asking to write a record while another writer may hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockVerdict {
    Okay, // lock free, proceed
    Wait, // held by an earlier-index writer; back off and retry
    Bail, // held by a later-index writer; that write supersedes this one
}

/// In-use map keyed by identifier, holding the version index of the
/// writer currently inside. Serializes writes per id and guarantees
/// newer-version-wins without a global ordering service.
pub struct UidLockTable {
    in_use: Mutex<HashMap<i32, u64>>,
}

impl UidLockTable {
    pub fn new() -> Self {
        UidLockTable {
            in_use: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(&self, uid: Uid, index: u64) -> LockVerdict {
        let mut in_use = self.in_use.lock();
        match in_use.get(&uid.0) {
            None => {
                in_use.insert(uid.0, index);
                LockVerdict::Okay
            }
            Some(&held) if held < index => LockVerdict::Wait,
            Some(_) => LockVerdict::Bail,
        }
    }

    pub fn release(&self, uid: Uid, index: u64) {
        let mut in_use = self.in_use.lock();
        if in_use.get(&uid.0) == Some(&index) {
            in_use.remove(&uid.0);
        }
    }
}

impl Default for UidLockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Advisory exclusive lock on an archive/index/invert root: the roots are
/// owned by a single process tree at a time.
pub struct RootLock {
    pub file: File,
}

impl RootLock {
    pub fn acquire(root: &Path) -> Result<Self> {
        let lock_path = root.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use libc::{LOCK_EX, LOCK_NB, flock};
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    return Err(Error::new(
                        ErrorKind::Contention,
                        format!("root {} is owned by another process", root.display()),
                    ));
                }
            }
        }

        Ok(RootLock { file })
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{LOCK_UN, flock};
            use std::os::unix::io::AsRawFd;

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
