//! Platform shims
//!
//! Positional I/O, durable sync and advisory locking. Each maps to the
//! strongest primitive the platform offers, with a std fallback elsewhere.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Ensures data is durably written to persistent storage before returning.
///
/// - Linux: `fdatasync()` (data without metadata such as mtime)
/// - macOS/iOS: `fcntl(F_FULLFSYNC)`; plain fsync stops at the drive cache there
/// - Other: `File::sync_data()`
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File reference.
        let result = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File reference.
        let result = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios")))]
    {
        file.sync_data()
    }
}

/// Read exactly `buf.len()` bytes at `offset` without moving a cursor
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut done = 0;
        while done < buf.len() {
            let n = file.seek_read(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            done += n;
        }
        Ok(())
    }
}

/// Write all of `buf` at `offset` without moving a cursor
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.write_all_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut done = 0;
        while done < buf.len() {
            let n = file.seek_write(&buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer"));
            }
            done += n;
        }
        Ok(())
    }
}

/// Advisory lock strength
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockLevel {
    Shared,
    Exclusive,
}

/// Advisory whole-file lock (`flock`), released on drop
///
/// Locks belong to the open file description, so two `LockFile`s on the
/// same path conflict even inside one process.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
    level: Option<LockLevel>,
}

impl LockFile {
    /// Open (creating if needed) the lock file without locking it
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            level: None,
        })
    }

    /// Try to take (or convert to) `level` without blocking
    ///
    /// Returns `Ok(false)` when another holder prevents it. flock drops the
    /// old lock before converting, so a failed conversion re-takes it.
    pub fn try_lock(&mut self, level: LockLevel) -> io::Result<bool> {
        if self.level == Some(level) {
            return Ok(true);
        }

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let op = match level {
                LockLevel::Shared => libc::LOCK_SH,
                LockLevel::Exclusive => libc::LOCK_EX,
            };
            // SAFETY: the fd comes from a live File we own.
            let rc = unsafe { libc::flock(self.file.as_raw_fd(), op | libc::LOCK_NB) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                if let Some(previous) = self.level.take() {
                    let op = match previous {
                        LockLevel::Shared => libc::LOCK_SH,
                        LockLevel::Exclusive => libc::LOCK_EX,
                    };
                    // SAFETY: as above.
                    if unsafe { libc::flock(self.file.as_raw_fd(), op | libc::LOCK_NB) } == 0 {
                        self.level = Some(previous);
                    }
                }
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(false);
                }
                return Err(err);
            }
        }

        #[cfg(not(unix))]
        tracing::debug!(path = ?self.path, "advisory locks unsupported on this platform");

        self.level = Some(level);
        Ok(true)
    }

    pub fn level(&self) -> Option<LockLevel> {
        self.level
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unlock(&mut self) {
        if self.level.take().is_none() {
            return;
        }

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the fd comes from a live File we own.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.unlock();
    }
}
