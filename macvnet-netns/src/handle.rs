//! Open network namespaces and thread-confined entry
//!
//! setns(2) changes the namespace of the calling *thread*. Rather than
//! switching a runtime worker back and forth, [`NetNs::run`] spawns a
//! dedicated thread, enters the namespace there, drives the operation on a
//! current-thread runtime and lets the thread exit. The thread that entered a
//! namespace is never reused, and the caller stays in the host namespace.

use nix::sched::{CloneFlags, setns};
use nix::sys::statfs::{NSFS_MAGIC, PROC_SUPER_MAGIC, fstatfs};
use std::fs::File;
use std::future::Future;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use macvnet_core::{Error, Result};

/// Namespace of the calling thread
const THREAD_SELF_NETNS: &str = "/proc/thread-self/ns/net";

/// Something that names a network namespace
///
/// Link backends are generic over this so that tests can stand in for real
/// namespaces.
pub trait NamespaceHandle: Send + Sync {
    /// Path the namespace was opened from
    fn path(&self) -> &Path;
}

/// An open network namespace
///
/// The file descriptor is closed when the handle is dropped.
#[derive(Debug)]
pub struct NetNs {
    file: File,
    path: PathBuf,
}

impl NetNs {
    /// Open the namespace at `path` (e.g. `/proc/1234/ns/net` or
    /// `/var/run/netns/cni-...`)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::Namespace {
            message: format!("failed to open netns {}: {e}", path.display()),
        })?;

        Self::from_file(file, path)
    }

    /// Open the namespace at `path`, or `None` if nothing is there any more
    pub fn try_open(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => Self::from_file(file, path).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(netns = %path.display(), "Namespace already gone");
                Ok(None)
            }
            Err(e) => Err(Error::Namespace {
                message: format!("failed to open netns {}: {e}", path.display()),
            }),
        }
    }

    /// Open the namespace of the calling thread
    pub fn current() -> Result<Self> {
        Self::open(THREAD_SELF_NETNS)
    }

    fn from_file(file: File, path: &Path) -> Result<Self> {
        let fs_type = fstatfs(&file)
            .map_err(|e| Error::Namespace {
                message: format!("failed to stat netns {}: {e}", path.display()),
            })?
            .filesystem_type();

        if fs_type != NSFS_MAGIC && fs_type != PROC_SUPER_MAGIC {
            return Err(Error::Namespace {
                message: format!("{} is not a network namespace", path.display()),
            });
        }

        trace!(netns = %path.display(), "Opened namespace");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the namespace was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` inside this namespace
    ///
    /// `op` is called on a fresh thread after it has entered the namespace,
    /// and the future it returns is driven to completion there. Sockets
    /// created by the future (netlink in particular) belong to this
    /// namespace. A panic inside `op` surfaces as a namespace error.
    pub async fn run<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>>,
        T: Send + 'static,
    {
        let target = self.file.try_clone()?;
        let path = self.path.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();

        std::thread::Builder::new()
            .name("macvnet-netns".to_string())
            .spawn({
                let path = path.clone();
                move || {
                    let result = enter_and_run(&target, &path, op);
                    // The receiver only goes away if the caller was cancelled
                    let _ = tx.send(result);
                }
            })?;

        rx.await.map_err(|_| Error::Namespace {
            message: format!("worker for netns {} exited without a result", path.display()),
        })?
    }
}

fn enter_and_run<F, Fut, T>(target: &File, path: &Path, op: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    setns(target, CloneFlags::CLONE_NEWNET).map_err(|e| Error::Namespace {
        message: format!("failed to enter netns {}: {e}", path.display()),
    })?;

    debug!(netns = %path.display(), "Entered namespace");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(op())
}

impl NamespaceHandle for NetNs {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for NetNs {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl Drop for NetNs {
    fn drop(&mut self) {
        trace!(netns = %self.path.display(), "Closing namespace");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_current_namespace() {
        let ns = NetNs::current().unwrap();
        assert_eq!(ns.path(), Path::new(THREAD_SELF_NETNS));
    }

    #[test]
    fn test_try_open_missing_namespace() {
        let missing = NetNs::try_open("/proc/self/ns/definitely-not-there").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_open_rejects_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = NetNs::open(file.path()).unwrap_err();
        assert!(err.to_string().contains("is not a network namespace"));
    }

    #[test]
    fn test_open_missing_path_is_namespace_error() {
        let err = NetNs::open("/nonexistent/netns").unwrap_err();
        assert!(matches!(err, Error::Namespace { .. }));
    }
}
