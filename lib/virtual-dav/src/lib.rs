//! Expose a host directory over WebDAV without opening a socket.
//!
//! The crate is split along the same seams as the request flow:
//!
//! - [`resolve()`] confines a `/`-separated protocol path beneath a root
//!   directory.
//! - [`host_fs::FileSystem`] implements the [`FileSystem`] capability set on
//!   the local disk.
//! - [`to_file_info()`] turns host metadata into a root-relative [`FileInfo`].
//! - [`dav::Handler`] speaks WebDAV on top of any [`FileSystem`], behind the
//!   [`DavHandler`] seam.
//! - [`DavServer`] builds an in-memory request, runs the handler once and
//!   captures the response as a plain [`HttpResponse`].
//!
//! ```rust,no_run
//! # use std::collections::HashMap;
//! # fn main() -> Result<(), virtual_dav::ConfigError> {
//! let server = virtual_dav::DavServer::builder()
//!     .with_root("/sdcard/Documents")
//!     .build()?;
//!
//! let response = server.handle_http_request("MKCOL", "/photos", &HashMap::new(), &[]);
//! assert_eq!(response.status_code, 201);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{self, Read};
use std::time::SystemTime;

use thiserror::Error;

pub mod bridge;
pub mod config;
pub mod dav;
pub mod host_fs;
mod metadata;
mod resolve;

pub use bridge::{BridgeError, DavServer, HttpResponse, ResponseRecorder};
pub use config::{Builder, Config, ConfigError};
pub use dav::{DavHandler, ResponseWriter};
pub use metadata::to_file_info;
pub use resolve::resolve;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, FsError>;

/// The set of path-addressed operations a WebDAV handler needs from a
/// storage backend.
///
/// Every path is a `/`-separated protocol path relative to the backend's
/// root; an empty path or `/` names the root itself. Each call receives a
/// [`CancellationToken`] which implementations check before they start any
/// blocking work. A call that is already inside a host syscall is not
/// interrupted.
pub trait FileSystem: fmt::Debug + Send + Sync {
    /// Open a file for reading.
    fn open(&self, cancel: &CancellationToken, path: &str) -> Result<Box<dyn Read + Send>>;

    fn stat(&self, cancel: &CancellationToken, path: &str) -> Result<FileInfo>;

    /// Like [`FileSystem::stat`], but a symlink describes itself instead of
    /// its target.
    fn symlink_stat(&self, cancel: &CancellationToken, path: &str) -> Result<FileInfo> {
        self.stat(cancel, path)
    }

    /// List a directory. With `recursive` set, each subdirectory's listing
    /// directly follows its own entry.
    fn read_dir(
        &self,
        cancel: &CancellationToken,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileInfo>>;

    /// Write `body` to `path`, creating the file or truncating an existing one.
    ///
    /// Returns the descriptor of the written file and whether it counts as
    /// created, which is always `true`.
    fn create(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &mut dyn Read,
        options: &CreateOptions,
    ) -> Result<(FileInfo, bool)>;

    /// Create a directory and any missing parents. An existing directory is
    /// not an error.
    fn mkdir(&self, cancel: &CancellationToken, path: &str) -> Result<()>;

    /// Remove a file or a whole directory tree. A missing path is not an error.
    fn remove_all(
        &self,
        cancel: &CancellationToken,
        path: &str,
        options: &RemoveAllOptions,
    ) -> Result<()>;

    /// Copy a single file. Directories are rejected with
    /// [`FsError::Unsupported`].
    fn copy(
        &self,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        options: &CopyOptions,
    ) -> Result<bool>;

    /// Move a file or directory, atomically where the host allows it.
    fn rename(
        &self,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        options: &MoveOptions,
    ) -> Result<bool>;
}

/// Metadata about a single entry, relative to the filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// `/`-separated path relative to the root, empty for the root itself.
    pub path: String,
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Fail with [`FsError::AlreadyExists`] instead of truncating.
    pub no_overwrite: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemoveAllOptions {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    pub no_overwrite: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MoveOptions {
    pub no_overwrite: bool,
}

/// Error type for external users
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// The root given to the filesystem was not a directory
    #[error("root is not a directory")]
    BaseNotDirectory,
    /// Expected a file but found a directory
    #[error("is a directory")]
    IsADirectory,
    /// Expected a directory but found something else
    #[error("not a directory")]
    NotADirectory,
    /// File exists
    #[error("file exists")]
    AlreadyExists,
    /// The operation is not supported for this kind of entry
    #[error("unsupported operation")]
    Unsupported,
    /// Caller was not allowed to perform this operation
    #[error("permission denied")]
    PermissionDenied,
    /// Something failed when doing IO. These errors can generally not be handled.
    /// It may work if tried again.
    #[error("io error")]
    IOError,
    /// The operation was cancelled or interrupted before it could finish
    #[error("operation interrupted")]
    Interrupted,
    /// Invalid internal data, if the argument data is invalid, use `InvalidInput`
    #[error("invalid internal data")]
    InvalidData,
    /// The provided data is invalid
    #[error("invalid input")]
    InvalidInput,
    /// The requested file or directory could not be found
    #[error("entry not found")]
    EntryNotFound,
    /// The directory is not empty
    #[error("directory not empty")]
    DirectoryNotEmpty,
    /// The storage device has no room left
    #[error("no space left on device")]
    StorageFull,
    /// Some other unhandled error. If you see this, it's probably a bug.
    #[error("unknown error found")]
    UnknownError,
}

impl From<io::Error> for FsError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::NotFound => FsError::EntryNotFound,
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                FsError::PermissionDenied
            }
            io::ErrorKind::IsADirectory => FsError::IsADirectory,
            io::ErrorKind::NotADirectory => FsError::NotADirectory,
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty,
            io::ErrorKind::StorageFull => FsError::StorageFull,
            io::ErrorKind::Unsupported => FsError::Unsupported,
            io::ErrorKind::Interrupted => FsError::Interrupted,
            io::ErrorKind::InvalidData => FsError::InvalidData,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidFilename => FsError::InvalidInput,
            io::ErrorKind::Other
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
            | io::ErrorKind::CrossesDevices => FsError::IOError,
            // if the following triggers, a new error type was added to this non-exhaustive enum
            _ => FsError::UnknownError,
        }
    }
}
