//! Constructing a [`DavServer`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dav::Handler;
use crate::{host_fs, DavServer, FsError};

/// Settings for serving a directory.
///
/// ```toml
/// root = "/sdcard/Documents"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The directory every request is confined to.
    pub root: PathBuf,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }
}

/// Errors that can occur while setting up a [`DavServer`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("A root directory is required")]
    RootRequired,
    #[error("Unable to serve \"{}\"", path.display())]
    Root {
        #[source]
        error: FsError,
        path: PathBuf,
    },
    #[error("Unable to parse the configuration")]
    Parse(#[source] toml::de::Error),
}

/// A builder for [`DavServer`].
#[derive(Debug, Default, Clone)]
pub struct Builder {
    root: Option<PathBuf>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Serve this directory.
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Apply every setting from a [`Config`].
    pub fn with_config(self, config: &Config) -> Self {
        self.with_root(&config.root)
    }

    /// Canonicalize the root and wrap it in the built-in WebDAV handler.
    pub fn build(self) -> Result<DavServer, ConfigError> {
        let root = self.root.ok_or(ConfigError::RootRequired)?;
        let fs = host_fs::FileSystem::new(&root)
            .map_err(|error| ConfigError::Root { error, path: root })?;

        tracing::debug!(root = %fs.root().display(), "serving directory");
        Ok(DavServer::new(Handler::new(fs)))
    }
}
