//! Structured error types for configuration loading and access.

use std::path::PathBuf;

/// Errors raised while registering, merging, or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-raw, file-sourced document has no top-level key for the
    /// active environment.
    #[error(
        "current environment {env} not defined in config file {} \
         (HINT: the file needs a top-level YAML key named {env}; you may \
         want to inherit a default via YAML's `<<` operator)",
        .path.display()
    )]
    MissingEnvironment { env: String, path: PathBuf },

    /// A locked-tree read referenced a key that was never registered.
    #[error("configuration key not found: {path}.{key}")]
    UndefinedKey { path: String, key: String },

    /// A write was attempted while the tree is locked.
    #[error("cannot set key {key} for locked node {node}")]
    Locked { key: String, node: String },

    /// The YAML parser rejected a registered file.
    #[error("{source} (while loading {})", .path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A registered file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `register` only accepts absolute paths, so that load success never
    /// depends on the process working directory.
    #[error(
        "register only accepts absolute paths, not {} \
         (expand paths against a base directory before registering)",
        .path.display()
    )]
    RelativePath { path: PathBuf },

    /// The content selected for merging was not a mapping.
    #[error("cannot merge non-mapping value into {node}: found {found}")]
    InvalidDocument { node: String, found: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;
