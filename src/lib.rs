//! envtree: environment-scoped, lockable configuration tree.
//!
//! Configuration is built by registering YAML documents, each keyed by a
//! named deployment environment. Registered documents merge additively into
//! one hierarchy of [`ConfigNode`]s; once loading is done the tree is locked,
//! and reads of undefined keys or stray writes fail loudly instead of
//! silently returning defaults.
//!
//! ```no_run
//! use envtree::{Configuration, RegisterOptions};
//!
//! let mut config = Configuration::with_env("dev");
//! config.register("/etc/myapp/config.yaml", RegisterOptions::default())?;
//! let db = config.root().get("database")?;
//! # Ok::<(), envtree::Error>(())
//! ```

pub mod error;
pub mod loader;
pub mod tree;

pub use error::{Error, Result};
pub use loader::{
    Configuration, DEFAULT_ENV, Directive, ENV_FILE, RegisterOptions, discover_env,
    discover_env_at,
};
pub use tree::{ConfigNode, ConfigTree, Entry, merge_document};
