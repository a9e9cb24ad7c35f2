//! Directive registry and environment-keyed document loading.
//!
//! Every registration is recorded as an immutable [`Directive`] and applied
//! to the tree immediately. The recorded directives are the sole input to a
//! rebuild: switching environments replays them in registration order
//! against the originally captured documents, never re-reading disk.

use crate::error::{Error, Result};
use crate::tree::{ConfigNode, UnlockGuard, merge_document};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Well-known file whose trimmed contents name the active environment.
pub const ENV_FILE: &str = "/etc/flags/env";

/// Environment used when the discovery file is absent.
pub const DEFAULT_ENV: &str = "local";

/// Discover the active environment from [`ENV_FILE`].
pub fn discover_env() -> String {
    discover_env_at(Path::new(ENV_FILE))
}

/// Discover the active environment from an explicit file, falling back to
/// [`DEFAULT_ENV`] when the file is absent or unreadable.
pub fn discover_env_at(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.trim().to_string(),
        Err(_) => DEFAULT_ENV.to_string(),
    }
}

/// Options for a single registration.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Merge the whole document without per-environment selection.
    pub raw: bool,
    /// Tolerate a missing file (the directive is still recorded).
    pub optional: bool,
    /// Dotted path under which the selected content is mounted.
    pub nested: Option<String>,
}

impl RegisterOptions {
    pub fn raw() -> Self {
        Self {
            raw: true,
            ..Self::default()
        }
    }

    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    pub fn nested(path: impl Into<String>) -> Self {
        Self {
            nested: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Immutable record of one registration call.
///
/// `document` is `None` when the source was absent (optional registration)
/// or parsed to an empty document; a replay reuses it verbatim.
#[derive(Debug, Clone)]
pub struct Directive {
    document: Option<Value>,
    filepath: Option<PathBuf>,
    raw: bool,
    optional: bool,
    nested: Option<String>,
}

impl Directive {
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }
}

/// Process-wide configuration state: active environment, recorded
/// directives, and the root of the locked tree.
///
/// The tree is locked except during the body of a single directive
/// application; the final tree is always derivable from the directive list
/// plus the active environment.
pub struct Configuration {
    env: String,
    directives: Vec<Directive>,
    root: ConfigNode,
}

impl Configuration {
    /// New configuration with the environment discovered from [`ENV_FILE`].
    pub fn new() -> Self {
        Self::with_env(discover_env())
    }

    /// New configuration with an explicit environment, skipping discovery.
    pub fn with_env(env: impl Into<String>) -> Self {
        let root = ConfigNode::root();
        root.tree().lock();
        Self {
            env: env.into(),
            directives: Vec::new(),
            root,
        }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Root node of the merged tree. Reads navigate from here.
    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    /// Directives in registration order.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Plain-data snapshot of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.root.to_value()
    }

    /// Register a YAML file and merge its environment-selected content.
    ///
    /// Only absolute paths are accepted, so that load success never depends
    /// on the process working directory.
    pub fn register(&mut self, filepath: impl AsRef<Path>, options: RegisterOptions) -> Result<()> {
        let filepath = filepath.as_ref();
        if !filepath.is_absolute() {
            return Err(Error::RelativePath {
                path: filepath.to_path_buf(),
            });
        }
        let document = if options.optional && !filepath.exists() {
            warn!(path = %filepath.display(), "optional config file absent, skipping");
            None
        } else {
            let contents = std::fs::read_to_string(filepath).map_err(|source| Error::Io {
                path: filepath.to_path_buf(),
                source,
            })?;
            let parsed: Value =
                serde_yaml::from_str(&contents).map_err(|source| Error::ConfigFile {
                    path: filepath.to_path_buf(),
                    source,
                })?;
            match parsed {
                // An empty YAML file parses to null; treat it as no content.
                Value::Null => None,
                value => Some(value),
            }
        };
        self.register_parsed(document, Some(filepath.to_path_buf()), options)
    }

    /// Record a pre-parsed document and apply it immediately.
    ///
    /// `filepath` is `None` for in-memory registration; file-sourced
    /// documents keep their origin for diagnostics and environment checks.
    pub fn register_parsed(
        &mut self,
        document: Option<Value>,
        filepath: Option<PathBuf>,
        options: RegisterOptions,
    ) -> Result<()> {
        self.directives.push(Directive {
            document,
            filepath,
            raw: options.raw,
            optional: options.optional,
            nested: options.nested,
        });
        let directive = &self.directives[self.directives.len() - 1];
        self.apply_directive(directive)
    }

    /// Apply one directive: select the effective mapping for the active
    /// environment and merge it at the directive's mount point, inside an
    /// unlock/re-lock bracket.
    fn apply_directive(&self, directive: &Directive) -> Result<()> {
        if directive.optional && directive.document.is_none() {
            return Ok(());
        }

        let file_sourced = directive.filepath.is_some();

        if !directive.raw && file_sourced && directive.document.is_some() {
            let has_env = directive
                .document
                .as_ref()
                .and_then(Value::as_object)
                .is_some_and(|map| map.contains_key(&self.env));
            if !has_env {
                return Err(Error::MissingEnvironment {
                    env: self.env.clone(),
                    path: directive.filepath.clone().unwrap_or_default(),
                });
            }
        }

        let choice = if directive.raw {
            directive.document.clone().unwrap_or(Value::Null)
        } else if file_sourced {
            match &directive.document {
                Some(document) => document
                    .as_object()
                    .and_then(|map| map.get(&self.env))
                    .cloned()
                    .unwrap_or(Value::Null),
                // Empty file: merge nothing, but keep the directive recorded.
                None => Value::Object(Map::new()),
            }
        } else {
            directive.document.clone().unwrap_or(Value::Null)
        };

        let _guard = UnlockGuard::new(self.root.tree());

        let mut mount = self.root.clone();
        if let Some(nested) = &directive.nested {
            for segment in nested.split('.') {
                mount = mount.child(segment)?;
            }
        }

        match &choice {
            Value::Null => {}
            Value::Object(map) => merge_document(&mount, map)?,
            other => {
                return Err(Error::InvalidDocument {
                    node: mount.name(),
                    found: value_kind(other).to_string(),
                });
            }
        }

        debug!(
            env = %self.env,
            path = ?directive.filepath,
            raw = directive.raw,
            "applied config directive"
        );
        Ok(())
    }

    /// Clear the tree and replay every directive, in registration order,
    /// against the current environment. Documents are reused as captured;
    /// files are never re-read.
    pub fn reapply(&self) -> Result<()> {
        self.root.clear();
        for directive in &self.directives {
            self.apply_directive(directive)?;
        }
        Ok(())
    }

    /// Switch the active environment and rebuild the tree. The result is the
    /// same tree a fresh process started with `env` would have produced.
    pub fn set_env(&mut self, env: impl Into<String>) -> Result<()> {
        self.env = env.into();
        info!(env = %self.env, "switching environment, reapplying directives");
        self.reapply()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_raw_in_memory_roundtrip() {
        let mut config = Configuration::with_env("test");
        let input = json!({"a": 1, "b": {"c": [1, 2], "d": "x"}});
        config
            .register_parsed(Some(input.clone()), None, RegisterOptions::raw())
            .unwrap();
        assert_eq!(config.snapshot(), input);
    }

    #[test]
    fn test_in_memory_non_raw_skips_env_selection() {
        let mut config = Configuration::with_env("test");
        config
            .register_parsed(
                Some(json!({"x": 1})),
                None,
                RegisterOptions::default(),
            )
            .unwrap();
        assert_eq!(config.snapshot(), json!({"x": 1}));
    }

    #[test]
    fn test_tree_locked_after_registration() {
        let mut config = Configuration::with_env("test");
        config
            .register_parsed(Some(json!({"a": 1})), None, RegisterOptions::raw())
            .unwrap();
        assert!(config.root().is_locked());
        assert!(matches!(
            config.root().get("missing"),
            Err(Error::UndefinedKey { .. })
        ));
    }

    #[test]
    fn test_tree_relocked_after_failed_directive() {
        let mut config = Configuration::with_env("test");
        let err = config
            .register_parsed(Some(json!([1, 2, 3])), None, RegisterOptions::raw())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
        assert!(config.root().is_locked());
    }

    #[test]
    fn test_nested_mount_path() {
        let mut config = Configuration::with_env("test");
        config
            .register_parsed(
                Some(json!({"host": "db.internal"})),
                None,
                RegisterOptions {
                    raw: true,
                    nested: Some("services.database".to_string()),
                    ..RegisterOptions::default()
                },
            )
            .unwrap();
        assert_eq!(
            config.snapshot(),
            json!({"services": {"database": {"host": "db.internal"}}})
        );
    }

    #[test]
    fn test_merges_are_additive_across_directives() {
        let mut config = Configuration::with_env("test");
        config
            .register_parsed(Some(json!({"a": {"b": 1}})), None, RegisterOptions::raw())
            .unwrap();
        config
            .register_parsed(Some(json!({"a": {"c": 2}})), None, RegisterOptions::raw())
            .unwrap();
        assert_eq!(config.snapshot(), json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn test_discover_env_reads_trimmed_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  staging  ").unwrap();
        assert_eq!(discover_env_at(file.path()), "staging");
    }

    #[test]
    fn test_discover_env_falls_back_when_absent() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            discover_env_at(&dir.path().join("no-such-file")),
            DEFAULT_ENV
        );
    }
}
