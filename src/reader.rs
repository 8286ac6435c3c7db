use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Error;
use crate::eval::{Scope, Snapshot, execute_file, execute_source};
use crate::model::{Entry, EntryKind, Value};

/// Read the entries a config script defines, using a default [`Reader`].
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<Entry>, Error> {
    Reader::new().read(path)
}

/// Recovers the bindings a script defines by running it and diffing the
/// scope against a snapshot taken beforehand.
#[derive(Debug, Clone)]
pub struct Reader {
    host: Scope,
}

impl Reader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant the host provides before the script runs; it is never
    /// reported as an entry.
    pub fn with_host_constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.host.define(name, value);
        self
    }

    pub fn host(&self) -> &Scope {
        &self.host
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<Entry>, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let path = fs::canonicalize(path)?;

        let mut scope = self.host.clone();
        scope.mark_loaded(path.clone());
        let before = scope.snapshot();
        execute_file(&mut scope, &path)?;

        let entries = diff(&before, &scope);
        debug!(path = %path.display(), entries = entries.len(), "read config script");
        Ok(entries)
    }

    /// Like [`Reader::read`] for source that is not on disk; `path` only
    /// anchors `__DIR__`, `__FILE__` and relative includes.
    pub fn read_source(&self, source: &str, path: impl AsRef<Path>) -> Result<Vec<Entry>, Error> {
        let path = path.as_ref();
        let mut scope = self.host.clone();
        scope.mark_loaded(path.to_path_buf());
        let before = scope.snapshot();
        execute_source(&mut scope, source, path)?;
        Ok(diff(&before, &scope))
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self {
            host: Scope::with_builtins(),
        }
    }
}

/// Bindings in `after` that `before` did not know about: variables, then
/// constants, then included files, each in definition order.
pub fn diff(before: &Snapshot, after: &Scope) -> Vec<Entry> {
    let variables = after
        .variables()
        .iter()
        .filter(|(name, _)| !before.has_variable(name))
        .map(|(name, value)| Entry {
            name: name.to_owned(),
            value: value.clone(),
            kind: EntryKind::Variable,
        });

    let constants = after
        .constants()
        .iter()
        .filter(|(name, _)| !before.has_constant(name))
        .map(|(name, value)| Entry {
            name: name.to_owned(),
            value: value.clone(),
            kind: EntryKind::Constant,
        });

    let includes = after
        .loaded()
        .iter()
        .filter(|path| !before.has_loaded(path))
        .map(|path| Entry {
            name: include_name(path),
            value: Value::String(path.to_string_lossy().into_owned()),
            kind: EntryKind::Include,
        });

    variables.chain(constants).chain(includes).collect()
}

fn include_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_orders_variables_before_constants() {
        let entries = Reader::new()
            .read_source(
                "<?php define( 'DB_NAME', 'wp' ); $table_prefix = 'wp_';",
                "/srv/wp-config.php",
            )
            .expect("read");
        let names: Vec<_> = entries
            .iter()
            .map(|entry| (entry.kind, entry.name.as_str()))
            .collect();
        assert_eq!(
            names,
            [
                (EntryKind::Variable, "table_prefix"),
                (EntryKind::Constant, "DB_NAME")
            ]
        );
    }

    #[test]
    fn host_constants_are_not_reported() {
        let reader = Reader::new().with_host_constant("WP_CLI", Value::Bool(true));
        let entries = reader
            .read_source(
                "<?php define( 'WP_CLI', false ); define( 'A', PHP_EOL );",
                "/srv/wp-config.php",
            )
            .expect("read");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "A");
        assert_eq!(entries[0].value, Value::String("\n".into()));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_entries("/definitely/not/here/wp-config.php").expect_err("missing");
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }
}
