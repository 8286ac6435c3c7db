use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::error::Error;
use crate::model::{
    Entry, EntryKind, MutationOptions, SALT_KEYS, SetOutcome, ShuffleReport, TypeFilter,
};
use crate::reader::Reader;
use crate::remote::{RemoteSaltService, SaltSource};
use crate::salts::{
    DEFAULT_KEY_LENGTH, generate_key_with, generate_salt_set, is_salt_key, parse_salts,
};
use crate::template;
use crate::transformer::{FileTransformer, Transformer, write_atomic};

/// Largest edit distance for a "did you mean" suggestion.
const SUGGESTION_DISTANCE: usize = 2;

/// Settings for a freshly created config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub dbname: String,
    pub dbuser: String,
    pub dbpass: String,
    pub dbhost: String,
    pub dbprefix: String,
    pub dbcharset: String,
    pub dbcollate: String,
    pub locale: String,
    /// PHP inserted in front of the "stop editing" marker.
    pub extra_php: Option<String>,
    pub skip_salts: bool,
    /// Overwrite an existing file.
    pub force: bool,
    /// Allow the remote salt fallback to skip certificate checks.
    pub insecure: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            dbname: String::new(),
            dbuser: String::new(),
            dbpass: String::new(),
            dbhost: "localhost".to_owned(),
            dbprefix: "wp_".to_owned(),
            dbcharset: "utf8".to_owned(),
            dbcollate: String::new(),
            locale: String::new(),
            extra_php: None,
            skip_salts: false,
            force: false,
            insecure: false,
        }
    }
}

/// Reads go through the [`Reader`], writes through a [`Transformer`].
pub struct ConfigStore {
    path: PathBuf,
    reader: Reader,
    transformer: Box<dyn Transformer>,
    rng: Box<dyn RngCore>,
    salt_source: Box<dyn SaltSource>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Open an existing config file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::ConfigNotFound { path });
        }
        Ok(Self::at(path))
    }

    fn at(path: PathBuf) -> Self {
        Self {
            transformer: Box::new(FileTransformer::new(path.clone())),
            path,
            reader: Reader::new(),
            rng: Box::new(OsRng),
            salt_source: Box::new(RemoteSaltService::from_env()),
        }
    }

    /// Write a new config file from the template and apply `options`.
    pub fn create(path: impl Into<PathBuf>, options: &CreateOptions) -> Result<Self, Error> {
        Self::create_with(path, options, OsRng, RemoteSaltService::from_env())
    }

    /// [`ConfigStore::create`] with explicit sources of key material.
    pub fn create_with(
        path: impl Into<PathBuf>,
        options: &CreateOptions,
        rng: impl RngCore + 'static,
        salt_source: impl SaltSource + 'static,
    ) -> Result<Self, Error> {
        let path = path.into();
        if !is_valid_prefix(&options.dbprefix) {
            return Err(Error::validation(
                "The database prefix may only contain numbers, letters and underscores.",
            ));
        }
        if path.exists() && !options.force {
            return Err(Error::FileExists { path });
        }

        let mut store = Self::at(path)
            .with_rng(rng)
            .with_salt_source(salt_source);
        let salts = if options.skip_salts {
            Vec::new()
        } else {
            store.salt_set(options.insecure)?
        };
        write_atomic(
            &store.path,
            &template::render(&salts, options.extra_php.as_deref()),
        )?;
        debug!(path = %store.path.display(), "wrote config template");

        if let Err(err) = store.apply_settings(options) {
            if let Err(remove_err) = fs::remove_file(&store.path) {
                warn!(
                    path = %store.path.display(),
                    error = %remove_err,
                    "could not remove partially written config file"
                );
            }
            return Err(Error::Creation {
                path: store.path,
                source: Box::new(err),
            });
        }
        Ok(store)
    }

    pub fn with_reader(mut self, reader: Reader) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Box::new(transformer);
        self
    }

    pub fn with_rng(mut self, rng: impl RngCore + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_salt_source(mut self, salt_source: impl SaltSource + 'static) -> Self {
        self.salt_source = Box::new(salt_source);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name used in messages.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn entries(&self) -> Result<Vec<Entry>, Error> {
        self.reader.read(&self.path)
    }

    pub fn get(&self, name: &str, filter: TypeFilter) -> Result<Entry, Error> {
        let entries = self.entries()?;
        let mut matches = entries
            .iter()
            .filter(|entry| entry.name == name && filter.matches(entry.kind));
        match (matches.next(), matches.next()) {
            (Some(entry), None) => Ok(entry.clone()),
            (Some(_), Some(_)) => Err(Error::Ambiguous {
                name: name.to_owned(),
                file: self.file_name(),
            }),
            (None, _) => Err(Error::EntryNotFound {
                kind: filter.kind(),
                name: name.to_owned(),
                file: self.file_name(),
                suggestion: suggest(name, &entries),
            }),
        }
    }

    pub fn is_true(&self, name: &str, filter: TypeFilter) -> Result<bool, Error> {
        Ok(self.get(name, filter)?.value.is_truthy())
    }

    /// Entries whose name matches any filter: exactly when `strict`, as a
    /// substring otherwise. No filters lists everything.
    pub fn list(&self, filters: &[String], strict: bool) -> Result<Vec<Entry>, Error> {
        if strict && filters.is_empty() {
            return Err(Error::MissingFilter);
        }
        let entries = self.entries()?;
        if filters.is_empty() {
            return Ok(entries);
        }
        Ok(entries
            .into_iter()
            .filter(|entry| {
                filters.iter().any(|filter| {
                    if strict {
                        entry.name == *filter
                    } else {
                        entry.name.contains(filter.as_str())
                    }
                })
            })
            .collect())
    }

    /// Existence by lexical lookup; a name that is both a constant and a
    /// variable is an error unless `filter` picks one.
    pub fn has(&self, name: &str, filter: TypeFilter) -> Result<bool, Error> {
        self.resolve_kind(name, filter).map(|(_, exists)| exists)
    }

    pub fn set(
        &mut self,
        name: &str,
        value: &str,
        filter: TypeFilter,
        options: &MutationOptions,
    ) -> Result<SetOutcome, Error> {
        let (kind, exists) = self.resolve_kind(name, filter)?;
        if !exists && !options.add {
            return Err(Error::NotFoundWithoutAdd {
                kind: filter.kind(),
                name: name.to_owned(),
                file: self.file_name(),
            });
        }
        let changed = self.transformer.update(kind, name, value, options)?;
        debug!(kind = %kind, name, added = !exists, changed, "set entry");
        Ok(SetOutcome {
            kind,
            added: !exists,
            changed,
            raw: options.raw,
        })
    }

    pub fn delete(&mut self, name: &str, filter: TypeFilter) -> Result<EntryKind, Error> {
        let (kind, exists) = self.resolve_kind(name, filter)?;
        if !exists {
            let suggestion = self
                .entries()
                .ok()
                .and_then(|entries| suggest(name, &entries));
            return Err(Error::EntryNotFound {
                kind: filter.kind(),
                name: name.to_owned(),
                file: self.file_name(),
                suggestion,
            });
        }
        self.transformer.remove(kind, name)?;
        Ok(kind)
    }

    /// Regenerate salt constants. `keys` defaults to the eight well-known
    /// salts; other names are skipped unless `force`.
    pub fn shuffle_salts(
        &mut self,
        keys: &[String],
        force: bool,
        insecure: bool,
    ) -> Result<ShuffleReport, Error> {
        let requested: Vec<String> = if keys.is_empty() {
            SALT_KEYS.iter().map(|key| (*key).to_owned()).collect()
        } else {
            keys.to_vec()
        };

        let mut report = ShuffleReport::default();
        let mut targets = Vec::with_capacity(requested.len());
        for key in requested {
            if force || is_salt_key(&key) {
                targets.push(key);
            } else {
                debug!(key, "skipping unknown salt key");
                report.skipped += 1;
                report.skipped_keys.push(key);
            }
        }

        let values: Vec<(String, Option<String>)> = match self.local_keys(targets.len()) {
            Ok(values) => targets.into_iter().zip(values.into_iter().map(Some)).collect(),
            Err(Error::InsecureRandomnessUnavailable(err)) => {
                warn!(error = %err, "secure randomness unavailable, fetching salts remotely");
                let remote = parse_salts(&self.salt_source.fetch_salts(insecure)?)?;
                report.used_remote = true;
                targets
                    .into_iter()
                    .map(|key| {
                        let value = remote
                            .iter()
                            .find(|(name, _)| *name == key)
                            .map(|(_, value)| value.clone());
                        (key, value)
                    })
                    .collect()
            }
            Err(err) => return Err(err),
        };

        let options = MutationOptions::default();
        for (key, value) in values {
            let Some(value) = value else {
                report.errored += 1;
                report
                    .failures
                    .push((key, "the remote service did not provide a value".to_owned()));
                continue;
            };
            match self
                .transformer
                .update(EntryKind::Constant, &key, &value, &options)
            {
                Ok(_) => report.succeeded += 1,
                Err(err) => {
                    warn!(key, error = %err, "could not update salt");
                    report.errored += 1;
                    report.failures.push((key, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    fn local_keys(&mut self, count: usize) -> Result<Vec<String>, Error> {
        (0..count)
            .map(|_| generate_key_with(&mut *self.rng, DEFAULT_KEY_LENGTH))
            .collect()
    }

    fn salt_set(&mut self, insecure: bool) -> Result<Vec<(String, String)>, Error> {
        match generate_salt_set(&mut *self.rng, true) {
            Err(Error::InsecureRandomnessUnavailable(err)) => {
                warn!(error = %err, "secure randomness unavailable, fetching salts remotely");
                parse_salts(&self.salt_source.fetch_salts(insecure)?)
            }
            other => other,
        }
    }

    fn apply_settings(&mut self, options: &CreateOptions) -> Result<(), Error> {
        let settings = [
            (EntryKind::Constant, "DB_HOST", &options.dbhost),
            (EntryKind::Constant, "DB_PASSWORD", &options.dbpass),
            (EntryKind::Variable, "table_prefix", &options.dbprefix),
            (EntryKind::Constant, "DB_CHARSET", &options.dbcharset),
            (EntryKind::Constant, "DB_COLLATE", &options.dbcollate),
            (EntryKind::Constant, "WPLANG", &options.locale),
            (EntryKind::Constant, "DB_NAME", &options.dbname),
            (EntryKind::Constant, "DB_USER", &options.dbuser),
        ];
        let mutation = MutationOptions::default();
        for (kind, name, value) in settings {
            if value.is_empty() {
                continue;
            }
            self.transformer.update(kind, name, value, &mutation)?;
        }
        Ok(())
    }

    /// Kind `name` should be edited as, and whether it exists yet.
    fn resolve_kind(&self, name: &str, filter: TypeFilter) -> Result<(EntryKind, bool), Error> {
        if let Some(kind) = filter.kind() {
            return Ok((kind, self.transformer.exists(kind, name)?));
        }
        let constant = self.transformer.exists(EntryKind::Constant, name)?;
        let variable = self.transformer.exists(EntryKind::Variable, name)?;
        match (constant, variable) {
            (true, true) => Err(Error::Ambiguous {
                name: name.to_owned(),
                file: self.file_name(),
            }),
            (false, true) => Ok((EntryKind::Variable, true)),
            (constant, false) => Ok((EntryKind::Constant, constant)),
        }
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

/// Closest other name within [`SUGGESTION_DISTANCE`] edits.
fn suggest(name: &str, entries: &[Entry]) -> Option<String> {
    entries
        .iter()
        .filter(|entry| entry.kind != EntryKind::Include && entry.name != name)
        .map(|entry| (levenshtein_distance(name, &entry.name), &entry.name))
        .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.clone())
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    let mut curr_row = vec![0; b.len() + 1];
    for (i, a_char) in a.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }
    prev_row[b.len()]
}
