use std::fs;
use std::path::{Path, PathBuf};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;
use wpconfig::{
    Anchor, CACHE_KEY_SALT, ConfigStore, CreateOptions, EntryKind, Error, FileTransformer,
    KEY_ALPHABET, MutationOptions, SALT_KEYS, SaltSource, Transformer, TypeFilter, Value,
};

const SAMPLE: &str = "<?php\n\
$table_prefix = 'wp_';\n\
define( 'DB_NAME', 'wordpress' );\n\
\n\
/* That's all, stop editing! Happy publishing. */\n\
require_once ABSPATH . 'wp-settings.php';\n";

struct BrokenRng;

impl RngCore for BrokenRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {}

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new(std::io::Error::other("no entropy")))
    }
}

/// Serves a fixed response body.
struct FixedSalts(&'static str);

impl SaltSource for FixedSalts {
    fn fetch_salts(&self, _insecure: bool) -> Result<String, Error> {
        Ok(self.0.to_owned())
    }
}

struct UnreachableSalts;

impl SaltSource for UnreachableSalts {
    fn fetch_salts(&self, _insecure: bool) -> Result<String, Error> {
        Err(Error::RemoteService {
            message: "connection refused".to_owned(),
        })
    }
}

fn fixture(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wp-config.php");
    fs::write(&path, content).expect("failed to write fixture file");
    (dir, path)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("failed to read config")
}

#[test]
fn lists_variables_before_constants() {
    let (_dir, path) = fixture(SAMPLE);
    let store = ConfigStore::open(&path).expect("open");

    let entries = store.list(&[], false).expect("list");
    let listed: Vec<_> = entries
        .iter()
        .map(|entry| (entry.name.as_str(), entry.kind, entry.value.clone()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("table_prefix", EntryKind::Variable, Value::String("wp_".into())),
            ("DB_NAME", EntryKind::Constant, Value::String("wordpress".into())),
        ]
    );
}

#[test]
fn list_filters_by_substring_or_exact_name() {
    let (_dir, path) = fixture(SAMPLE);
    let store = ConfigStore::open(&path).expect("open");

    let loose = store.list(&["prefix".to_owned()], false).expect("list");
    assert_eq!(loose.len(), 1);
    assert_eq!(loose[0].name, "table_prefix");

    let strict = store.list(&["prefix".to_owned()], true).expect("list");
    assert!(strict.is_empty());

    let err = store.list(&[], true).expect_err("strict needs a filter");
    assert!(matches!(err, Error::MissingFilter));
}

#[test]
fn set_raw_adds_before_the_marker() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path).expect("open");

    let outcome = store
        .set(
            "WP_DEBUG",
            "true",
            TypeFilter::All,
            &MutationOptions::default().raw(true),
        )
        .expect("set");
    assert_eq!(outcome.kind, EntryKind::Constant);
    assert!(outcome.added);
    assert!(outcome.raw);

    let content = read(&path);
    assert!(content.contains(
        "define( 'WP_DEBUG', true );\n/* That's all, stop editing! Happy publishing. */"
    ));
    assert_eq!(
        store.get("WP_DEBUG", TypeFilter::All).expect("get").value,
        Value::Bool(true)
    );
    assert!(store.is_true("WP_DEBUG", TypeFilter::Constant).expect("is-true"));
}

#[test]
fn repeated_set_does_not_duplicate() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path).expect("open");
    let options = MutationOptions::default();

    let first = store
        .set("WP_HOME", "https://example.test", TypeFilter::All, &options)
        .expect("first set");
    let after_first = read(&path);
    let second = store
        .set("WP_HOME", "https://example.test", TypeFilter::All, &options)
        .expect("second set");

    assert!(first.added && first.changed);
    assert!(!second.added && !second.changed);
    assert_eq!(read(&path), after_first);
    assert_eq!(after_first.matches("'WP_HOME'").count(), 1);
}

#[test]
fn update_only_touches_the_value() {
    let (_dir, path) = fixture("<?php\ndefine(\"DB_NAME\",   \"old\"); // keep me\n$table_prefix='wp_';\n");
    let mut store = ConfigStore::open(&path).expect("open");

    store
        .set("DB_NAME", "new", TypeFilter::Constant, &MutationOptions::default())
        .expect("set constant");
    store
        .set("table_prefix", "site_", TypeFilter::All, &MutationOptions::default())
        .expect("set variable");

    assert_eq!(
        read(&path),
        "<?php\ndefine(\"DB_NAME\",   'new'); // keep me\n$table_prefix='site_';\n"
    );
}

#[test]
fn normalize_rewrites_the_statement() {
    let (_dir, path) = fixture("<?php\ndefine(\"DB_NAME\",\"old\");\n");
    let mut store = ConfigStore::open(&path).expect("open");

    store
        .set(
            "DB_NAME",
            "new",
            TypeFilter::All,
            &MutationOptions::default().normalize(true),
        )
        .expect("set");
    assert_eq!(read(&path), "<?php\ndefine( 'DB_NAME', 'new' );\n");
}

#[test]
fn update_then_delete_then_has_is_false() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path).expect("open");

    store
        .set("WP_CACHE", "true", TypeFilter::Constant, &MutationOptions::default().raw(true))
        .expect("set");
    assert!(store.has("WP_CACHE", TypeFilter::All).expect("has"));

    let kind = store.delete("WP_CACHE", TypeFilter::All).expect("delete");
    assert_eq!(kind, EntryKind::Constant);
    assert!(!store.has("WP_CACHE", TypeFilter::All).expect("has"));
    assert_eq!(read(&path), SAMPLE);
}

#[test]
fn set_without_add_fails_for_missing_names() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path).expect("open");

    let err = store
        .set(
            "WP_DEBUG",
            "true",
            TypeFilter::Constant,
            &MutationOptions::default().add(false),
        )
        .expect_err("missing without add");
    assert!(matches!(err, Error::NotFoundWithoutAdd { ref name, .. } if name == "WP_DEBUG"));
    assert_eq!(read(&path), SAMPLE);
}

#[test]
fn set_at_end_of_file_with_custom_separator() {
    let (_dir, path) = fixture("<?php\n$a = 1;\n");
    let mut store = ConfigStore::open(&path).expect("open");

    store
        .set(
            "b",
            "2",
            TypeFilter::Variable,
            &MutationOptions::default()
                .raw(true)
                .anchor(Anchor::Eof)
                .separator("\n\n"),
        )
        .expect("set");
    assert_eq!(read(&path), "<?php\n$a = 1;\n\n$b = 2;\n");
}

#[test]
fn names_in_both_namespaces_are_ambiguous() {
    let (_dir, path) = fixture("<?php\ndefine( 'SHARED', 'constant' );\n$SHARED = 'variable';\n");
    let mut store = ConfigStore::open(&path).expect("open");

    let err = store.get("SHARED", TypeFilter::All).expect_err("ambiguous");
    assert!(matches!(err, Error::Ambiguous { .. }));
    assert!(matches!(
        store.has("SHARED", TypeFilter::All),
        Err(Error::Ambiguous { .. })
    ));
    assert!(matches!(
        store.set("SHARED", "x", TypeFilter::All, &MutationOptions::default()),
        Err(Error::Ambiguous { .. })
    ));
    assert!(matches!(
        store.delete("SHARED", TypeFilter::All),
        Err(Error::Ambiguous { .. })
    ));
    assert_eq!(
        read(&path),
        "<?php\ndefine( 'SHARED', 'constant' );\n$SHARED = 'variable';\n"
    );

    let constant = store.get("SHARED", TypeFilter::Constant).expect("constant");
    assert_eq!(constant.value, Value::String("constant".into()));
    let variable = store.get("SHARED", TypeFilter::Variable).expect("variable");
    assert_eq!(variable.value, Value::String("variable".into()));
}

#[test]
fn typed_delete_removes_only_that_namespace() {
    let (_dir, path) = fixture("<?php\ndefine( 'SHARED', 'constant' );\n$SHARED = 'variable';\n");
    let mut store = ConfigStore::open(&path).expect("open");

    let kind = store.delete("SHARED", TypeFilter::Constant).expect("delete");
    assert_eq!(kind, EntryKind::Constant);
    assert_eq!(read(&path), "<?php\n$SHARED = 'variable';\n");
    assert!(store.has("SHARED", TypeFilter::All).expect("has"));
    assert!(!store.has("SHARED", TypeFilter::Constant).expect("has"));
}

#[test]
fn falsy_values_are_not_true() {
    let (_dir, path) = fixture(
        "<?php\ndefine( 'ZERO', '0' );\ndefine( 'EMPTY', '' );\ndefine( 'OFF', false );\ndefine( 'UNSET', null );\ndefine( 'ON', 'yes' );\n",
    );
    let store = ConfigStore::open(&path).expect("open");

    for name in ["ZERO", "EMPTY", "OFF", "UNSET"] {
        assert!(
            !store.is_true(name, TypeFilter::All).expect("is-true"),
            "{name} should be falsy"
        );
    }
    assert!(store.is_true("ON", TypeFilter::All).expect("is-true"));
    assert!(matches!(
        store.is_true("MISSING", TypeFilter::All),
        Err(Error::EntryNotFound { .. })
    ));
}

#[test]
fn heredoc_values_do_not_block_edits() {
    let (_dir, path) = fixture(
        "<?php\n$banner = <<<EOT\n    Site for $table_prefix\n    EOT;\ndefine( 'NOTE', <<<'RAW'\nliteral $x\nRAW );\ndefine( 'DB_NAME', 'wp' );\n",
    );
    let mut store = ConfigStore::open(&path).expect("open");

    assert_eq!(
        store.get("NOTE", TypeFilter::All).expect("nowdoc").value,
        Value::String("literal $x".into())
    );
    assert!(store.has("banner", TypeFilter::Variable).expect("has"));

    store
        .set("DB_NAME", "site", TypeFilter::All, &MutationOptions::default())
        .expect("set");
    assert!(read(&path).contains("define( 'DB_NAME', 'site' );"));
    assert!(read(&path).contains("$banner = <<<EOT\n    Site for $table_prefix\n    EOT;"));
}

#[test]
fn missing_names_come_with_a_suggestion() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path).expect("open");

    let err = store.get("DB_NAM", TypeFilter::All).expect_err("missing");
    assert_eq!(
        err.to_string(),
        "The constant or variable 'DB_NAM' is not defined in the 'wp-config.php' file.\nDid you mean 'DB_NAME'?"
    );

    let err = store.delete("DB_NAM", TypeFilter::Constant).expect_err("missing");
    assert!(matches!(
        err,
        Error::EntryNotFound { suggestion: Some(ref candidate), .. } if candidate == "DB_NAME"
    ));
}

#[test]
fn shuffle_skips_unknown_keys_without_force() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path).expect("open");

    let report = store
        .shuffle_salts(&["CUSTOM_KEY".to_owned()], false, false)
        .expect("shuffle");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.skipped_keys, vec!["CUSTOM_KEY".to_owned()]);
    assert_eq!(read(&path), SAMPLE);

    let forced = store
        .shuffle_salts(&["CUSTOM_KEY".to_owned()], true, false)
        .expect("shuffle");
    assert_eq!(forced.succeeded, 1);
    let value = store.get("CUSTOM_KEY", TypeFilter::Constant).expect("added");
    let Value::String(key) = value.value else {
        panic!("salt should be a string");
    };
    assert_eq!(key.len(), 64);
}

#[test]
fn shuffle_replaces_every_standard_salt() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path)
        .expect("open")
        .with_rng(StdRng::seed_from_u64(7));

    let report = store.shuffle_salts(&[], false, false).expect("shuffle");
    assert_eq!(report.succeeded, SALT_KEYS.len());
    assert!(!report.used_remote);

    let first = store.get("AUTH_KEY", TypeFilter::Constant).expect("salt").value;
    store.shuffle_salts(&[], false, false).expect("shuffle again");
    let second = store.get("AUTH_KEY", TypeFilter::Constant).expect("salt").value;
    assert_ne!(first, second);
    assert_eq!(read(&path).matches("'AUTH_KEY'").count(), 1);
}

#[test]
fn shuffle_falls_back_to_the_remote_service() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path)
        .expect("open")
        .with_rng(BrokenRng)
        .with_salt_source(FixedSalts(
            "define('AUTH_KEY',         'remote-auth');\ndefine('NONCE_SALT',       'remote-nonce');\n",
        ));

    let keys = vec![
        "AUTH_KEY".to_owned(),
        "NONCE_SALT".to_owned(),
        "LOGGED_IN_KEY".to_owned(),
    ];
    let report = store.shuffle_salts(&keys, false, false).expect("shuffle");
    assert!(report.used_remote);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.errored, 1);
    assert_eq!(report.failures[0].0, "LOGGED_IN_KEY");
    assert_eq!(
        store.get("NONCE_SALT", TypeFilter::All).expect("salt").value,
        Value::String("remote-nonce".into())
    );
}

#[test]
fn failing_remote_fallback_aborts_the_shuffle() {
    let (_dir, path) = fixture(SAMPLE);
    let mut store = ConfigStore::open(&path)
        .expect("open")
        .with_rng(BrokenRng)
        .with_salt_source(UnreachableSalts);

    let err = store.shuffle_salts(&[], false, false).expect_err("remote down");
    assert!(matches!(err, Error::RemoteService { .. }));
    assert_eq!(read(&path), SAMPLE);
}

#[test]
fn create_writes_settings_and_salts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wp-config.php");
    let options = CreateOptions {
        dbname: "site".into(),
        dbuser: "admin".into(),
        dbpass: "pa'ss".into(),
        dbprefix: "site_".into(),
        locale: "de_DE".into(),
        extra_php: Some("define( 'WP_DEBUG', true );\n".into()),
        ..CreateOptions::default()
    };

    let store = ConfigStore::create_with(&path, &options, StdRng::seed_from_u64(1), UnreachableSalts)
        .expect("create");
    let value = |name: &str| store.get(name, TypeFilter::All).expect(name).value;

    assert_eq!(value("DB_NAME"), Value::String("site".into()));
    assert_eq!(value("DB_USER"), Value::String("admin".into()));
    assert_eq!(value("DB_PASSWORD"), Value::String("pa'ss".into()));
    assert_eq!(value("DB_HOST"), Value::String("localhost".into()));
    assert_eq!(value("table_prefix"), Value::String("site_".into()));
    assert_eq!(value("WPLANG"), Value::String("de_DE".into()));
    assert_eq!(value("WP_DEBUG"), Value::Bool(true));
    for name in SALT_KEYS.iter().copied().chain([CACHE_KEY_SALT]) {
        let Value::String(salt) = value(name) else {
            panic!("{name} should be a string");
        };
        assert_eq!(salt.len(), 64);
        assert!(salt.bytes().all(|byte| KEY_ALPHABET.contains(&byte)));
    }
}

#[test]
fn create_uses_remote_salts_when_randomness_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wp-config.php");
    let options = CreateOptions {
        dbname: "site".into(),
        dbuser: "admin".into(),
        ..CreateOptions::default()
    };

    let store = ConfigStore::create_with(
        &path,
        &options,
        BrokenRng,
        FixedSalts("define('AUTH_KEY', 'from-remote');"),
    )
    .expect("create");
    assert_eq!(
        store.get("AUTH_KEY", TypeFilter::Constant).expect("salt").value,
        Value::String("from-remote".into())
    );
}

#[test]
fn create_refuses_to_overwrite_without_force() {
    let (_dir, path) = fixture(SAMPLE);
    let options = CreateOptions {
        skip_salts: true,
        ..CreateOptions::default()
    };

    let err = ConfigStore::create(&path, &options).expect_err("exists");
    assert!(matches!(err, Error::FileExists { .. }));
    assert_eq!(read(&path), SAMPLE);

    let forced = CreateOptions {
        force: true,
        dbname: "fresh".into(),
        ..options
    };
    let store = ConfigStore::create(&path, &forced).expect("forced create");
    assert_eq!(
        store.get("DB_NAME", TypeFilter::All).expect("name").value,
        Value::String("fresh".into())
    );
    assert!(!store.has("AUTH_KEY", TypeFilter::All).expect("has"));
}

#[test]
fn create_validates_the_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wp-config.php");
    let options = CreateOptions {
        dbprefix: "wp-".into(),
        skip_salts: true,
        ..CreateOptions::default()
    };

    let err = ConfigStore::create(&path, &options).expect_err("bad prefix");
    assert!(matches!(err, Error::Validation { .. }));
    assert!(!path.exists());
}

#[test]
fn failed_creation_removes_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wp-config.php");
    let options = CreateOptions {
        dbname: "site".into(),
        extra_php: Some("if ( true ) {".into()),
        skip_salts: true,
        ..CreateOptions::default()
    };

    let err = ConfigStore::create(&path, &options).expect_err("transformer should fail");
    assert!(matches!(err, Error::Creation { .. }));
    assert!(!path.exists());
}

#[test]
fn includes_cannot_be_edited() {
    let (_dir, path) = fixture(SAMPLE);
    let mut transformer = FileTransformer::new(&path);
    let err = transformer
        .update(EntryKind::Include, "x", "y", &MutationOptions::default())
        .expect_err("includes are read-only");
    assert!(matches!(err, Error::Transformation { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn quoted_values_read_back_exactly(value in "[ -~\u{e9}\u{4e2d}\t\n]{0,32}") {
        let (_dir, path) = fixture(SAMPLE);
        let mut store = ConfigStore::open(&path).expect("open");

        store
            .set("WP_VALUE", &value, TypeFilter::Constant, &MutationOptions::default())
            .expect("set");
        let read_back = store.get("WP_VALUE", TypeFilter::Constant).expect("get").value;
        prop_assert_eq!(read_back, Value::String(value));
    }
}
