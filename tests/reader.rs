use std::fs;
use std::path::Path;

use wpconfig::{Entry, EntryKind, Error, Reader, ScriptErrorKind, Value, read_entries};

#[test]
fn required_files_contribute_entries_and_an_include() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        &dir.path().join("wp-config.php"),
        "<?php\n$table_prefix = 'wp_';\nrequire __DIR__ . '/local-config.php';\ndefine( 'DB_NAME', 'site' );\n",
    );
    write_file(
        &dir.path().join("local-config.php"),
        "<?php\ndefine( 'WP_DEBUG', true );\n$cache = array( 'ttl' => 60 );\n",
    );

    let entries = read_entries(dir.path().join("wp-config.php")).expect("read");
    let include = fs::canonicalize(dir.path().join("local-config.php")).expect("canonical");

    assert_eq!(
        summary(&entries),
        vec![
            (EntryKind::Variable, "table_prefix".to_owned()),
            (EntryKind::Variable, "cache".to_owned()),
            (EntryKind::Constant, "WP_DEBUG".to_owned()),
            (EntryKind::Constant, "DB_NAME".to_owned()),
            (EntryKind::Include, "local-config.php".to_owned()),
        ]
    );
    assert_eq!(
        entries[4].value,
        Value::String(include.to_string_lossy().into_owned())
    );
    assert_eq!(
        entries[1].value,
        Value::Array(vec![(Value::String("ttl".into()), Value::Int(60))])
    );
}

#[test]
fn missing_require_is_a_script_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(&config, "<?php\n\nrequire_once 'secrets.php';\n");

    let err = read_entries(&config).expect_err("require should fail");
    let Error::Script(script) = err else {
        panic!("expected a script error, got {err:?}");
    };
    assert_eq!(script.line, 3);
    assert!(matches!(script.kind, ScriptErrorKind::MissingRequire(path) if path.ends_with("secrets.php")));
}

#[test]
fn missing_include_is_tolerated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(&config, "<?php\ninclude 'optional.php';\n$a = 1;\n");

    let entries = read_entries(&config).expect("include misses are warnings");
    assert_eq!(summary(&entries), vec![(EntryKind::Variable, "a".to_owned())]);
}

#[test]
fn bootstrap_is_never_loaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(
        &config,
        "<?php\ndefine( 'DB_NAME', 'wp' );\nif ( ! defined( 'ABSPATH' ) ) {\n\tdefine( 'ABSPATH', __DIR__ . '/' );\n}\nrequire_once ABSPATH . 'wp-settings.php';\n",
    );
    write_file(
        &dir.path().join("wp-settings.php"),
        "<?php\ndefine( 'FROM_BOOTSTRAP', true );\n",
    );

    let entries = read_entries(&config).expect("read");
    let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, ["DB_NAME", "ABSPATH"]);
}

#[test]
fn include_once_loads_a_file_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(
        &config,
        "<?php\n$count = 0;\ninclude_once 'bump.php';\ninclude_once __DIR__ . '/bump.php';\n",
    );
    write_file(&dir.path().join("bump.php"), "<?php\n$count += 1;\n");

    let entries = read_entries(&config).expect("read");
    let count = entries
        .iter()
        .find(|entry| entry.name == "count")
        .map(|entry| entry.value.clone());
    assert_eq!(count, Some(Value::Int(1)));
    assert_eq!(
        entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Include)
            .count(),
        1
    );
}

#[test]
fn runtime_values_are_kept_as_expressions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(
        &config,
        "<?php\ndefine( 'DB_PASSWORD', file_get_contents( '/run/secrets/db' ) );\ndefine( 'DB_HOST', 'localhost' );\n",
    );

    let entries = read_entries(&config).expect("read");
    assert_eq!(
        entries[0].value,
        Value::Expression("file_get_contents( '/run/secrets/db' )".into())
    );
    assert_eq!(entries[1].value, Value::String("localhost".into()));
}

#[test]
fn parse_errors_report_their_position() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(&config, "<?php\n$a = 'unterminated;\n");

    let err = read_entries(&config).expect_err("lexer should fail");
    let Error::Script(script) = err else {
        panic!("expected a script error, got {err:?}");
    };
    assert_eq!(script.kind, ScriptErrorKind::UnterminatedString);
    assert_eq!(script.line, 2);
    assert!(script.path.is_some());
}

#[test]
fn readers_do_not_share_state_between_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("wp-config.php");
    write_file(&config, "<?php\ndefine( 'ONCE', 1 );\n");

    let reader = Reader::new();
    let first = reader.read(&config).expect("first read");
    let second = reader.read(&config).expect("second read");
    assert_eq!(first, second);
    assert!(reader.host().constant("ONCE").is_none());
}

fn summary(entries: &[Entry]) -> Vec<(EntryKind, String)> {
    entries
        .iter()
        .map(|entry| (entry.kind, entry.name.clone()))
        .collect()
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("failed to write fixture file");
}
