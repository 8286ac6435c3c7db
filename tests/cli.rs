use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const SAMPLE: &str = "<?php\n\
$table_prefix = 'wp_';\n\
define( 'DB_NAME', 'wordpress' );\n\
\n\
/* That's all, stop editing! Happy publishing. */\n";

#[test]
fn has_reports_through_the_exit_code() {
    let dir = site_with(SAMPLE);

    let found = run_wpconfig(dir.path(), &["has", "DB_NAME"]);
    assert_success(&found);
    assert!(found.stdout.is_empty(), "has should print nothing");

    let missing = run_wpconfig(dir.path(), &["has", "WP_DEBUG"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(missing.stdout.is_empty(), "has should print nothing");

    let wrong_kind = run_wpconfig(dir.path(), &["has", "DB_NAME", "--type=variable"]);
    assert_eq!(wrong_kind.status.code(), Some(1));
}

#[test]
fn list_prints_variables_then_constants() {
    let dir = site_with(SAMPLE);

    let output = run_wpconfig(dir.path(), &["list", "--format=json"]);
    assert_success(&output);
    let listed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("list output should be JSON");
    assert_eq!(
        listed,
        serde_json::json!([
            {"name": "table_prefix", "value": "wp_", "type": "variable"},
            {"name": "DB_NAME", "value": "wordpress", "type": "constant"},
        ])
    );

    let csv = run_wpconfig(dir.path(), &["list", "DB", "--fields=name,type", "--format=csv"]);
    assert_success(&csv);
    assert_eq!(stdout_trimmed(&csv), "name,type\nDB_NAME,constant");
}

#[test]
fn set_raw_adds_a_constant() {
    let dir = site_with(SAMPLE);

    let output = run_wpconfig(dir.path(), &["set", "WP_DEBUG", "true", "--raw"]);
    assert_success(&output);
    assert!(
        stdout_trimmed(&output).ends_with(
            "Added the constant 'WP_DEBUG' to the 'wp-config.php' file with the raw value 'true'."
        ),
        "unexpected stdout: {:?}",
        stdout_trimmed(&output)
    );
    let content = std::fs::read_to_string(dir.path().join("wp-config.php")).expect("read");
    assert!(content.contains("define( 'WP_DEBUG', true );"));

    let is_true = run_wpconfig(dir.path(), &["is-true", "WP_DEBUG"]);
    assert_success(&is_true);
}

#[test]
fn is_true_fails_for_falsy_and_missing_entries() {
    let dir = site_with("<?php\ndefine( 'F', '0' );\ndefine( 'T', 'on' );\n");

    let truthy = run_wpconfig(dir.path(), &["is-true", "T"]);
    assert_success(&truthy);
    assert!(truthy.stdout.is_empty(), "is-true should print nothing");

    let falsy = run_wpconfig(dir.path(), &["is-true", "F"]);
    assert_eq!(falsy.status.code(), Some(1));
    assert!(falsy.stdout.is_empty(), "is-true should print nothing");

    let missing = run_wpconfig(dir.path(), &["is-true", "NOPE"]);
    assert_eq!(missing.status.code(), Some(1));
}

#[test]
fn get_finds_the_config_in_a_parent_directory() {
    let dir = site_with(SAMPLE);
    let nested = dir.path().join("wp-content").join("themes");
    std::fs::create_dir_all(&nested).expect("failed to create nested directories");

    let output = run_wpconfig(&nested, &["get", "table_prefix"]);
    assert_success(&output);
    assert_eq!(stdout_trimmed(&output), "wp_");

    let path = run_wpconfig(&nested, &["path"]);
    assert_success(&path);
    assert!(stdout_trimmed(&path).ends_with("wp-config.php"));
}

#[test]
fn ambiguous_get_fails_until_a_type_is_given() {
    let dir = site_with("<?php\ndefine( 'X', 'constant' );\n$X = 'variable';\n");

    let ambiguous = run_wpconfig(dir.path(), &["get", "X"]);
    assert_eq!(ambiguous.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&ambiguous.stderr).contains("Error:"));

    let constant = run_wpconfig(dir.path(), &["get", "X", "--type=constant"]);
    assert_success(&constant);
    assert_eq!(stdout_trimmed(&constant), "constant");
}

#[test]
fn deleted_entries_are_no_longer_found() {
    let dir = site_with(SAMPLE);

    let deleted = run_wpconfig(dir.path(), &["delete", "DB_NAME"]);
    assert_success(&deleted);

    let missing = run_wpconfig(dir.path(), &["get", "DB_NAME"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&missing.stderr).contains("is not defined in the 'wp-config.php' file"),
        "unexpected stderr: {:?}",
        String::from_utf8_lossy(&missing.stderr)
    );
}

#[test]
fn shuffle_skips_custom_keys_without_force() {
    let dir = site_with(SAMPLE);

    let output = run_wpconfig(dir.path(), &["shuffle-salts", "CUSTOM_KEY"]);
    assert_success(&output);
    assert!(stdout_trimmed(&output).contains("Shuffled 0 of 1 salt keys (1 skipped)."));
    assert!(String::from_utf8_lossy(&output.stderr).contains("CUSTOM_KEY"));
}

#[test]
fn create_reads_extra_php_from_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut child = Command::new(wpconfig_bin())
        .current_dir(dir.path())
        .args([
            "create",
            "--dbname=site",
            "--dbuser=admin",
            "--skip-salts",
            "--extra-php",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run wpconfig binary");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(b"define( 'WP_DEBUG', true );\n")
        .expect("failed to write stdin");
    let output = child.wait_with_output().expect("wpconfig should finish");
    assert_success(&output);

    let debug = run_wpconfig(dir.path(), &["get", "WP_DEBUG", "--format=json"]);
    assert_success(&debug);
    assert_eq!(stdout_trimmed(&debug), "true");

    let again = run_wpconfig(dir.path(), &["create", "--dbname=x", "--dbuser=y", "--skip-salts"]);
    assert_eq!(again.status.code(), Some(1));
}

#[test]
fn explicit_config_file_must_exist() {
    let dir = tempfile::tempdir().expect("tempdir");

    let output = run_wpconfig(
        dir.path(),
        &["--config-file", "missing.php", "list"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

fn site_with(content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(&dir.path().join("wp-config.php"), content);
    dir
}

fn run_wpconfig(dir: &Path, args: &[&str]) -> Output {
    Command::new(wpconfig_bin())
        .current_dir(dir)
        .args(args)
        .env_remove("WPCONFIG_FILE")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run wpconfig binary")
}

fn stdout_trimmed(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout)
        .trim_end()
        .to_string()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success: stdout={:?}, stderr={:?}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn wpconfig_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_wpconfig"))
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write fixture file");
}
