use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use anyhow::{Result, anyhow, bail};
use tracing::debug;
use wpconfig::{
    ConfigStore, CreateOptions, SetOutcome, ShuffleReport, TypeFilter, creation_target,
    resolve_existing,
};

use crate::cli::{
    Cli, Command, CreateArgs, GetArgs, ListArgs, NameArgs, SetArgs, ShuffleArgs,
};
use crate::output::{Reporter, parse_fields, render_entries, render_value};

const DEFAULT_EDITOR: &str = "vi";

/// Run one command and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    let reporter = Reporter::new(cli.quiet);
    match dispatch(cli.command, cli.config_file, reporter) {
        Ok(code) => code,
        Err(err) => {
            reporter.error(&err.to_string());
            1
        }
    }
}

fn dispatch(command: Command, config_file: Option<PathBuf>, reporter: Reporter) -> Result<i32> {
    match command {
        Command::Create(args) => cmd_create(args, config_file, reporter),
        Command::Get(args) => cmd_get(args, open(config_file)?),
        Command::Set(args) => cmd_set(args, open(config_file)?, reporter),
        Command::Delete(args) => cmd_delete(args, open(config_file)?, reporter),
        Command::Has(args) => {
            let found = open(config_file)?.has(&args.name, args.kind.into())?;
            Ok(exit_code(found))
        }
        Command::IsTrue(args) => cmd_is_true(args, open(config_file)?),
        Command::List(args) => cmd_list(args, open(config_file)?),
        Command::ShuffleSalts(args) => cmd_shuffle(args, open(config_file)?, reporter),
        Command::Path => {
            println!("{}", open(config_file)?.path().display());
            Ok(0)
        }
        Command::Edit => cmd_edit(open(config_file)?),
    }
}

fn open(config_file: Option<PathBuf>) -> Result<ConfigStore> {
    let cwd = working_dir()?;
    let path = resolve_existing(config_file.as_deref(), &cwd)?;
    debug!(path = %path.display(), "using config file");
    Ok(ConfigStore::open(path)?)
}

fn working_dir() -> Result<PathBuf> {
    env::current_dir().map_err(|err| anyhow!("could not read the working directory: {err}"))
}

fn exit_code(ok: bool) -> i32 {
    if ok { 0 } else { 1 }
}

fn cmd_create(args: CreateArgs, config_file: Option<PathBuf>, reporter: Reporter) -> Result<i32> {
    let cwd = working_dir()?;
    let target = creation_target(config_file.as_deref(), &cwd);
    if args.skip_check {
        debug!("--skip-check given; no database check is performed");
    }

    let extra_php = if args.extra_php {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| anyhow!("could not read extra PHP from stdin: {err}"))?;
        Some(buffer)
    } else {
        None
    };

    let options = CreateOptions {
        dbname: args.dbname,
        dbuser: args.dbuser,
        dbpass: args.dbpass,
        dbhost: args.dbhost,
        dbprefix: args.dbprefix,
        dbcharset: args.dbcharset,
        dbcollate: args.dbcollate,
        locale: args.locale,
        extra_php,
        skip_salts: args.skip_salts,
        force: args.force,
        insecure: args.insecure,
    };
    let store = ConfigStore::create(&target, &options)?;
    reporter.success(&format!("Generated '{}' file.", store.file_name()));
    Ok(0)
}

fn cmd_get(args: GetArgs, store: ConfigStore) -> Result<i32> {
    let entry = store.get(&args.name, args.kind.into())?;
    println!("{}", render_value(&entry.value, args.format)?);
    Ok(0)
}

fn cmd_set(args: SetArgs, mut store: ConfigStore, reporter: Reporter) -> Result<i32> {
    let options = args.mutation_options();
    let outcome = store.set(&args.name, &args.value, args.kind.into(), &options)?;
    reporter.success(&set_message(
        &outcome,
        &args.name,
        &args.value,
        &store.file_name(),
    ));
    Ok(0)
}

fn set_message(outcome: &SetOutcome, name: &str, value: &str, file: &str) -> String {
    let value_label = if outcome.raw { "raw value" } else { "value" };
    let kind = outcome.kind;
    if outcome.added {
        format!("Added the {kind} '{name}' to the '{file}' file with the {value_label} '{value}'.")
    } else if outcome.changed {
        format!("Updated the {kind} '{name}' in the '{file}' file with the {value_label} '{value}'.")
    } else {
        format!("The {kind} '{name}' in the '{file}' file already has the {value_label} '{value}'.")
    }
}

fn cmd_delete(args: NameArgs, mut store: ConfigStore, reporter: Reporter) -> Result<i32> {
    let kind = store.delete(&args.name, args.kind.into())?;
    reporter.success(&format!(
        "Deleted the {kind} '{}' from the '{}' file.",
        args.name,
        store.file_name()
    ));
    Ok(0)
}

fn cmd_is_true(args: NameArgs, store: ConfigStore) -> Result<i32> {
    let filter: TypeFilter = args.kind.into();
    Ok(exit_code(store.is_true(&args.name, filter)?))
}

fn cmd_list(args: ListArgs, store: ConfigStore) -> Result<i32> {
    let fields = parse_fields(&args.fields)?;
    let entries = store.list(&args.filters, args.strict)?;
    let rendered = render_entries(&entries, &fields, args.format)?;
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(0)
}

fn cmd_shuffle(args: ShuffleArgs, mut store: ConfigStore, reporter: Reporter) -> Result<i32> {
    let report = store.shuffle_salts(&args.keys, args.force, args.insecure)?;
    for key in &report.skipped_keys {
        reporter.warning(&format!(
            "Could not shuffle the unknown key '{key}'. Use --force to shuffle it anyway."
        ));
    }
    for (key, reason) in &report.failures {
        reporter.warning(&format!("Could not shuffle the key '{key}': {reason}"));
    }
    if report.used_remote {
        reporter.warning("Salts were fetched from the remote service.");
    }

    let summary = shuffle_summary(&report);
    if report.errored > 0 {
        reporter.error(&summary);
        return Ok(1);
    }
    reporter.success(&summary);
    Ok(0)
}

fn shuffle_summary(report: &ShuffleReport) -> String {
    let mut summary = format!(
        "Shuffled {} of {} salt keys",
        report.succeeded,
        report.requested()
    );
    let mut notes = Vec::new();
    if report.skipped > 0 {
        notes.push(format!("{} skipped", report.skipped));
    }
    if report.errored > 0 {
        notes.push(format!("{} failed", report.errored));
    }
    if !notes.is_empty() {
        summary.push_str(&format!(" ({})", notes.join(", ")));
    }
    summary.push('.');
    summary
}

fn cmd_edit(store: ConfigStore) -> Result<i32> {
    let editor = env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .ok()
        .filter(|editor| !editor.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_owned());
    let mut words = editor.split_whitespace();
    let Some(program) = words.next() else {
        bail!("no editor configured");
    };

    debug!(editor = %editor, "launching editor");
    let status = process::Command::new(program)
        .args(words)
        .arg(store.path())
        .status()
        .map_err(|err| anyhow!("failed to launch `{editor}`: {err}"))?;
    if !status.success() {
        bail!("`{editor}` exited with {status}");
    }
    Ok(0)
}
