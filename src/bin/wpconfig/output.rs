use anyhow::{Result, bail};
use colored::Colorize;
use comfy_table::{Table, presets::ASCII_FULL_CONDENSED};
use serde_json::{Map, Value as Json};
use wpconfig::{Entry, EntryKind, Value};

use crate::cli::{GetFormat, ListFormat};

/// `Success:` and `Warning:` lines, silenced by `--quiet`.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    quiet: bool,
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {message}", "Success:".green().bold());
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {message}", "Warning:".yellow().bold());
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {message}", "Error:".red().bold());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Value,
    Type,
}

impl Field {
    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Value => "value",
            Self::Type => "type",
        }
    }

    fn text(self, entry: &Entry) -> String {
        match self {
            Self::Name => entry.name.clone(),
            Self::Value => value_text(&entry.value),
            Self::Type => entry.kind.as_str().to_owned(),
        }
    }

    fn json(self, entry: &Entry) -> Result<Json> {
        Ok(match self {
            Self::Name => Json::String(entry.name.clone()),
            Self::Value => serde_json::to_value(&entry.value)?,
            Self::Type => Json::String(entry.kind.as_str().to_owned()),
        })
    }
}

pub fn parse_fields(raw: &[String]) -> Result<Vec<Field>> {
    let mut fields = Vec::with_capacity(raw.len());
    for name in raw {
        let field = match name.trim() {
            "name" => Field::Name,
            "value" => Field::Value,
            "type" => Field::Type,
            other => bail!("Invalid field: {other}."),
        };
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    if fields.is_empty() {
        bail!("At least one field is required.");
    }
    Ok(fields)
}

/// Plain-text form of a value; arrays are shown as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Array(_) => serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
        other => other.to_string(),
    }
}

pub fn render_value(value: &Value, format: GetFormat) -> Result<String> {
    Ok(match format {
        GetFormat::Text => value_text(value),
        GetFormat::Json => serde_json::to_string(value)?,
        GetFormat::Yaml => serde_yaml::to_string(value)?.trim_end().to_owned(),
    })
}

pub fn render_entries(entries: &[Entry], fields: &[Field], format: ListFormat) -> Result<String> {
    match format {
        ListFormat::Table => Ok(render_table(entries, fields)),
        ListFormat::Csv => Ok(render_csv(entries, fields)),
        ListFormat::Json => Ok(serde_json::to_string(&objects(entries, fields)?)?),
        ListFormat::Yaml => Ok(serde_yaml::to_string(&objects(entries, fields)?)?
            .trim_end()
            .to_owned()),
        ListFormat::Dotenv => Ok(render_dotenv(entries)),
    }
}

fn objects(entries: &[Entry], fields: &[Field]) -> Result<Vec<Map<String, Json>>> {
    entries
        .iter()
        .map(|entry| -> Result<Map<String, Json>> {
            fields
                .iter()
                .map(|field| Ok((field.as_str().to_owned(), field.json(entry)?)))
                .collect()
        })
        .collect()
}

fn render_table(entries: &[Entry], fields: &[Field]) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL_CONDENSED);
    table.set_header(fields.iter().map(|field| field.as_str()));
    for entry in entries {
        table.add_row(fields.iter().map(|field| field.text(entry)));
    }
    table.to_string()
}

fn render_csv(entries: &[Entry], fields: &[Field]) -> String {
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(
        fields
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    for entry in entries {
        let row = fields
            .iter()
            .map(|field| csv_cell(&field.text(entry)))
            .collect::<Vec<_>>();
        lines.push(row.join(","));
    }
    lines.join("\n")
}

fn csv_cell(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_owned()
    }
}

/// `NAME='value'` lines. Includes have no meaningful name and are left out.
fn render_dotenv(entries: &[Entry]) -> String {
    entries
        .iter()
        .filter(|entry| entry.kind != EntryKind::Include)
        .map(|entry| {
            let value = value_text(&entry.value)
                .replace('\\', "\\\\")
                .replace('\'', "\\'");
            format!("{}='{value}'", entry.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
