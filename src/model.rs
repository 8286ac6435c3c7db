use std::fmt::{Display, Formatter};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// The eight salt constants every config file carries.
pub const SALT_KEYS: [&str; 8] = [
    "AUTH_KEY",
    "SECURE_AUTH_KEY",
    "LOGGED_IN_KEY",
    "NONCE_KEY",
    "AUTH_SALT",
    "SECURE_AUTH_SALT",
    "LOGGED_IN_SALT",
    "NONCE_SALT",
];

/// Extra salt generated only when a config file is created.
pub const CACHE_KEY_SALT: &str = "WP_CACHE_KEY_SALT";

/// Marker that new entries are placed in front of unless told otherwise.
pub const DEFAULT_ANCHOR: &str = "/* That's all, stop editing!";

/// A binding recovered from a config script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub name: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Namespace an [`Entry`] lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Constant,
    Variable,
    Include,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Variable => "variable",
            Self::Include => "includes",
        }
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EntryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Which namespace a lookup by name should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    /// Constants and variables; a name present in both is ambiguous.
    #[default]
    All,
    Constant,
    Variable,
}

impl TypeFilter {
    pub fn matches(self, kind: EntryKind) -> bool {
        match self {
            Self::All => matches!(kind, EntryKind::Constant | EntryKind::Variable),
            Self::Constant => kind == EntryKind::Constant,
            Self::Variable => kind == EntryKind::Variable,
        }
    }

    pub fn kind(self) -> Option<EntryKind> {
        match self {
            Self::All => None,
            Self::Constant => Some(EntryKind::Constant),
            Self::Variable => Some(EntryKind::Variable),
        }
    }
}

/// A value as the evaluator sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Ordered key/value pairs.
    Array(Vec<(Value, Value)>),
    /// Source text of an expression the evaluator could not fold.
    Expression(String),
}

impl Value {
    /// Truthiness under the host language's rules. Opaque expressions are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) => !(value.is_empty() || value == "0"),
            Self::Array(items) => !items.is_empty(),
            Self::Expression(_) => false,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Expression(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Expression(_) => "expression",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null | Self::Bool(false) => Ok(()),
            Self::Bool(true) => f.write_str("1"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => f.write_str(&format_float(*value)),
            Self::String(value) => f.write_str(value),
            Self::Array(_) => f.write_str("Array"),
            Self::Expression(source) => f.write_str(source),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::String(value) | Self::Expression(value) => serializer.serialize_str(value),
            Self::Array(items) if is_list(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for (_, item) in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Array(items) => {
                let mut map = serializer.serialize_map(Some(items.len()))?;
                for (key, item) in items {
                    map.serialize_entry(&key.to_string(), item)?;
                }
                map.end()
            }
        }
    }
}

fn is_list(items: &[(Value, Value)]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(idx, (key, _))| *key == Value::Int(idx as i64))
}

/// Float formatting the way the host language echoes floats.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NAN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    format!("{value}")
}

/// Where an added statement goes relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Before,
    After,
}

/// Location new statements are inserted at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Anchor {
    /// [`DEFAULT_ANCHOR`], falling back to the end of file when absent.
    #[default]
    Default,
    /// End of file.
    Eof,
    /// A literal marker that must be present.
    Marker(String),
}

impl Anchor {
    pub fn parse(raw: &str) -> Self {
        if raw == "EOF" {
            Self::Eof
        } else {
            Self::Marker(raw.to_owned())
        }
    }
}

/// How a value is written by the transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOptions {
    /// Insert the value verbatim instead of as a quoted string literal.
    pub raw: bool,
    /// Allow creating an entry that does not exist yet.
    pub add: bool,
    pub anchor: Anchor,
    pub placement: Placement,
    /// Text between the new statement and the anchor; defaults to a newline.
    pub separator: Option<String>,
    /// Rewrite the whole statement in canonical form.
    pub normalize: bool,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            raw: false,
            add: true,
            anchor: Anchor::Default,
            placement: Placement::Before,
            separator: None,
            normalize: false,
        }
    }
}

impl MutationOptions {
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn add(mut self, add: bool) -> Self {
        self.add = add;
        self
    }

    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Result of a `set` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    pub kind: EntryKind,
    pub added: bool,
    pub changed: bool,
    pub raw: bool,
}

/// Per-key tally of a salt shuffle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShuffleReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub errored: usize,
    pub skipped_keys: Vec<String>,
    pub failures: Vec<(String, String)>,
    /// Salts came from the remote service instead of local randomness.
    pub used_remote: bool,
}

impl ShuffleReport {
    pub fn requested(&self) -> usize {
        self.succeeded + self.skipped + self.errored
    }
}
