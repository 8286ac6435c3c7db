use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use crate::model::EntryKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("'{}' does not exist.", .path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("{}", not_found_message(.kind, .name, .file, .suggestion.as_deref()))]
    EntryNotFound {
        kind: Option<EntryKind>,
        name: String,
        file: String,
        suggestion: Option<String>,
    },

    #[error("{}", not_found_message(.kind, .name, .file, None))]
    NotFoundWithoutAdd {
        kind: Option<EntryKind>,
        name: String,
        file: String,
    },

    #[error(
        "Found both a constant and a variable '{name}' in the '{file}' file. Use --type=<type> to disambiguate."
    )]
    Ambiguous { name: String, file: String },

    #[error("The '{}' file already exists.", .path.display())]
    FileExists { path: PathBuf },

    #[error("no secure source of randomness is available: {0}")]
    InsecureRandomnessUnavailable(#[source] rand::Error),

    #[error("could not fetch salts from the remote service: {message}")]
    RemoteService { message: String },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("{message}")]
    Transformation { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("The --strict option can only be used in combination with a filter.")]
    MissingFilter,

    #[error("Could not create new '{}' file.\nReason: {source}", .path.display())]
    Creation {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn transformation(message: impl Into<String>) -> Self {
        Self::Transformation {
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn remote(message: impl Display) -> Self {
        Self::RemoteService {
            message: message.to_string(),
        }
    }
}

fn not_found_message(
    kind: &Option<EntryKind>,
    name: &str,
    file: &str,
    suggestion: Option<&str>,
) -> String {
    let subject = match kind {
        Some(kind) => format!("The {kind} '{name}'"),
        None => format!("The constant or variable '{name}'"),
    };
    let mut message = format!("{subject} is not defined in the '{file}' file.");
    if let Some(candidate) = suggestion {
        message.push_str(&format!("\nDid you mean '{candidate}'?"));
    }
    message
}

/// Failure to lex, parse or execute a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub path: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
    pub kind: ScriptErrorKind,
}

impl ScriptError {
    pub(crate) fn new(line: u32, column: u32, kind: ScriptErrorKind) -> Self {
        Self {
            path: None,
            line,
            column,
            kind,
        }
    }

    pub(crate) fn in_file(mut self, path: &Path) -> Self {
        if self.path.is_none() {
            self.path = Some(path.to_path_buf());
        }
        self
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "script error in {} at line {}, column {}: {}",
                path.display(),
                self.line,
                self.column,
                self.kind
            ),
            None => write!(
                f,
                "script error at line {}, column {}: {}",
                self.line, self.column, self.kind
            ),
        }
    }
}

impl std::error::Error for ScriptError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptErrorKind {
    UnexpectedCharacter(char),
    UnterminatedString,
    UnterminatedComment,
    UnsupportedSyntax(&'static str),
    UnexpectedToken(String),
    UnexpectedEnd,
    /// A `require` target does not exist.
    MissingRequire(PathBuf),
    IncludeDepthExceeded,
    InvalidUtf8,
}

impl Display for ScriptErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedCharacter(ch) => write!(f, "unexpected character {ch:?}"),
            Self::UnterminatedString => write!(f, "unterminated string"),
            Self::UnterminatedComment => write!(f, "unterminated comment"),
            Self::UnsupportedSyntax(what) => write!(f, "unsupported syntax: {what}"),
            Self::UnexpectedToken(token) => write!(f, "unexpected '{token}'"),
            Self::UnexpectedEnd => write!(f, "unexpected end of file"),
            Self::MissingRequire(path) => {
                write!(f, "failed opening required '{}'", path.display())
            }
            Self::IncludeDepthExceeded => write!(f, "include depth exceeded"),
            Self::InvalidUtf8 => write!(f, "script is not valid UTF-8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_carries_suggestion() {
        let err = Error::EntryNotFound {
            kind: None,
            name: "DB_NAM".into(),
            file: "wp-config.php".into(),
            suggestion: Some("DB_NAME".into()),
        };
        assert_eq!(
            err.to_string(),
            "The constant or variable 'DB_NAM' is not defined in the 'wp-config.php' file.\nDid you mean 'DB_NAME'?"
        );
    }

    #[test]
    fn script_error_names_file_and_position() {
        let err = ScriptError::new(3, 7, ScriptErrorKind::UnterminatedString)
            .in_file(Path::new("/tmp/wp-config.php"));
        assert_eq!(
            err.to_string(),
            "script error in /tmp/wp-config.php at line 3, column 7: unterminated string"
        );
    }
}
