use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::lexer::Span;
use crate::model::{Anchor, DEFAULT_ANCHOR, EntryKind, MutationOptions, Placement};
use crate::syntax::{AssignOp, Expr, ExprKind, Program, Stmt, StmtKind, parse_program};

/// Lexical editing of constants and variables.
pub trait Transformer {
    fn exists(&self, kind: EntryKind, name: &str) -> Result<bool, Error>;

    /// Set `name` to `value`, adding it when missing and `options.add` allows
    /// it. Returns whether the file changed.
    fn update(
        &mut self,
        kind: EntryKind,
        name: &str,
        value: &str,
        options: &MutationOptions,
    ) -> Result<bool, Error>;

    /// Delete every statement defining `name`. Returns whether any was found.
    fn remove(&mut self, kind: EntryKind, name: &str) -> Result<bool, Error>;
}

/// [`Transformer`] over a file on disk.
#[derive(Debug, Clone)]
pub struct FileTransformer {
    path: PathBuf,
}

impl FileTransformer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn load(&self) -> Result<(String, Program), Error> {
        let source = fs::read_to_string(&self.path)?;
        let program = parse_program(&source).map_err(|err| err.in_file(&self.path))?;
        Ok((source, program))
    }
}

impl Transformer for FileTransformer {
    fn exists(&self, kind: EntryKind, name: &str) -> Result<bool, Error> {
        editable(kind)?;
        let (_, program) = self.load()?;
        Ok(!occurrences(&program, kind, name).is_empty())
    }

    fn update(
        &mut self,
        kind: EntryKind,
        name: &str,
        value: &str,
        options: &MutationOptions,
    ) -> Result<bool, Error> {
        editable(kind)?;
        if kind == EntryKind::Variable && !is_variable_name(name) {
            return Err(Error::validation(format!(
                "'{name}' is not a valid variable name."
            )));
        }
        let (source, program) = self.load()?;
        let literal = if options.raw {
            value.to_owned()
        } else {
            quote_literal(value)
        };

        let updated = match occurrences(&program, kind, name).first() {
            Some(found) => {
                let (range, replacement) = match (options.normalize, found.statement) {
                    (true, Some(statement)) => {
                        (range(statement), canonical_statement(kind, name, &literal))
                    }
                    _ => (range(found.value), literal),
                };
                if source[range.clone()] == replacement {
                    debug!(kind = %kind, name, "value unchanged");
                    return Ok(false);
                }
                splice(&source, range, &replacement)
            }
            None if options.add => {
                let statement = canonical_statement(kind, name, &literal);
                insert_statement(&source, &statement, options, &self.file_name())?
            }
            None => {
                return Err(Error::transformation(format!(
                    "The {kind} '{name}' is not defined in the '{}' file.",
                    self.file_name()
                )));
            }
        };

        if updated == source {
            return Ok(false);
        }
        write_atomic(&self.path, &updated)?;
        Ok(true)
    }

    fn remove(&mut self, kind: EntryKind, name: &str) -> Result<bool, Error> {
        editable(kind)?;
        let (source, program) = self.load()?;
        let found = occurrences(&program, kind, name);
        if found.is_empty() {
            return Ok(false);
        }

        let mut updated = source.clone();
        for occurrence in found.iter().rev() {
            let Some(statement) = occurrence.statement else {
                return Err(Error::transformation(format!(
                    "The {kind} '{name}' is declared together with other constants and cannot be removed on its own."
                )));
            };
            let removal = whole_lines(&updated, range(statement));
            updated.replace_range(removal, "");
        }
        write_atomic(&self.path, &updated)?;
        debug!(kind = %kind, name, removed = found.len(), "removed statements");
        Ok(true)
    }
}

fn editable(kind: EntryKind) -> Result<(), Error> {
    match kind {
        EntryKind::Constant | EntryKind::Variable => Ok(()),
        EntryKind::Include => Err(Error::transformation("Included files cannot be edited.")),
    }
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_ascii_alphabetic())
        && chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

/// Single-quoted literal that reads back as exactly `value`.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

fn canonical_statement(kind: EntryKind, name: &str, literal: &str) -> String {
    match kind {
        EntryKind::Variable => format!("${name} = {literal};"),
        _ => format!("define( {}, {literal} );", quote_literal(name)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Occurrence {
    /// Statement to drop on removal; `None` when others share it.
    statement: Option<Span>,
    value: Span,
}

/// Definitions of `name` in source order.
fn occurrences(program: &Program, kind: EntryKind, name: &str) -> Vec<Occurrence> {
    let mut found = Vec::new();
    collect(&program.statements, kind, name, &mut found);
    found.dedup_by(|later, earlier| later.statement.is_some() && later.statement == earlier.statement);
    found
}

fn collect(statements: &[Stmt], kind: EntryKind, name: &str, found: &mut Vec<Occurrence>) {
    for stmt in statements {
        match (&stmt.kind, kind) {
            (StmtKind::If { branches, otherwise }, _) => {
                for (condition, body) in branches {
                    if kind == EntryKind::Constant {
                        define_calls(condition, name, None, found);
                    }
                    collect(body, kind, name, found);
                }
                if let Some(body) = otherwise {
                    collect(body, kind, name, found);
                }
            }
            (StmtKind::Block(body), _) => collect(body, kind, name, found),
            (StmtKind::Expr(expr), EntryKind::Constant) => {
                define_calls(expr, name, Some(stmt.span), found);
            }
            (StmtKind::Const(items), EntryKind::Constant) => {
                let shared = items.len() > 1;
                for item in items.iter().filter(|item| item.name == name) {
                    found.push(Occurrence {
                        statement: (!shared).then_some(stmt.span),
                        value: item.value.span,
                    });
                }
            }
            (StmtKind::Assign { value, .. }, EntryKind::Constant) => {
                define_calls(value, name, None, found);
            }
            (StmtKind::Assign { target, op, value }, EntryKind::Variable) => {
                if target.name == name && target.indices.is_empty() && *op == AssignOp::Assign {
                    found.push(Occurrence {
                        statement: Some(stmt.span),
                        value: value.span,
                    });
                }
            }
            _ => {}
        }
    }
}

fn define_calls(expr: &Expr, name: &str, statement: Option<Span>, found: &mut Vec<Occurrence>) {
    expr.walk(&mut |node| {
        if let ExprKind::Call { name: function, args } = &node.kind
            && function.eq_ignore_ascii_case("define")
            && let [constant, value, ..] = args.as_slice()
            && constant.literal_text() == Some(name)
        {
            found.push(Occurrence {
                statement,
                value: value.span,
            });
        }
    });
}

fn range(span: Span) -> Range<usize> {
    span.start..span.end
}

fn splice(source: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(source.len() + replacement.len());
    out.push_str(&source[..range.start]);
    out.push_str(replacement);
    out.push_str(&source[range.end..]);
    out
}

/// Widen `range` to its full lines when nothing else shares them.
fn whole_lines(source: &str, range: Range<usize>) -> Range<usize> {
    let line_start = source[..range.start].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[range.end..]
        .find('\n')
        .map_or(source.len(), |idx| range.end + idx + 1);
    let alone = source[line_start..range.start].trim().is_empty()
        && source[range.end..line_end].trim().is_empty();
    if alone { line_start..line_end } else { range }
}

fn insert_statement(
    source: &str,
    statement: &str,
    options: &MutationOptions,
    file_name: &str,
) -> Result<String, Error> {
    let separator = options.separator.as_deref().unwrap_or("\n");
    let position = match &options.anchor {
        Anchor::Marker(marker) if marker.is_empty() => {
            return Err(Error::validation("The anchor cannot be empty."));
        }
        Anchor::Marker(marker) => match source.find(marker.as_str()) {
            Some(start) => Some(start..start + marker.len()),
            None => {
                return Err(Error::transformation(format!(
                    "Could not locate the anchor '{marker}' in the '{file_name}' file."
                )));
            }
        },
        Anchor::Default => source
            .find(DEFAULT_ANCHOR)
            .map(|start| start..start + DEFAULT_ANCHOR.len()),
        Anchor::Eof => None,
    };

    let Some(anchor) = position else {
        return Ok(append_at_end(source, statement, separator));
    };
    Ok(match options.placement {
        Placement::Before => splice(
            source,
            anchor.start..anchor.start,
            &format!("{statement}{separator}"),
        ),
        Placement::After => splice(
            source,
            anchor.end..anchor.end,
            &format!("{separator}{statement}"),
        ),
    })
}

fn append_at_end(source: &str, statement: &str, separator: &str) -> String {
    let trimmed = source.trim_end();
    match trimmed.strip_suffix("?>") {
        Some(body) => {
            let end = body.trim_end().len();
            splice(source, end..end, &format!("{separator}{statement}"))
        }
        None => format!("{trimmed}{separator}{statement}\n"),
    }
}

/// Replace `path` with `contents` through a sibling temporary file, keeping
/// the original permissions.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
