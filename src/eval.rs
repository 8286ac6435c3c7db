use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, ScriptError, ScriptErrorKind};
use crate::lexer::{Span, StrPart};
use crate::model::Value;
use crate::syntax::{
    AssignOp, BinaryOp, CastKind, Expr, ExprKind, IncludeKind, MagicConst, Stmt, StmtKind,
    Target, UnaryOp, parse_program,
};

/// Nested includes deeper than this are treated as a cycle.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Base name of the application bootstrap, which is never executed.
pub const BOOTSTRAP_FILE: &str = "wp-settings.php";

/// Insertion-ordered name/value table.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
    by_name: HashMap<String, usize>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.by_name.get(name).map(|idx| &self.entries[*idx].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(idx) = self.by_name.get(&name).copied() {
            self.entries[idx].1 = value;
        } else {
            self.by_name.insert(name.clone(), self.entries.len());
            self.entries.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.by_name.remove(name)?;
        let (_, value) = self.entries.remove(idx);
        for position in self.by_name.values_mut() {
            if *position > idx {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Global state a script runs against.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    constants: Bindings,
    variables: Bindings,
    loaded: Vec<PathBuf>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope holding the runtime constants every script may rely on.
    pub fn with_builtins() -> Self {
        let mut scope = Self::new();
        scope.define("PHP_EOL", Value::String("\n".to_owned()));
        scope.define("PHP_VERSION", Value::String("8.2.0".to_owned()));
        scope.define(
            "DIRECTORY_SEPARATOR",
            Value::String(std::path::MAIN_SEPARATOR.to_string()),
        );
        scope.define("E_ALL", Value::Int(32767));
        scope
    }

    /// Define a constant unless it already exists; returns whether it was defined.
    pub fn define(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if self.constants.contains(&name) {
            return false;
        }
        self.constants.insert(name, value);
        true
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name, value);
    }

    pub fn unset_variable(&mut self, name: &str) {
        self.variables.remove(name);
    }

    pub fn constants(&self) -> &Bindings {
        &self.constants
    }

    pub fn variables(&self) -> &Bindings {
        &self.variables
    }

    pub fn loaded(&self) -> &[PathBuf] {
        &self.loaded
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.loaded.iter().any(|loaded| loaded == path)
    }

    pub fn mark_loaded(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.is_loaded(&path) {
            self.loaded.push(path);
        }
    }

    /// Names and paths known right now, for diffing after execution.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            constants: self.constants.iter().map(|(name, _)| name.to_owned()).collect(),
            variables: self.variables.iter().map(|(name, _)| name.to_owned()).collect(),
            loaded: self.loaded.iter().cloned().collect(),
        }
    }
}

/// Names present in a [`Scope`] at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    constants: HashSet<String>,
    variables: HashSet<String>,
    loaded: HashSet<PathBuf>,
}

impl Snapshot {
    pub fn has_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    pub fn has_loaded(&self, path: &Path) -> bool {
        self.loaded.contains(path)
    }
}

/// Execute the script at `path` against `scope`.
pub fn execute_file(scope: &mut Scope, path: &Path) -> Result<(), Error> {
    let source = read_script(path)?;
    execute_source(scope, &source, path)
}

/// Execute `source` as if it were read from `file`.
pub fn execute_source(scope: &mut Scope, source: &str, file: &Path) -> Result<(), Error> {
    let mut interpreter = Interpreter { scope, depth: 0 };
    interpreter.run(source, file)?;
    Ok(())
}

fn read_script(path: &Path) -> Result<String, Error> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| {
        ScriptError::new(1, 1, ScriptErrorKind::InvalidUtf8)
            .in_file(path)
            .into()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// `return` ends the current file only.
    Return,
    Exit,
}

struct Frame<'f> {
    source: &'f str,
    file: &'f Path,
    dir: PathBuf,
}

impl Frame<'_> {
    fn opaque(&self, span: Span) -> Value {
        Value::Expression(span.text(self.source).to_owned())
    }
}

struct Interpreter<'s> {
    scope: &'s mut Scope,
    depth: usize,
}

impl Interpreter<'_> {
    fn run(&mut self, source: &str, file: &Path) -> Result<Flow, Error> {
        let program = parse_program(source).map_err(|err| err.in_file(file))?;
        let frame = Frame {
            source,
            file,
            dir: file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        self.block(&frame, &program.statements)
    }

    fn block(&mut self, frame: &Frame<'_>, statements: &[Stmt]) -> Result<Flow, Error> {
        for stmt in statements {
            let flow = self.statement(frame, stmt)?;
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn statement(&mut self, frame: &Frame<'_>, stmt: &Stmt) -> Result<Flow, Error> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(frame, expr);
            }
            StmtKind::Assign { target, op, value } => self.assign(frame, target, *op, value),
            StmtKind::Const(items) => {
                for item in items {
                    let value = self.eval(frame, &item.value);
                    self.define(frame, &item.name, value);
                }
            }
            StmtKind::Include { kind, path } => return self.include(frame, stmt, *kind, path),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    let value = self.eval(frame, condition);
                    if value.is_opaque() {
                        warn!(
                            file = %frame.file.display(),
                            line = condition.span.line,
                            condition = %value,
                            "condition cannot be evaluated, skipping both branches"
                        );
                        return Ok(Flow::Continue);
                    }
                    if value.is_truthy() {
                        return self.block(frame, body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.block(frame, body);
                }
            }
            StmtKind::Block(body) => return self.block(frame, body),
            StmtKind::Unset(targets) => {
                for target in targets {
                    self.unset(frame, target);
                }
            }
            StmtKind::Return => return Ok(Flow::Return),
            StmtKind::Exit => return Ok(Flow::Exit),
            StmtKind::Global(_) | StmtKind::InlineHtml => {}
            StmtKind::Opaque => {
                debug!(
                    file = %frame.file.display(),
                    line = stmt.span.line,
                    "statement has no effect on bindings"
                );
            }
        }
        Ok(Flow::Continue)
    }

    fn define(&mut self, frame: &Frame<'_>, name: &str, value: Value) -> bool {
        let defined = self.scope.define(name, value);
        if !defined {
            warn!(
                file = %frame.file.display(),
                constant = name,
                "constant already defined, keeping the first value"
            );
        }
        defined
    }

    fn include(
        &mut self,
        frame: &Frame<'_>,
        stmt: &Stmt,
        kind: IncludeKind,
        path: &Expr,
    ) -> Result<Flow, Error> {
        let raw = match self.eval(frame, path) {
            Value::Expression(text) => {
                warn!(
                    file = %frame.file.display(),
                    line = stmt.span.line,
                    path = %text,
                    "include path cannot be evaluated, skipping"
                );
                return Ok(Flow::Continue);
            }
            value => value.to_string(),
        };

        let candidate = PathBuf::from(&raw);
        let candidate = if candidate.is_absolute() {
            candidate
        } else {
            frame.dir.join(candidate)
        };
        if candidate
            .file_name()
            .is_some_and(|name| name == BOOTSTRAP_FILE)
        {
            debug!(path = %candidate.display(), "not loading the application bootstrap");
            return Ok(Flow::Continue);
        }

        let source = match fs::canonicalize(&candidate).and_then(|resolved| {
            fs::read(&resolved).map(|bytes| (resolved, bytes))
        }) {
            Ok(found) => found,
            Err(err) if kind.is_required() => {
                debug!(path = %candidate.display(), error = %err, "required file is missing");
                return Err(ScriptError::new(
                    stmt.span.line,
                    stmt.span.column,
                    ScriptErrorKind::MissingRequire(candidate),
                )
                .in_file(frame.file)
                .into());
            }
            Err(err) => {
                warn!(path = %candidate.display(), error = %err, "included file is missing");
                return Ok(Flow::Continue);
            }
        };
        let (resolved, bytes) = source;

        if kind.is_once() && self.scope.is_loaded(&resolved) {
            debug!(path = %resolved.display(), "already loaded");
            return Ok(Flow::Continue);
        }
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(ScriptError::new(
                stmt.span.line,
                stmt.span.column,
                ScriptErrorKind::IncludeDepthExceeded,
            )
            .in_file(frame.file)
            .into());
        }

        let source = String::from_utf8(bytes).map_err(|_| {
            ScriptError::new(1, 1, ScriptErrorKind::InvalidUtf8).in_file(&resolved)
        })?;
        self.scope.mark_loaded(resolved.clone());
        debug!(path = %resolved.display(), "loading included file");

        self.depth += 1;
        let flow = self.run(&source, &resolved);
        self.depth -= 1;
        match flow? {
            Flow::Exit => Ok(Flow::Exit),
            _ => Ok(Flow::Continue),
        }
    }

    fn assign(&mut self, frame: &Frame<'_>, target: &Target, op: AssignOp, value: &Expr) {
        let mut keys = Vec::with_capacity(target.indices.len());
        for index in &target.indices {
            match index {
                None => keys.push(None),
                Some(expr) => match array_key(&self.eval(frame, expr)) {
                    Some(key) => keys.push(Some(key)),
                    None => {
                        debug!(
                            variable = %target.name,
                            "array key cannot be evaluated, skipping assignment"
                        );
                        return;
                    }
                },
            }
        }

        let mut slot = self
            .scope
            .variable(&target.name)
            .cloned()
            .unwrap_or(Value::Null);
        let current = lookup_path(&slot, &keys);

        if op == AssignOp::Coalesce && current.as_ref().is_some_and(|value| *value != Value::Null) {
            return;
        }

        let rhs = self.eval(frame, value);
        let new_value = match op {
            AssignOp::Assign | AssignOp::Coalesce => rhs,
            AssignOp::Concat | AssignOp::Add | AssignOp::Sub => {
                let binary = match op {
                    AssignOp::Concat => BinaryOp::Concat,
                    AssignOp::Add => BinaryOp::Add,
                    _ => BinaryOp::Sub,
                };
                let lhs = current.unwrap_or(Value::Null);
                binary_values(binary, &lhs, &rhs)
                    .unwrap_or_else(|| frame.opaque(target.span.to(value.span)))
            }
        };

        set_path(&mut slot, &keys, new_value);
        self.scope.set_variable(target.name.clone(), slot);
    }

    fn unset(&mut self, frame: &Frame<'_>, target: &Target) {
        if target.indices.is_empty() {
            self.scope.unset_variable(&target.name);
            return;
        }
        let mut keys = Vec::with_capacity(target.indices.len());
        for index in &target.indices {
            let Some(key) = index
                .as_ref()
                .and_then(|expr| array_key(&self.eval(frame, expr)))
            else {
                return;
            };
            keys.push(key);
        }
        let Some(mut slot) = self.scope.variable(&target.name).cloned() else {
            return;
        };
        remove_path(&mut slot, &keys);
        self.scope.set_variable(target.name.clone(), slot);
    }

    fn eval(&mut self, frame: &Frame<'_>, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Null => Value::Null,
            ExprKind::Bool(value) => Value::Bool(*value),
            ExprKind::Int(value) => Value::Int(*value),
            ExprKind::Float(value) => Value::Float(*value),
            ExprKind::Str(parts) => self.interpolate(frame, expr, parts),
            ExprKind::Const(name) => self
                .scope
                .constant(name)
                .cloned()
                .unwrap_or_else(|| frame.opaque(expr.span)),
            ExprKind::Magic(MagicConst::Dir) => {
                Value::String(frame.dir.to_string_lossy().into_owned())
            }
            ExprKind::Magic(MagicConst::File) => {
                Value::String(frame.file.to_string_lossy().into_owned())
            }
            ExprKind::Magic(MagicConst::Line) => Value::Int(i64::from(expr.span.line)),
            ExprKind::Var(name) => self.scope.variable(name).cloned().unwrap_or(Value::Null),
            ExprKind::Array(items) => {
                let mut array = Vec::with_capacity(items.len());
                for item in items {
                    let key = match &item.key {
                        None => Value::Int(next_index(&array)),
                        Some(key) => match array_key(&self.eval(frame, key)) {
                            Some(key) => key,
                            None => return frame.opaque(expr.span),
                        },
                    };
                    let value = self.eval(frame, &item.value);
                    if value.is_opaque() {
                        return frame.opaque(expr.span);
                    }
                    match array.iter_mut().find(|(existing, _)| *existing == key) {
                        Some(slot) => slot.1 = value,
                        None => array.push((key, value)),
                    }
                }
                Value::Array(array)
            }
            ExprKind::Index { base, index } => {
                let base = self.eval(frame, base);
                let index = self.eval(frame, index);
                index_value(&base, &index).unwrap_or_else(|| frame.opaque(expr.span))
            }
            ExprKind::Call { name, args } => self.call(frame, expr, name, args),
            ExprKind::Cast(kind, inner) => {
                let value = self.eval(frame, inner);
                if value.is_opaque() {
                    return frame.opaque(expr.span);
                }
                cast(*kind, value)
            }
            ExprKind::Unary(op, inner) => {
                let value = self.eval(frame, inner);
                if value.is_opaque() {
                    return frame.opaque(expr.span);
                }
                unary(*op, value).unwrap_or_else(|| frame.opaque(expr.span))
            }
            ExprKind::Binary(op, lhs, rhs) => self.binary(frame, expr, *op, lhs, rhs),
            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let value = self.eval(frame, condition);
                if value.is_opaque() {
                    return frame.opaque(expr.span);
                }
                let chosen = if value.is_truthy() {
                    match then {
                        Some(then) => self.eval(frame, then),
                        None => value,
                    }
                } else {
                    self.eval(frame, otherwise)
                };
                if chosen.is_opaque() {
                    frame.opaque(expr.span)
                } else {
                    chosen
                }
            }
            ExprKind::Opaque => frame.opaque(expr.span),
        }
    }

    fn interpolate(&mut self, frame: &Frame<'_>, expr: &Expr, parts: &[StrPart]) -> Value {
        let mut out = String::new();
        for part in parts {
            match part {
                StrPart::Text(text) => out.push_str(text),
                StrPart::Var(name) => match self.scope.variable(name) {
                    Some(Value::Expression(_)) => return frame.opaque(expr.span),
                    Some(value) => out.push_str(&value.to_string()),
                    None => {}
                },
            }
        }
        Value::String(out)
    }

    fn binary(
        &mut self,
        frame: &Frame<'_>,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Value {
        let left = self.eval(frame, lhs);
        if left.is_opaque() {
            return frame.opaque(expr.span);
        }

        let short_circuit = match op {
            BinaryOp::And if !left.is_truthy() => Some(Value::Bool(false)),
            BinaryOp::Or if left.is_truthy() => Some(Value::Bool(true)),
            BinaryOp::Coalesce if left != Value::Null => Some(left.clone()),
            _ => None,
        };
        if let Some(value) = short_circuit {
            return value;
        }

        let right = self.eval(frame, rhs);
        if right.is_opaque() {
            return frame.opaque(expr.span);
        }
        binary_values(op, &left, &right).unwrap_or_else(|| frame.opaque(expr.span))
    }

    fn call(&mut self, frame: &Frame<'_>, expr: &Expr, name: &str, args: &[Expr]) -> Value {
        let function = name.to_ascii_lowercase();
        match function.as_str() {
            "define" => return self.define_call(frame, expr, args),
            "isset" => {
                let mut all_set = true;
                for arg in args {
                    match self.isset(frame, arg) {
                        Some(set) => all_set &= set,
                        None => return frame.opaque(expr.span),
                    }
                }
                return Value::Bool(!args.is_empty() && all_set);
            }
            "empty" => {
                let [arg] = args else {
                    return frame.opaque(expr.span);
                };
                return match self.isset(frame, arg) {
                    None => frame.opaque(expr.span),
                    Some(false) => Value::Bool(true),
                    Some(true) => {
                        let value = self.eval(frame, arg);
                        if value.is_opaque() {
                            frame.opaque(expr.span)
                        } else {
                            Value::Bool(!value.is_truthy())
                        }
                    }
                };
            }
            _ => {}
        }

        let values: Vec<Value> = args.iter().map(|arg| self.eval(frame, arg)).collect();
        if values.iter().any(Value::is_opaque) {
            return frame.opaque(expr.span);
        }
        match self.builtin(&function, &values) {
            Some(value) => value,
            None => {
                debug!(function = name, "call cannot be folded");
                frame.opaque(expr.span)
            }
        }
    }

    fn define_call(&mut self, frame: &Frame<'_>, expr: &Expr, args: &[Expr]) -> Value {
        let [name, value, ..] = args else {
            return frame.opaque(expr.span);
        };
        let name = match self.eval(frame, name) {
            Value::Expression(_) | Value::Array(_) => return frame.opaque(expr.span),
            name => name.to_string(),
        };
        let value = self.eval(frame, value);
        Value::Bool(self.define(frame, &name, value))
    }

    /// `None` when the answer depends on an opaque value.
    fn isset(&mut self, frame: &Frame<'_>, expr: &Expr) -> Option<bool> {
        match &expr.kind {
            ExprKind::Var(name) => match self.scope.variable(name) {
                None | Some(Value::Null) => Some(false),
                Some(Value::Expression(_)) => None,
                Some(_) => Some(true),
            },
            ExprKind::Index { base, index } => {
                if !self.isset(frame, base)? {
                    return Some(false);
                }
                let base = self.eval(frame, base);
                let index = self.eval(frame, index);
                if index.is_opaque() {
                    return None;
                }
                match index_value(&base, &index) {
                    Some(Value::Null) => Some(false),
                    Some(_) => Some(true),
                    None => None,
                }
            }
            _ => {
                let value = self.eval(frame, expr);
                if value.is_opaque() {
                    None
                } else {
                    Some(value != Value::Null)
                }
            }
        }
    }

    fn builtin(&self, function: &str, args: &[Value]) -> Option<Value> {
        let value = match (function, args) {
            ("defined", [name]) => Value::Bool(self.scope.constant(&name.to_string()).is_some()),
            ("constant", [name]) => self.scope.constant(&name.to_string())?.clone(),
            ("dirname", [path]) => Value::String(dirname(&path.to_string())),
            ("dirname", [path, levels]) => {
                let mut path = path.to_string();
                for _ in 0..to_int(levels).max(1) {
                    path = dirname(&path);
                }
                Value::String(path)
            }
            ("basename", [path]) => Value::String(basename(&path.to_string(), "")),
            ("basename", [path, suffix]) => {
                Value::String(basename(&path.to_string(), &suffix.to_string()))
            }
            ("getenv", [name]) => match std::env::var(name.to_string()) {
                Ok(value) => Value::String(value),
                Err(_) => Value::Bool(false),
            },
            ("file_exists", [path]) => Value::Bool(Path::new(&path.to_string()).exists()),
            ("is_file", [path]) => Value::Bool(Path::new(&path.to_string()).is_file()),
            ("is_dir", [path]) => Value::Bool(Path::new(&path.to_string()).is_dir()),
            ("is_readable", [path]) => {
                let path = PathBuf::from(path.to_string());
                let readable = if path.is_dir() {
                    fs::read_dir(&path).is_ok()
                } else {
                    fs::File::open(&path).is_ok()
                };
                Value::Bool(readable)
            }
            ("strtolower", [text]) => Value::String(text.to_string().to_lowercase()),
            ("strtoupper", [text]) => Value::String(text.to_string().to_uppercase()),
            ("trim", [text]) => Value::String(trim(&text.to_string(), DEFAULT_TRIM, Trim::Both)),
            ("trim", [text, chars]) => {
                Value::String(trim(&text.to_string(), &chars.to_string(), Trim::Both))
            }
            ("ltrim", [text]) => Value::String(trim(&text.to_string(), DEFAULT_TRIM, Trim::Start)),
            ("ltrim", [text, chars]) => {
                Value::String(trim(&text.to_string(), &chars.to_string(), Trim::Start))
            }
            ("rtrim", [text]) => Value::String(trim(&text.to_string(), DEFAULT_TRIM, Trim::End)),
            ("rtrim", [text, chars]) => {
                Value::String(trim(&text.to_string(), &chars.to_string(), Trim::End))
            }
            ("intval", [value]) => Value::Int(to_int(value)),
            ("floatval", [value]) => Value::Float(to_number(value)?.as_f64()),
            ("strval", [value]) => Value::String(value.to_string()),
            ("boolval", [value]) => Value::Bool(value.is_truthy()),
            ("sprintf", [format, rest @ ..]) => sprintf(format, rest)?,
            ("implode", [separator, Value::Array(items)]) => {
                implode(&separator.to_string(), items)
            }
            ("implode", [Value::Array(items), separator]) => {
                implode(&separator.to_string(), items)
            }
            ("implode", [Value::Array(items)]) => implode("", items),
            _ => return None,
        };
        Some(value)
    }
}

const DEFAULT_TRIM: &str = " \t\n\r\0\x0B";

#[derive(Clone, Copy)]
enum Trim {
    Start,
    End,
    Both,
}

fn trim(text: &str, chars: &str, side: Trim) -> String {
    let strip = |ch: char| chars.contains(ch);
    match side {
        Trim::Start => text.trim_start_matches(strip),
        Trim::End => text.trim_end_matches(strip),
        Trim::Both => text.trim_matches(strip),
    }
    .to_owned()
}

fn dirname(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_owned();
    }
    match trimmed.rfind('/') {
        None => ".".to_owned(),
        Some(idx) => {
            let parent = trimmed[..idx].trim_end_matches('/');
            if parent.is_empty() {
                "/".to_owned()
            } else {
                parent.to_owned()
            }
        }
    }
}

fn basename(path: &str, suffix: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    match name.strip_suffix(suffix) {
        Some(stem) if !suffix.is_empty() && !stem.is_empty() => stem.to_owned(),
        _ => name.to_owned(),
    }
}

fn sprintf(format: &Value, args: &[Value]) -> Option<Value> {
    let format = format.to_string();
    let mut args = args.iter();
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            '%' => out.push('%'),
            's' => out.push_str(&args.next()?.to_string()),
            'd' => out.push_str(&to_int(args.next()?).to_string()),
            _ => return None,
        }
    }
    Some(Value::String(out))
}

fn implode(separator: &str, items: &[(Value, Value)]) -> Value {
    let joined = items
        .iter()
        .map(|(_, value)| value.to_string())
        .collect::<Vec<_>>()
        .join(separator);
    Value::String(joined)
}

fn cast(kind: CastKind, value: Value) -> Value {
    match kind {
        CastKind::Int => Value::Int(to_int(&value)),
        CastKind::Float => Value::Float(to_number(&value).map(Number::as_f64).unwrap_or(1.0)),
        CastKind::String => Value::String(value.to_string()),
        CastKind::Bool => Value::Bool(value.is_truthy()),
        CastKind::Array => match value {
            Value::Array(_) => value,
            Value::Null => Value::Array(Vec::new()),
            other => Value::Array(vec![(Value::Int(0), other)]),
        },
    }
}

fn unary(op: UnaryOp, value: Value) -> Option<Value> {
    match op {
        UnaryOp::Not => Some(Value::Bool(!value.is_truthy())),
        UnaryOp::Silence => Some(value),
        UnaryOp::Plus => Some(to_number(&value)?.into_value()),
        UnaryOp::Neg => match to_number(&value)? {
            Number::Int(int) => Some(
                int.checked_neg()
                    .map(Value::Int)
                    .unwrap_or(Value::Float(-(int as f64))),
            ),
            Number::Float(float) => Some(Value::Float(-float)),
        },
        UnaryOp::BitNot => match value {
            Value::Int(_) | Value::Float(_) => Some(Value::Int(!to_int(&value))),
            _ => None,
        },
    }
}

/// Fold a binary operator over two non-opaque values; `None` when the
/// runtime would raise instead of producing a value.
fn binary_values(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    let value = match op {
        BinaryOp::Concat => Value::String(format!("{left}{right}")),
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        BinaryOp::Xor => Value::Bool(left.is_truthy() != right.is_truthy()),
        BinaryOp::Coalesce => {
            if *left == Value::Null {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::Identical => Value::Bool(identical(left, right)),
        BinaryOp::NotIdentical => Value::Bool(!identical(left, right)),
        BinaryOp::Lt => Value::Bool(loose_compare(left, right)? == Ordering::Less),
        BinaryOp::Gt => Value::Bool(loose_compare(left, right)? == Ordering::Greater),
        BinaryOp::LtEq => Value::Bool(loose_compare(left, right)? != Ordering::Greater),
        BinaryOp::GtEq => Value::Bool(loose_compare(left, right)? != Ordering::Less),
        BinaryOp::Spaceship => Value::Int(match loose_compare(left, right)? {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }),
        BinaryOp::Add => match (left, right) {
            (Value::Array(lhs), Value::Array(rhs)) => {
                let mut union = lhs.clone();
                for (key, value) in rhs {
                    if !union.iter().any(|(existing, _)| existing == key) {
                        union.push((key.clone(), value.clone()));
                    }
                }
                Value::Array(union)
            }
            _ => arithmetic(op, to_number(left)?, to_number(right)?)?,
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            arithmetic(op, to_number(left)?, to_number(right)?)?
        }
        BinaryOp::Mod => {
            to_number(left)?;
            let divisor = to_int(&to_number(right)?.into_value());
            if divisor == 0 {
                return None;
            }
            Value::Int(to_int(left).wrapping_rem(divisor))
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            to_number(left)?;
            to_number(right)?;
            let (lhs, rhs) = (to_int(left), to_int(right));
            Value::Int(match op {
                BinaryOp::BitAnd => lhs & rhs,
                BinaryOp::BitOr => lhs | rhs,
                _ => lhs ^ rhs,
            })
        }
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            to_number(left)?;
            to_number(right)?;
            let shift = u32::try_from(to_int(right)).ok()?;
            let lhs = to_int(left);
            Value::Int(match op {
                BinaryOp::ShiftLeft => lhs.checked_shl(shift).unwrap_or(0),
                _ => lhs
                    .checked_shr(shift)
                    .unwrap_or(if lhs < 0 { -1 } else { 0 }),
            })
        }
    };
    Some(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(int) => int as f64,
            Self::Float(float) => float,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(int) => Value::Int(int),
            Self::Float(float) => Value::Float(float),
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(lhs), Self::Int(rhs)) => Some(lhs.cmp(&rhs)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

fn arithmetic(op: BinaryOp, left: Number, right: Number) -> Option<Value> {
    if let (Number::Int(lhs), Number::Int(rhs)) = (left, right) {
        let exact = match op {
            BinaryOp::Add => lhs.checked_add(rhs),
            BinaryOp::Sub => lhs.checked_sub(rhs),
            BinaryOp::Mul => lhs.checked_mul(rhs),
            BinaryOp::Div => {
                if rhs == 0 {
                    return None;
                }
                (lhs.checked_rem(rhs) == Some(0))
                    .then(|| lhs.checked_div(rhs))
                    .flatten()
            }
            BinaryOp::Pow => u32::try_from(rhs).ok().and_then(|exp| lhs.checked_pow(exp)),
            _ => None,
        };
        if let Some(value) = exact {
            return Some(Value::Int(value));
        }
    }

    let (lhs, rhs) = (left.as_f64(), right.as_f64());
    let value = match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => {
            if rhs == 0.0 {
                return None;
            }
            lhs / rhs
        }
        BinaryOp::Pow => lhs.powf(rhs),
        _ => return None,
    };
    Some(Value::Float(value))
}

/// Numeric reading of a value; arrays and opaque expressions have none.
fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Null => Some(Number::Int(0)),
        Value::Bool(flag) => Some(Number::Int(i64::from(*flag))),
        Value::Int(int) => Some(Number::Int(*int)),
        Value::Float(float) => Some(Number::Float(*float)),
        Value::String(text) => Some(
            leading_number(text)
                .map(|(number, _)| number)
                .unwrap_or(Number::Int(0)),
        ),
        Value::Array(_) | Value::Expression(_) => None,
    }
}

fn to_int(value: &Value) -> i64 {
    match value {
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Expression(_) => 0,
        other => match to_number(other) {
            Some(Number::Int(int)) => int,
            Some(Number::Float(float)) if float.is_finite() => float as i64,
            _ => 0,
        },
    }
}

const NUMERIC_WHITESPACE: [char; 6] = [' ', '\t', '\n', '\r', '\x0B', '\x0C'];

/// Longest numeric prefix of `text` and the number of bytes it spans.
fn leading_number(text: &str) -> Option<(Number, usize)> {
    let offset = text.len() - text.trim_start_matches(NUMERIC_WHITESPACE).len();
    let bytes = &text.as_bytes()[offset..];
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|byte| byte.is_ascii_digit())
            .count()
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits(end);
    end += int_digits;
    let mut is_float = false;
    if bytes.get(end) == Some(&b'.') {
        let fraction = digits(end + 1);
        if fraction > 0 || int_digits > 0 {
            is_float = true;
            end += 1 + fraction;
        }
    }
    if int_digits == 0 && !is_float {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_digits = digits(exponent);
        if exponent_digits > 0 {
            is_float = true;
            end = exponent + exponent_digits;
        }
    }

    let literal = &text[offset..offset + end];
    let number = if is_float {
        Number::Float(literal.parse().ok()?)
    } else {
        match literal.parse::<i64>() {
            Ok(int) => Number::Int(int),
            Err(_) => Number::Float(literal.parse().ok()?),
        }
    };
    Some((number, offset + end))
}

/// A string that is entirely numeric, surrounding whitespace allowed.
fn numeric_string(text: &str) -> Option<Number> {
    let (number, consumed) = leading_number(text)?;
    text[consumed..]
        .chars()
        .all(|ch| NUMERIC_WHITESPACE.contains(&ch))
        .then_some(number)
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    loose_compare(left, right) == Some(Ordering::Equal)
}

fn loose_compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Expression(_), _) | (_, Value::Expression(_)) => None,
        (Value::Null, Value::String(text)) => Some("".cmp(text.as_str())),
        (Value::String(text), Value::Null) => Some(text.as_str().cmp("")),
        (Value::Null | Value::Bool(_), _) | (_, Value::Null | Value::Bool(_)) => {
            Some(left.is_truthy().cmp(&right.is_truthy()))
        }
        (Value::String(lhs), Value::String(rhs)) => {
            match (numeric_string(lhs), numeric_string(rhs)) {
                (Some(lhs), Some(rhs)) => lhs.compare(rhs),
                _ => Some(lhs.cmp(rhs)),
            }
        }
        (Value::Int(_) | Value::Float(_), Value::String(text)) => {
            let number = to_number(left)?;
            match numeric_string(text) {
                Some(other) => number.compare(other),
                None => Some(left.to_string().cmp(text)),
            }
        }
        (Value::String(_), Value::Int(_) | Value::Float(_)) => {
            loose_compare(right, left).map(Ordering::reverse)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            to_number(left)?.compare(to_number(right)?)
        }
        (Value::Array(lhs), Value::Array(rhs)) => {
            if lhs.len() != rhs.len() {
                return Some(lhs.len().cmp(&rhs.len()));
            }
            for (key, value) in lhs {
                let (_, other) = rhs.iter().find(|(other_key, _)| other_key == key)?;
                match loose_compare(value, other)? {
                    Ordering::Equal => {}
                    unequal => return Some(unequal),
                }
            }
            Some(Ordering::Equal)
        }
        (Value::Array(_), _) => Some(Ordering::Greater),
        (_, Value::Array(_)) => Some(Ordering::Less),
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Float(lhs), Value::Float(rhs)) => lhs == rhs,
        (Value::Array(lhs), Value::Array(rhs)) => {
            lhs.len() == rhs.len()
                && lhs
                    .iter()
                    .zip(rhs)
                    .all(|((lk, lv), (rk, rv))| lk == rk && identical(lv, rv))
        }
        _ => left == right,
    }
}

/// Normalize a value into an array key; `None` for illegal keys.
fn array_key(value: &Value) -> Option<Value> {
    match value {
        Value::Int(_) => Some(value.clone()),
        Value::String(text) => Some(match text.parse::<i64>() {
            Ok(int) if int.to_string() == *text => Value::Int(int),
            _ => value.clone(),
        }),
        Value::Bool(flag) => Some(Value::Int(i64::from(*flag))),
        Value::Float(float) if float.is_finite() => Some(Value::Int(*float as i64)),
        Value::Null => Some(Value::String(String::new())),
        _ => None,
    }
}

fn next_index(items: &[(Value, Value)]) -> i64 {
    items
        .iter()
        .filter_map(|(key, _)| match key {
            Value::Int(int) => Some(*int + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0)
        .max(0)
}

/// Element lookup; `None` when the lookup cannot be folded.
fn index_value(base: &Value, index: &Value) -> Option<Value> {
    match base {
        Value::Array(items) => {
            let key = array_key(index)?;
            Some(
                items
                    .iter()
                    .find(|(existing, _)| *existing == key)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null),
            )
        }
        Value::String(text) => {
            let Value::Int(position) = array_key(index)? else {
                return None;
            };
            let position = if position < 0 {
                text.len().checked_sub(position.unsigned_abs() as usize)?
            } else {
                usize::try_from(position).ok()?
            };
            Some(
                text.get(position..position + 1)
                    .map(|ch| Value::String(ch.to_owned()))
                    .unwrap_or_else(|| Value::String(String::new())),
            )
        }
        Value::Null => Some(Value::Null),
        _ => None,
    }
}

fn lookup_path(slot: &Value, keys: &[Option<Value>]) -> Option<Value> {
    let Some((first, rest)) = keys.split_first() else {
        return Some(slot.clone());
    };
    let key = first.as_ref()?;
    let Value::Array(items) = slot else {
        return None;
    };
    let (_, child) = items.iter().find(|(existing, _)| existing == key)?;
    lookup_path(child, rest)
}

fn set_path(slot: &mut Value, keys: &[Option<Value>], value: Value) {
    let Some((first, rest)) = keys.split_first() else {
        *slot = value;
        return;
    };
    if slot.is_opaque() {
        return;
    }
    if !matches!(slot, Value::Array(_)) {
        *slot = Value::Array(Vec::new());
    }
    let Value::Array(items) = slot else {
        return;
    };
    let key = match first {
        Some(key) => key.clone(),
        None => Value::Int(next_index(items)),
    };
    let position = match items.iter().position(|(existing, _)| *existing == key) {
        Some(position) => position,
        None => {
            items.push((key, Value::Null));
            items.len() - 1
        }
    };
    set_path(&mut items[position].1, rest, value);
}

fn remove_path(slot: &mut Value, keys: &[Value]) {
    let Value::Array(items) = slot else {
        return;
    };
    match keys {
        [] => {}
        [last] => items.retain(|(existing, _)| existing != last),
        [first, rest @ ..] => {
            if let Some((_, child)) = items.iter_mut().find(|(existing, _)| existing == first) {
                remove_path(child, rest);
            }
        }
    }
}
