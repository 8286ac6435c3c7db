use tracing::debug;

use crate::error::{ScriptError, ScriptErrorKind};
use crate::lexer::{Span, StrPart, Token, TokenKind, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        target: Target,
        op: AssignOp,
        value: Expr,
    },
    Const(Vec<ConstItem>),
    Include {
        kind: IncludeKind,
        path: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Unset(Vec<Target>),
    Global(Vec<String>),
    Return,
    Exit,
    InlineHtml,
    /// A construct the evaluator has no capability for.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstItem {
    pub name: String,
    pub name_span: Span,
    pub value: Expr,
}

/// Variable, optionally indexed, on the left of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    /// `None` is the append form `$a[] = ...`.
    pub indices: Vec<Option<Expr>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Concat,
    Add,
    Sub,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Include,
    IncludeOnce,
    Require,
    RequireOnce,
}

impl IncludeKind {
    pub fn is_once(self) -> bool {
        matches!(self, Self::IncludeOnce | Self::RequireOnce)
    }

    pub fn is_required(self) -> bool {
        matches!(self, Self::Require | Self::RequireOnce)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Vec<StrPart>),
    Const(String),
    Magic(MagicConst),
    Var(String),
    Array(Vec<ArrayItem>),
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Cast(CastKind, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary {
        condition: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
    },
    /// Object access, static calls, `new`, dynamic calls.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicConst {
    Dir,
    File,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Float,
    String,
    Bool,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Spaceship,
    And,
    Or,
    Xor,
    Coalesce,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl Expr {
    /// Text of a string literal without interpolation.
    pub fn literal_text(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(parts) => match parts.as_slice() {
                [StrPart::Text(text)] => Some(text.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Call `visit` on this expression and every nested one, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Array(items) => {
                for item in items {
                    if let Some(key) = &item.key {
                        key.walk(visit);
                    }
                    item.value.walk(visit);
                }
            }
            ExprKind::Index { base, index } => {
                base.walk(visit);
                index.walk(visit);
            }
            ExprKind::Call { args, .. } => args.iter().for_each(|arg| arg.walk(visit)),
            ExprKind::Cast(_, inner) | ExprKind::Unary(_, inner) => inner.walk(visit),
            ExprKind::Binary(_, lhs, rhs) => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(visit);
                if let Some(then) = then {
                    then.walk(visit);
                }
                otherwise.walk(visit);
            }
            _ => {}
        }
    }
}

/// Tokenize and parse a whole script.
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    Parser {
        source,
        tokens: &tokens,
        pos: 0,
    }
    .program()
}

type ParseResult<T> = Result<T, ScriptError>;

const UNARY_BP: u8 = 36;
const TERNARY_LEVEL: u8 = 5;

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while self.pos < self.tokens.len() {
            if let Some(stmt) = self.statement()? {
                statements.push(stmt);
            }
        }
        Ok(Program { statements })
    }

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> ParseResult<&'a Token> {
        let token = self.current().ok_or_else(|| self.end_error())?;
        self.pos += 1;
        Ok(token)
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.current().is_some_and(|token| token.is_punct(punct))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.current().is_some_and(|token| token.is_keyword(keyword))
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<Span> {
        let token = self.advance()?;
        if token.is_punct(punct) {
            Ok(token.span)
        } else {
            Err(self.unexpected(token))
        }
    }

    fn unexpected(&self, token: &Token) -> ScriptError {
        ScriptError::new(
            token.span.line,
            token.span.column,
            ScriptErrorKind::UnexpectedToken(token.describe(self.source)),
        )
    }

    fn unsupported(&self, token: &Token, what: &'static str) -> ScriptError {
        ScriptError::new(
            token.span.line,
            token.span.column,
            ScriptErrorKind::UnsupportedSyntax(what),
        )
    }

    fn end_error(&self) -> ScriptError {
        let (line, column) = self
            .tokens
            .last()
            .map(|token| (token.span.line, token.span.column))
            .unwrap_or((1, 1));
        ScriptError::new(line, column, ScriptErrorKind::UnexpectedEnd)
    }

    /// Consume `;`, or stop in front of `?>` which also ends a statement.
    fn terminator(&mut self, last: Span) -> ParseResult<Span> {
        match self.current() {
            Some(token) if token.is_punct(";") => {
                self.pos += 1;
                Ok(token.span)
            }
            Some(token) if token.kind == TokenKind::CloseTag => Ok(last),
            Some(token) => Err(self.unexpected(token)),
            None => Err(self.end_error()),
        }
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn statement(&mut self) -> ParseResult<Option<Stmt>> {
        let Some(token) = self.current() else {
            return Ok(None);
        };
        match &token.kind {
            TokenKind::OpenTag | TokenKind::CloseTag => {
                self.pos += 1;
                return Ok(None);
            }
            TokenKind::InlineHtml => {
                self.pos += 1;
                return Ok(Some(Stmt {
                    kind: StmtKind::InlineHtml,
                    span: token.span,
                }));
            }
            TokenKind::Punct(";") => {
                self.pos += 1;
                return Ok(None);
            }
            TokenKind::Punct("{") => {
                let (statements, span) = self.block()?;
                return Ok(Some(Stmt {
                    kind: StmtKind::Block(statements),
                    span,
                }));
            }
            TokenKind::Punct("}") => return Err(self.unexpected(token)),
            _ => {}
        }

        let start = self.pos;
        match self.structured_statement() {
            Ok(stmt) => Ok(Some(stmt)),
            Err(err) => {
                debug!(
                    line = token.span.line,
                    reason = %err.kind,
                    "keeping statement as opaque"
                );
                self.pos = start;
                self.opaque_statement().map(Some)
            }
        }
    }

    fn structured_statement(&mut self) -> ParseResult<Stmt> {
        let first = self.current().ok_or_else(|| self.end_error())?;
        if let TokenKind::Ident(word) = &first.kind {
            match word.to_ascii_lowercase().as_str() {
                "if" => return self.if_statement(),
                "include" | "include_once" | "require" | "require_once" => {
                    return self.include_statement();
                }
                "const" => return self.const_statement(),
                "unset" => return self.unset_statement(),
                "global" => return self.global_statement(),
                "return" => return self.return_statement(StmtKind::Return),
                "exit" | "die" => return self.return_statement(StmtKind::Exit),
                "echo" | "print" | "function" | "class" | "interface" | "trait" | "enum"
                | "abstract" | "final" | "readonly" | "namespace" | "use" | "declare" | "for"
                | "foreach" | "while" | "do" | "switch" | "try" | "throw" | "goto" | "static"
                | "else" | "elseif" => return Err(self.unsupported(first, "statement")),
                _ => {}
            }
        }

        if matches!(first.kind, TokenKind::Variable(_))
            && let Some(stmt) = self.assignment()?
        {
            return Ok(stmt);
        }

        let expr = self.expression()?;
        let end = self.terminator(expr.span)?;
        Ok(Stmt {
            span: first.span.to(end),
            kind: StmtKind::Expr(expr),
        })
    }

    fn assignment(&mut self) -> ParseResult<Option<Stmt>> {
        let start = self.pos;
        let target = self.target()?;
        let op = match self.current().map(|token| &token.kind) {
            Some(TokenKind::Punct("=")) => AssignOp::Assign,
            Some(TokenKind::Punct(".=")) => AssignOp::Concat,
            Some(TokenKind::Punct("+=")) => AssignOp::Add,
            Some(TokenKind::Punct("-=")) => AssignOp::Sub,
            Some(TokenKind::Punct("??=")) => AssignOp::Coalesce,
            _ => {
                self.pos = start;
                return Ok(None);
            }
        };
        self.pos += 1;
        if let Some(token) = self.current()
            && token.is_punct("&")
        {
            return Err(self.unsupported(token, "references"));
        }
        let value = self.expression()?;
        let end = self.terminator(value.span)?;
        Ok(Some(Stmt {
            span: target.span.to(end),
            kind: StmtKind::Assign { target, op, value },
        }))
    }

    fn target(&mut self) -> ParseResult<Target> {
        let token = self.advance()?;
        let TokenKind::Variable(name) = &token.kind else {
            return Err(self.unexpected(token));
        };
        let mut span = token.span;
        let mut indices = Vec::new();
        while self.at_punct("[") {
            self.pos += 1;
            if self.at_punct("]") {
                indices.push(None);
            } else {
                indices.push(Some(self.expression()?));
            }
            span = span.to(self.expect_punct("]")?);
        }
        Ok(Target {
            name: name.clone(),
            indices,
            span,
        })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance()?.span;
        let mut branches = Vec::new();
        let (condition, body, mut end) = self.if_branch()?;
        branches.push((condition, body));
        let mut otherwise = None;

        loop {
            if self.at_keyword("elseif") {
                self.pos += 1;
            } else if self.at_keyword("else")
                && self.peek(1).is_some_and(|token| token.is_keyword("if"))
            {
                self.pos += 2;
            } else if self.at_keyword("else") {
                self.pos += 1;
                let (body, body_end) = self.body()?;
                otherwise = Some(body);
                end = body_end;
                break;
            } else {
                break;
            }
            let (condition, body, branch_end) = self.if_branch()?;
            branches.push((condition, body));
            end = branch_end;
        }

        Ok(Stmt {
            kind: StmtKind::If {
                branches,
                otherwise,
            },
            span: start.to(end),
        })
    }

    fn if_branch(&mut self) -> ParseResult<(Expr, Vec<Stmt>, Span)> {
        self.expect_punct("(")?;
        let condition = self.expression()?;
        self.expect_punct(")")?;
        if let Some(token) = self.current()
            && token.is_punct(":")
        {
            return Err(self.unsupported(token, "alternative control syntax"));
        }
        let (body, end) = self.body()?;
        Ok((condition, body, end))
    }

    fn body(&mut self) -> ParseResult<(Vec<Stmt>, Span)> {
        if self.at_punct("{") {
            return self.block();
        }
        let stmt = self.statement()?;
        let end = self.previous_span();
        Ok((stmt.into_iter().collect(), end))
    }

    fn block(&mut self) -> ParseResult<(Vec<Stmt>, Span)> {
        let open = self.expect_punct("{")?;
        let mut statements = Vec::new();
        loop {
            let Some(token) = self.current() else {
                return Err(self.end_error());
            };
            if token.is_punct("}") {
                self.pos += 1;
                return Ok((statements, open.to(token.span)));
            }
            if let Some(stmt) = self.statement()? {
                statements.push(stmt);
            }
        }
    }

    fn include_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance()?;
        let kind = match &keyword.kind {
            TokenKind::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "include" => IncludeKind::Include,
                "include_once" => IncludeKind::IncludeOnce,
                "require" => IncludeKind::Require,
                _ => IncludeKind::RequireOnce,
            },
            _ => return Err(self.unexpected(keyword)),
        };
        let path = self.expression()?;
        let end = self.terminator(path.span)?;
        Ok(Stmt {
            kind: StmtKind::Include { kind, path },
            span: keyword.span.to(end),
        })
    }

    fn const_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance()?.span;
        let mut items = Vec::new();
        loop {
            let token = self.advance()?;
            let TokenKind::Ident(name) = &token.kind else {
                return Err(self.unexpected(token));
            };
            self.expect_punct("=")?;
            let value = self.expression()?;
            items.push(ConstItem {
                name: name.clone(),
                name_span: token.span,
                value,
            });
            if self.at_punct(",") {
                self.pos += 1;
                continue;
            }
            break;
        }
        let last = self.previous_span();
        let end = self.terminator(last)?;
        Ok(Stmt {
            kind: StmtKind::Const(items),
            span: start.to(end),
        })
    }

    fn unset_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance()?.span;
        self.expect_punct("(")?;
        let mut targets = Vec::new();
        while !self.at_punct(")") {
            targets.push(self.target()?);
            if self.at_punct(",") {
                self.pos += 1;
            }
        }
        let close = self.expect_punct(")")?;
        let end = self.terminator(close)?;
        Ok(Stmt {
            kind: StmtKind::Unset(targets),
            span: start.to(end),
        })
    }

    fn global_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance()?.span;
        let mut names = Vec::new();
        loop {
            let token = self.advance()?;
            let TokenKind::Variable(name) = &token.kind else {
                return Err(self.unexpected(token));
            };
            names.push(name.clone());
            if !self.at_punct(",") {
                break;
            }
            self.pos += 1;
        }
        let last = self.previous_span();
        let end = self.terminator(last)?;
        Ok(Stmt {
            kind: StmtKind::Global(names),
            span: start.to(end),
        })
    }

    fn return_statement(&mut self, kind: StmtKind) -> ParseResult<Stmt> {
        let start = self.advance()?.span;
        let at_end = self
            .current()
            .is_none_or(|token| token.is_punct(";") || token.kind == TokenKind::CloseTag);
        if !at_end {
            self.expression()?;
        }
        let last = self.previous_span();
        let end = self.terminator(last)?;
        Ok(Stmt {
            kind,
            span: start.to(end),
        })
    }

    /// Skip a statement without understanding it, balancing brackets.
    fn opaque_statement(&mut self) -> ParseResult<Stmt> {
        let start_pos = self.pos;
        let start = self.current().ok_or_else(|| self.end_error())?.span;
        let mut end = start;
        let mut open: Vec<&'static str> = Vec::new();

        while let Some(token) = self.current() {
            match &token.kind {
                TokenKind::Punct(punct @ ("(" | "[" | "{")) => open.push(*punct),
                TokenKind::Punct(")" | "]" | "}") => {
                    if open.is_empty() {
                        if self.pos == start_pos {
                            return Err(self.unexpected(token));
                        }
                        break;
                    }
                    let opener = open.pop();
                    self.pos += 1;
                    end = token.span;
                    if open.is_empty() && opener == Some("{") && !self.continues_block() {
                        break;
                    }
                    continue;
                }
                TokenKind::Punct(";") if open.is_empty() => {
                    self.pos += 1;
                    end = token.span;
                    break;
                }
                TokenKind::CloseTag if open.is_empty() => break,
                _ => {}
            }
            end = token.span;
            self.pos += 1;
        }

        if !open.is_empty() {
            return Err(self.end_error());
        }
        Ok(Stmt {
            kind: StmtKind::Opaque,
            span: start.to(end),
        })
    }

    fn continues_block(&self) -> bool {
        self.current().is_some_and(|token| {
            ["else", "elseif", "catch", "finally", "while"]
                .iter()
                .any(|keyword| token.is_keyword(keyword))
        })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.expr_bp(0)
    }

    fn expr_bp(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.unary()?;

        while let Some(token) = self.current() {
            if token.is_punct("?") {
                if TERNARY_LEVEL * 2 < min_bp {
                    break;
                }
                self.pos += 1;
                let then = if self.at_punct(":") {
                    None
                } else {
                    Some(Box::new(self.expr_bp(0)?))
                };
                self.expect_punct(":")?;
                let otherwise = self.expr_bp(TERNARY_LEVEL * 2 + 1)?;
                let span = lhs.span.to(otherwise.span);
                lhs = Expr {
                    kind: ExprKind::Ternary {
                        condition: Box::new(lhs),
                        then,
                        otherwise: Box::new(otherwise),
                    },
                    span,
                };
                continue;
            }

            let Some((op, level, right_assoc)) = binary_op(token) else {
                break;
            };
            let left_bp = level * 2;
            if left_bp < min_bp {
                break;
            }
            self.pos += 1;
            let right_bp = if right_assoc { left_bp } else { left_bp + 1 };
            let rhs = self.expr_bp(right_bp)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                span,
            };
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let token = self.current().ok_or_else(|| self.end_error())?;
        let op = match &token.kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Punct("@") => Some(UnaryOp::Silence),
            TokenKind::Punct("&" | "++" | "--") => {
                return Err(self.unsupported(token, "references and increments"));
            }
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.expr_bp(UNARY_BP)?;
            let span = token.span.to(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary(op, Box::new(operand)),
                span,
            });
        }

        if token.is_punct("(")
            && let Some(cast) = self.peek(1).and_then(cast_kind)
            && self.peek(2).is_some_and(|close| close.is_punct(")"))
        {
            self.pos += 3;
            let operand = self.expr_bp(UNARY_BP)?;
            let span = token.span.to(operand.span);
            return Ok(Expr {
                kind: ExprKind::Cast(cast, Box::new(operand)),
                span,
            });
        }

        let primary = self.primary()?;
        self.postfix(primary)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.advance()?;
        let span = token.span;
        let kind = match &token.kind {
            TokenKind::Int(value) => ExprKind::Int(*value),
            TokenKind::Float(value) => ExprKind::Float(*value),
            TokenKind::Str(parts) => ExprKind::Str(parts.clone()),
            TokenKind::Variable(name) => ExprKind::Var(name.clone()),
            TokenKind::Punct("(") => {
                let inner = self.expression()?;
                let close = self.expect_punct(")")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: span.to(close),
                });
            }
            TokenKind::Punct("[") => {
                let (items, close) = self.array_items("]")?;
                return Ok(Expr {
                    kind: ExprKind::Array(items),
                    span: span.to(close),
                });
            }
            TokenKind::Ident(name) => return self.ident_expression(token, name),
            _ => return Err(self.unexpected(token)),
        };
        Ok(Expr { kind, span })
    }

    fn ident_expression(&mut self, token: &'a Token, name: &str) -> ParseResult<Expr> {
        let span = token.span;
        let lower = name.to_ascii_lowercase();
        let followed_by_call = self.at_punct("(");

        match lower.as_str() {
            "true" if !followed_by_call => return Ok(literal(ExprKind::Bool(true), span)),
            "false" if !followed_by_call => return Ok(literal(ExprKind::Bool(false), span)),
            "null" if !followed_by_call => return Ok(literal(ExprKind::Null, span)),
            "__dir__" => return Ok(literal(ExprKind::Magic(MagicConst::Dir), span)),
            "__file__" => return Ok(literal(ExprKind::Magic(MagicConst::File), span)),
            "__line__" => return Ok(literal(ExprKind::Magic(MagicConst::Line), span)),
            "array" if followed_by_call => {
                self.pos += 1;
                let (items, close) = self.array_items(")")?;
                return Ok(Expr {
                    kind: ExprKind::Array(items),
                    span: span.to(close),
                });
            }
            "new" => return self.new_expression(span),
            "function" | "fn" | "static" | "match" | "list" | "include" | "include_once"
            | "require" | "require_once" | "clone" | "yield" | "throw" | "print" => {
                return Err(self.unsupported(token, "expression"));
            }
            _ => {}
        }

        if followed_by_call {
            let (args, close) = self.arguments()?;
            return Ok(Expr {
                kind: ExprKind::Call {
                    name: name.to_owned(),
                    args,
                },
                span: span.to(close),
            });
        }

        if self.at_punct("::") {
            return self.static_access(span);
        }

        Ok(literal(ExprKind::Const(name.to_owned()), span))
    }

    fn new_expression(&mut self, start: Span) -> ParseResult<Expr> {
        let class = self.advance()?;
        if !matches!(class.kind, TokenKind::Ident(_) | TokenKind::Variable(_)) {
            return Err(self.unsupported(class, "expression"));
        }
        let mut end = class.span;
        if self.at_punct("(") {
            end = self.arguments()?.1;
        }
        Ok(literal(ExprKind::Opaque, start.to(end)))
    }

    fn static_access(&mut self, start: Span) -> ParseResult<Expr> {
        self.pos += 1;
        let member = self.advance()?;
        if !matches!(member.kind, TokenKind::Ident(_) | TokenKind::Variable(_)) {
            return Err(self.unexpected(member));
        }
        let mut end = member.span;
        if self.at_punct("(") {
            end = self.arguments()?.1;
        }
        Ok(literal(ExprKind::Opaque, start.to(end)))
    }

    fn postfix(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        while let Some(token) = self.current() {
            match &token.kind {
                TokenKind::Punct("[") => {
                    self.pos += 1;
                    if self.at_punct("]") {
                        return Err(self.unsupported(token, "empty index outside assignment"));
                    }
                    let index = self.expression()?;
                    let close = self.expect_punct("]")?;
                    let span = expr.span.to(close);
                    expr = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                TokenKind::Punct("->" | "?->") => {
                    self.pos += 1;
                    let member = self.advance()?;
                    if !matches!(member.kind, TokenKind::Ident(_) | TokenKind::Variable(_)) {
                        return Err(self.unsupported(member, "dynamic member access"));
                    }
                    let mut end = member.span;
                    if self.at_punct("(") {
                        end = self.arguments()?.1;
                    }
                    expr = literal(ExprKind::Opaque, expr.span.to(end));
                }
                TokenKind::Punct("::") => {
                    expr = self.static_access(expr.span)?;
                }
                TokenKind::Punct("(") => {
                    let (_, close) = self.arguments()?;
                    expr = literal(ExprKind::Opaque, expr.span.to(close));
                }
                TokenKind::Punct("++" | "--") => {
                    return Err(self.unsupported(token, "references and increments"));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> ParseResult<(Vec<Expr>, Span)> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        loop {
            if let Some(token) = self.current()
                && token.is_punct(")")
            {
                self.pos += 1;
                return Ok((args, token.span));
            }
            if let Some(token) = self.current()
                && (token.is_punct("...") || token.is_punct("&"))
            {
                return Err(self.unsupported(token, "argument unpacking"));
            }
            args.push(self.expression()?);
            if self.at_punct(",") {
                self.pos += 1;
            } else if !self.at_punct(")") {
                let token = self.current().ok_or_else(|| self.end_error())?;
                return Err(self.unexpected(token));
            }
        }
    }

    fn array_items(&mut self, close: &str) -> ParseResult<(Vec<ArrayItem>, Span)> {
        let mut items = Vec::new();
        loop {
            if let Some(token) = self.current()
                && token.is_punct(close)
            {
                self.pos += 1;
                return Ok((items, token.span));
            }
            if let Some(token) = self.current()
                && (token.is_punct("...") || token.is_punct("&"))
            {
                return Err(self.unsupported(token, "array unpacking"));
            }
            let first = self.expression()?;
            let item = if self.at_punct("=>") {
                self.pos += 1;
                ArrayItem {
                    key: Some(first),
                    value: self.expression()?,
                }
            } else {
                ArrayItem {
                    key: None,
                    value: first,
                }
            };
            items.push(item);
            if self.at_punct(",") {
                self.pos += 1;
            } else if !self.at_punct(close) {
                let token = self.current().ok_or_else(|| self.end_error())?;
                return Err(self.unexpected(token));
            }
        }
    }
}

fn literal(kind: ExprKind, span: Span) -> Expr {
    Expr { kind, span }
}

fn cast_kind(token: &Token) -> Option<CastKind> {
    let TokenKind::Ident(name) = &token.kind else {
        return None;
    };
    match name.to_ascii_lowercase().as_str() {
        "int" | "integer" => Some(CastKind::Int),
        "float" | "double" => Some(CastKind::Float),
        "string" => Some(CastKind::String),
        "bool" | "boolean" => Some(CastKind::Bool),
        "array" => Some(CastKind::Array),
        _ => None,
    }
}

/// Operator, precedence level and right associativity of a binary operator token.
fn binary_op(token: &Token) -> Option<(BinaryOp, u8, bool)> {
    let op = match &token.kind {
        TokenKind::Ident(word) => match word.to_ascii_lowercase().as_str() {
            "or" => (BinaryOp::Or, 1, false),
            "xor" => (BinaryOp::Xor, 2, false),
            "and" => (BinaryOp::And, 3, false),
            _ => return None,
        },
        TokenKind::Punct(punct) => match *punct {
            "??" => (BinaryOp::Coalesce, 6, true),
            "||" => (BinaryOp::Or, 7, false),
            "&&" => (BinaryOp::And, 8, false),
            "|" => (BinaryOp::BitOr, 9, false),
            "^" => (BinaryOp::BitXor, 10, false),
            "&" => (BinaryOp::BitAnd, 11, false),
            "==" => (BinaryOp::Eq, 12, false),
            "!=" | "<>" => (BinaryOp::NotEq, 12, false),
            "===" => (BinaryOp::Identical, 12, false),
            "!==" => (BinaryOp::NotIdentical, 12, false),
            "<=>" => (BinaryOp::Spaceship, 12, false),
            "<" => (BinaryOp::Lt, 13, false),
            ">" => (BinaryOp::Gt, 13, false),
            "<=" => (BinaryOp::LtEq, 13, false),
            ">=" => (BinaryOp::GtEq, 13, false),
            "." => (BinaryOp::Concat, 14, false),
            "<<" => (BinaryOp::ShiftLeft, 15, false),
            ">>" => (BinaryOp::ShiftRight, 15, false),
            "+" => (BinaryOp::Add, 16, false),
            "-" => (BinaryOp::Sub, 16, false),
            "*" => (BinaryOp::Mul, 17, false),
            "/" => (BinaryOp::Div, 17, false),
            "%" => (BinaryOp::Mod, 17, false),
            "**" => (BinaryOp::Pow, 19, true),
            _ => return None,
        },
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program(source).expect("parse should succeed")
    }

    #[test]
    fn parses_define_call_with_argument_spans() {
        let source = "<?php\ndefine( 'WP_DEBUG', false );\n";
        let program = parse(source);
        assert_eq!(program.statements.len(), 1);
        let stmt = &program.statements[0];
        assert_eq!(stmt.span.text(source), "define( 'WP_DEBUG', false );");
        let StmtKind::Expr(Expr {
            kind: ExprKind::Call { name, args },
            ..
        }) = &stmt.kind
        else {
            panic!("expected call statement, got {:?}", stmt.kind);
        };
        assert_eq!(name, "define");
        assert_eq!(args[0].literal_text(), Some("WP_DEBUG"));
        assert_eq!(args[1].span.text(source), "false");
    }

    #[test]
    fn parses_assignment_with_concatenation() {
        let source = "<?php $table_prefix = 'wp' . '_';";
        let program = parse(source);
        let StmtKind::Assign { target, op, value } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(target.name, "table_prefix");
        assert_eq!(*op, AssignOp::Assign);
        assert_eq!(value.span.text(source), "'wp' . '_'");
        assert!(matches!(
            value.kind,
            ExprKind::Binary(BinaryOp::Concat, _, _)
        ));
    }

    #[test]
    fn parses_if_else_chain() {
        let source = "<?php if ( ! defined( 'ABSPATH' ) ) {\n\tdefine( 'ABSPATH', __DIR__ . '/' );\n} elseif ( $a ) $b = 1; else { $c = 2; }";
        let program = parse(source);
        let StmtKind::If {
            branches,
            otherwise,
        } = &program.statements[0].kind
        else {
            panic!("expected if statement");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].1.len(), 1);
        assert_eq!(branches[1].1.len(), 1);
        assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn precedence_puts_arithmetic_above_concatenation() {
        let source = "<?php $a = 'n' . 1 + 2;";
        let program = parse(source);
        let StmtKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary(BinaryOp::Concat, _, rhs) = &value.kind else {
            panic!("expected concatenation at the root");
        };
        assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn unknown_constructs_become_opaque_statements() {
        let source = "<?php\nfunction helper() { return 1; }\nforeach ( $a as $b ) { echo $b; }\n$x = 1;\n";
        let program = parse(source);
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.statements[0].kind, StmtKind::Opaque);
        assert_eq!(program.statements[1].kind, StmtKind::Opaque);
        assert!(matches!(program.statements[2].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn method_calls_are_opaque_expressions() {
        let source = "<?php $x = $obj->get( 'a' )['b'];";
        let program = parse(source);
        let StmtKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Index { base, .. } = &value.kind else {
            panic!("expected index access");
        };
        assert_eq!(base.kind, ExprKind::Opaque);
    }

    #[test]
    fn close_tag_terminates_without_being_part_of_the_statement() {
        let source = "<?php $a = 1 ?>\n";
        let program = parse(source);
        assert_eq!(program.statements[0].span.text(source), "$a = 1");
    }

    #[test]
    fn unbalanced_block_is_an_error() {
        let err = parse_program("<?php if ( true ) { $a = 1;\n").expect_err("expected error");
        assert_eq!(err.kind, ScriptErrorKind::UnexpectedEnd);
    }

    #[test]
    fn const_declarations_list_items() {
        let source = "<?php const A = 1, B = 'two';";
        let program = parse(source);
        let StmtKind::Const(items) = &program.statements[0].kind else {
            panic!("expected const statement");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "B");
        assert_eq!(items[1].value.span.text(source), "'two'");
    }

    #[test]
    fn casts_and_ternaries() {
        let source = "<?php $a = (int) '5' ? 'yes' : 'no';";
        let program = parse(source);
        let StmtKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Ternary { .. }));
    }
}
