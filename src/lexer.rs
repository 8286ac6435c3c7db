use crate::error::{ScriptError, ScriptErrorKind};

/// Byte range of a token or node in the original source, with the 1-based
/// line and column of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub(crate) fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }

    pub fn text(self, source: &str) -> &str {
        &source[self.start..self.end]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Text outside `<?php ... ?>`.
    InlineHtml,
    OpenTag,
    CloseTag,
    Variable(String),
    Ident(String),
    Str(Vec<StrPart>),
    Int(i64),
    Float(f64),
    Punct(&'static str),
}

/// Piece of a string literal; double-quoted strings may interpolate variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrPart {
    Text(String),
    Var(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub(crate) fn is_punct(&self, punct: &str) -> bool {
        matches!(self.kind, TokenKind::Punct(p) if p == punct)
    }

    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }

    pub(crate) fn describe(&self, source: &str) -> String {
        match self.kind {
            TokenKind::InlineHtml => "inline HTML".to_owned(),
            _ => self.span.text(source).to_owned(),
        }
    }
}

const PUNCTUATION: [&str; 50] = [
    "===", "!==", "<=>", "**=", "...", "??=", "<<=", ">>=", "?->", "==", "!=", "<>", "<=", ">=",
    "&&", "||", "??", "=>", "->", "::", ".=", "+=", "-=", "*=", "/=", "%=", "++", "--", "**", "<<",
    ">>", "|=", "&=", "^=", "(", ")", "[", "]", "{", "}", ";", ",", "=", "<", ">", "!", ".", "+",
    "-", "*",
];

const SINGLE_PUNCTUATION: [&str; 9] = ["/", "%", "?", ":", "@", "&", "|", "^", "~"];

/// Split PHP source into tokens. Comments and whitespace are dropped.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line_starts: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(idx, _)| idx + 1),
        );

        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line_starts,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        while self.pos < self.bytes.len() {
            self.lex_html()?;
            self.lex_php()?;
        }
        Ok(self.tokens)
    }

    fn span(&self, start: usize, end: usize) -> Span {
        let line_idx = match self.line_starts.binary_search(&start) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self.source[line_start..start].chars().count() as u32 + 1;
        Span {
            start,
            end,
            line: line_idx as u32 + 1,
            column,
        }
    }

    fn error(&self, at: usize, kind: ScriptErrorKind) -> ScriptError {
        let span = self.span(at, at);
        ScriptError::new(span.line, span.column, kind)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let span = self.span(start, self.pos);
        self.tokens.push(Token { kind, span });
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn lex_html(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        let mut idx = self.pos;
        while idx < self.bytes.len() {
            if self.bytes[idx] == b'<' && self.bytes.get(idx + 1) == Some(&b'?') {
                let tail = &self.source[idx + 2..];
                let php_tag = tail
                    .get(..3)
                    .is_some_and(|tag| tag.eq_ignore_ascii_case("php"))
                    && tail[3..]
                        .chars()
                        .next()
                        .map(char::is_whitespace)
                        .unwrap_or(true);
                if php_tag || tail.starts_with('=') {
                    break;
                }
            }
            idx += 1;
        }

        if idx > start {
            self.pos = idx;
            self.push(TokenKind::InlineHtml, start);
        }
        if self.pos >= self.bytes.len() {
            return Ok(());
        }

        let tag_start = self.pos;
        if self.rest().starts_with("<?=") {
            self.pos += 3;
            self.push(TokenKind::OpenTag, tag_start);
            let span = self.span(tag_start, self.pos);
            self.tokens.push(Token {
                kind: TokenKind::Ident("echo".to_owned()),
                span,
            });
        } else {
            self.pos += 5;
            self.push(TokenKind::OpenTag, tag_start);
            if self.peek(0) == Some(b'\r') && self.peek(1) == Some(b'\n') {
                self.pos += 2;
            } else if self.peek(0).is_some_and(|byte| byte.is_ascii_whitespace()) {
                self.pos += 1;
            }
        }
        Ok(())
    }

    fn lex_php(&mut self) -> Result<(), ScriptError> {
        while let Some(byte) = self.peek(0) {
            let start = self.pos;
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c => self.pos += 1,
                b'?' if self.peek(1) == Some(b'>') => {
                    self.pos += 2;
                    self.push(TokenKind::CloseTag, start);
                    if self.peek(0) == Some(b'\n') {
                        self.pos += 1;
                    } else if self.peek(0) == Some(b'\r') && self.peek(1) == Some(b'\n') {
                        self.pos += 2;
                    }
                    return Ok(());
                }
                b'#' if self.peek(1) != Some(b'[') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
                b'#' => {
                    return Err(self.error(start, ScriptErrorKind::UnsupportedSyntax("attributes")));
                }
                b'$' => self.lex_variable()?,
                b'\'' => self.lex_single_quoted()?,
                b'"' => self.lex_double_quoted()?,
                b'`' => {
                    return Err(self.error(
                        start,
                        ScriptErrorKind::UnsupportedSyntax("backtick operator"),
                    ));
                }
                b'<' if self.rest().starts_with("<<<") => self.lex_heredoc()?,
                b'0'..=b'9' => self.lex_number()?,
                b'.' if self.peek(1).is_some_and(|next| next.is_ascii_digit()) => {
                    self.lex_number()?
                }
                b'\\' if self.peek(1).is_some_and(is_ident_start) => self.lex_ident(),
                _ if is_ident_start(byte) => self.lex_ident(),
                _ => self.lex_punct()?,
            }
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while let Some(byte) = self.peek(0) {
            if byte == b'\n' || (byte == b'?' && self.peek(1) == Some(b'>')) {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        match self.source[self.pos + 2..].find("*/") {
            Some(end) => {
                self.pos += 2 + end + 2;
                Ok(())
            }
            None => Err(self.error(start, ScriptErrorKind::UnterminatedComment)),
        }
    }

    fn lex_variable(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        if !self.peek(1).is_some_and(is_ident_start) {
            return Err(self.error(
                start,
                ScriptErrorKind::UnsupportedSyntax("variable variables"),
            ));
        }
        self.pos += 1;
        let name = self.take_ident();
        self.push(TokenKind::Variable(name), start);
        Ok(())
    }

    fn lex_ident(&mut self) {
        let start = self.pos;
        let mut name = String::new();
        loop {
            if self.peek(0) == Some(b'\\') && self.peek(1).is_some_and(is_ident_start) {
                self.pos += 1;
                if !name.is_empty() {
                    name.push('\\');
                }
            }
            name.push_str(&self.take_ident());
            if !(self.peek(0) == Some(b'\\') && self.peek(1).is_some_and(is_ident_start)) {
                break;
            }
        }
        self.push(TokenKind::Ident(name), start);
    }

    fn take_ident(&mut self) -> String {
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.source[start..self.pos].to_owned()
    }

    fn lex_number(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        let radix = match (self.peek(0), self.peek(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => Some(16),
            (Some(b'0'), Some(b'b' | b'B')) => Some(2),
            (Some(b'0'), Some(b'o' | b'O')) => Some(8),
            _ => None,
        };

        if let Some(radix) = radix {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek(0)
                .is_some_and(|byte| byte == b'_' || (byte as char).is_digit(radix))
            {
                self.pos += 1;
            }
            let digits = self.source[digits_start..self.pos].replace('_', "");
            let kind = match i64::from_str_radix(&digits, radix) {
                Ok(value) => TokenKind::Int(value),
                Err(_) if digits.is_empty() => {
                    return Err(self.error(start, ScriptErrorKind::UnexpectedCharacter('0')));
                }
                Err(_) => TokenKind::Float(radix_to_float(&digits, radix)),
            };
            self.push(kind, start);
            return Ok(());
        }

        let mut is_float = false;
        while let Some(byte) = self.peek(0) {
            match byte {
                b'0'..=b'9' | b'_' => self.pos += 1,
                b'.' if !is_float && self.peek(1).is_none_or(|next| next != b'.') => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E'
                    if self.peek(1).is_some_and(|next| next.is_ascii_digit())
                        || (matches!(self.peek(1), Some(b'+' | b'-'))
                            && self.peek(2).is_some_and(|next| next.is_ascii_digit())) =>
                {
                    is_float = true;
                    self.pos += 2;
                }
                _ => break,
            }
        }

        let text = self.source[start..self.pos].replace('_', "");
        let kind = if is_float {
            TokenKind::Float(text.parse().unwrap_or(0.0))
        } else if text.len() > 1 && text.starts_with('0') {
            match i64::from_str_radix(&text[1..], 8) {
                Ok(value) => TokenKind::Int(value),
                Err(_) => TokenKind::Float(radix_to_float(&text[1..], 8)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => TokenKind::Int(value),
                Err(_) => TokenKind::Float(text.parse().unwrap_or(f64::INFINITY)),
            }
        };
        self.push(kind, start);
        Ok(())
    }

    fn lex_single_quoted(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(ch) = self.rest().chars().next() else {
                return Err(self.error(start, ScriptErrorKind::UnterminatedString));
            };
            self.pos += ch.len_utf8();
            match ch {
                '\'' => break,
                '\\' if matches!(self.peek(0), Some(b'\'' | b'\\')) => {
                    out.push(self.bytes[self.pos] as char);
                    self.pos += 1;
                }
                _ => out.push(ch),
            }
        }
        self.push(TokenKind::Str(vec![StrPart::Text(out)]), start);
        Ok(())
    }

    fn lex_double_quoted(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.pos += 1;
        let parts = self.lex_interpolated(start, Some('"'))?;
        self.push(TokenKind::Str(parts), start);
        Ok(())
    }

    /// Interpolated string body up to `closing`, or to the end of input when
    /// there is no closing character.
    fn lex_interpolated(
        &mut self,
        start: usize,
        closing: Option<char>,
    ) -> Result<Vec<StrPart>, ScriptError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let Some(ch) = self.rest().chars().next() else {
                if closing.is_some() {
                    return Err(self.error(start, ScriptErrorKind::UnterminatedString));
                }
                break;
            };
            match ch {
                _ if Some(ch) == closing => {
                    self.pos += 1;
                    break;
                }
                '\\' => {
                    self.pos += 1;
                    self.lex_escape(&mut text);
                }
                '$' if self.peek(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    flush_text(&mut parts, &mut text);
                    parts.push(StrPart::Var(self.take_ident()));
                }
                '$' if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    flush_text(&mut parts, &mut text);
                    parts.push(StrPart::Var(self.take_braced_name(start)?));
                }
                '{' if self.peek(1) == Some(b'$') => {
                    self.pos += 2;
                    flush_text(&mut parts, &mut text);
                    parts.push(StrPart::Var(self.take_braced_name(start)?));
                }
                _ => {
                    self.pos += ch.len_utf8();
                    text.push(ch);
                }
            }
        }
        flush_text(&mut parts, &mut text);
        if parts.is_empty() {
            parts.push(StrPart::Text(String::new()));
        }
        Ok(parts)
    }

    /// `<<<LABEL` heredoc or `<<<'LABEL'` nowdoc, with the closing label's
    /// indentation removed from every body line.
    fn lex_heredoc(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.pos += 3;
        while matches!(self.peek(0), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
        let quote = match self.peek(0) {
            Some(quote @ (b'\'' | b'"')) => {
                self.pos += 1;
                Some(quote)
            }
            _ => None,
        };
        let label = self.take_ident();
        if label.is_empty() {
            return Err(self.error(start, ScriptErrorKind::UnexpectedCharacter('<')));
        }
        if let Some(quote) = quote {
            if self.peek(0) != Some(quote) {
                return Err(self.error(start, ScriptErrorKind::UnterminatedString));
            }
            self.pos += 1;
        }
        match (self.peek(0), self.peek(1)) {
            (Some(b'\n'), _) => self.pos += 1,
            (Some(b'\r'), Some(b'\n')) => self.pos += 2,
            _ => return Err(self.error(start, ScriptErrorKind::UnterminatedString)),
        }

        let body_start = self.pos;
        let Some((close_line, indent)) = self.find_heredoc_end(body_start, &label) else {
            return Err(self.error(start, ScriptErrorKind::UnterminatedString));
        };
        let mut body_end = close_line;
        if body_end > body_start {
            body_end -= 1;
            if body_end > body_start && self.bytes[body_end - 1] == b'\r' {
                body_end -= 1;
            }
        }
        let body = dedent(&self.source[body_start..body_end], indent);
        let parts = if quote == Some(b'\'') {
            vec![StrPart::Text(body)]
        } else {
            Lexer::new(&body)
                .lex_interpolated(0, None)
                .map_err(|err| self.error(start, err.kind))?
        };

        self.pos = close_line + indent + label.len();
        self.push(TokenKind::Str(parts), start);
        Ok(())
    }

    /// Start of the closing line and its indentation width.
    fn find_heredoc_end(&self, from: usize, label: &str) -> Option<(usize, usize)> {
        let mut line_start = from;
        while line_start < self.bytes.len() {
            let line = &self.source[line_start..];
            let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
            let after = &line[indent..];
            if after.starts_with(label)
                && !after
                    .as_bytes()
                    .get(label.len())
                    .is_some_and(|byte| is_ident_char(*byte))
            {
                return Some((line_start, indent));
            }
            line_start += line.find('\n')? + 1;
        }
        None
    }

    fn take_braced_name(&mut self, string_start: usize) -> Result<String, ScriptError> {
        let name = self.take_ident();
        if name.is_empty() || self.peek(0) != Some(b'}') {
            return Err(self.error(
                string_start,
                ScriptErrorKind::UnsupportedSyntax("complex string interpolation"),
            ));
        }
        self.pos += 1;
        Ok(name)
    }

    fn lex_escape(&mut self, out: &mut String) {
        let Some(ch) = self.rest().chars().next() else {
            out.push('\\');
            return;
        };
        self.pos += ch.len_utf8();
        match ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'v' => out.push('\x0b'),
            'e' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            '\\' => out.push('\\'),
            '$' => out.push('$'),
            '"' => out.push('"'),
            '0'..='7' => {
                let mut value = ch.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek(0).and_then(|byte| (byte as char).to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from((value & 0xff) as u8));
            }
            'x' if self.peek(0).is_some_and(|byte| byte.is_ascii_hexdigit()) => {
                let mut value = 0u32;
                for _ in 0..2 {
                    match self.peek(0).and_then(|byte| (byte as char).to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from(value as u8));
            }
            'u' if self.peek(0) == Some(b'{') => {
                let close = self.rest().find('}');
                let decoded = close.and_then(|end| {
                    u32::from_str_radix(&self.rest()[1..end], 16)
                        .ok()
                        .and_then(char::from_u32)
                        .map(|decoded| (decoded, end))
                });
                match decoded {
                    Some((decoded, end)) => {
                        out.push(decoded);
                        self.pos += end + 1;
                    }
                    None => {
                        out.push('\\');
                        out.push('u');
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    fn lex_punct(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        let rest = self.rest();
        let matched = PUNCTUATION
            .iter()
            .chain(SINGLE_PUNCTUATION.iter())
            .find(|punct| rest.starts_with(**punct))
            .copied();
        let Some(punct) = matched else {
            let ch = rest.chars().next().unwrap_or('\0');
            return Err(self.error(start, ScriptErrorKind::UnexpectedCharacter(ch)));
        };
        self.pos += punct.len();
        self.push(TokenKind::Punct(punct), start);
        Ok(())
    }
}

fn flush_text(parts: &mut Vec<StrPart>, text: &mut String) {
    if !text.is_empty() {
        parts.push(StrPart::Text(std::mem::take(text)));
    }
}

fn dedent(body: &str, indent: usize) -> String {
    body.split('\n')
        .map(|line| {
            let strip = line
                .bytes()
                .take(indent)
                .take_while(|byte| matches!(byte, b' ' | b'\t'))
                .count();
            &line[strip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn radix_to_float(digits: &str, radix: u32) -> f64 {
    digits
        .chars()
        .filter_map(|ch| ch.to_digit(radix))
        .fold(0.0, |acc, digit| acc * radix as f64 + digit as f64)
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_ident_char(byte: u8) -> bool {
    is_ident_start(byte) || byte.is_ascii_digit()
}
