//! Syntax kinds and lexer for module files.
//!
//! Module files are written in a small subset of Starlark. The lexer is
//! lossless: every byte of the input ends up in exactly one token, including
//! whitespace and comments, so the tree built by [`crate::parser`] can be
//! printed back without changes.
//!
//! Newlines are only significant outside of brackets. Inside `(`, `[` or `{`
//! they are lexed as [`SyntaxKind::WHITESPACE`], which lets the parser treat
//! multi-line calls the same way as single-line ones.

use rowan::{TextRange, TextSize};

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum SyntaxKind {
    // Trivia
    WHITESPACE = 0,
    COMMENT,

    // Tokens
    NEWLINE,
    IDENT,
    STRING,
    NUMBER,
    L_PAREN,
    R_PAREN,
    L_BRACK,
    R_BRACK,
    L_BRACE,
    R_BRACE,
    COMMA,
    DOT,
    COLON,
    SEMICOLON,
    EQ,
    AUG_ASSIGN,
    OPERATOR,
    ERROR_TOKEN,
    EOF,

    // Nodes
    NODE_NAME,
    NODE_LITERAL,
    NODE_CALL,
    NODE_ARG_LIST,
    NODE_ARG,
    NODE_KEYWORD_ARG,
    NODE_STAR_ARG,
    NODE_ATTR,
    NODE_INDEX,
    NODE_LIST,
    NODE_DICT,
    NODE_DICT_ENTRY,
    NODE_TUPLE,
    NODE_PAREN,
    NODE_COMPREHENSION,
    NODE_UNARY,
    NODE_BINARY,
    NODE_CONDITIONAL,
    NODE_EXPR_STMT,
    NODE_ASSIGN_STMT,
    NODE_ERROR,
    NODE_ROOT,
}

use SyntaxKind::*;

const ALL_KINDS: [SyntaxKind; NODE_ROOT as usize + 1] = [
    WHITESPACE,
    COMMENT,
    NEWLINE,
    IDENT,
    STRING,
    NUMBER,
    L_PAREN,
    R_PAREN,
    L_BRACK,
    R_BRACK,
    L_BRACE,
    R_BRACE,
    COMMA,
    DOT,
    COLON,
    SEMICOLON,
    EQ,
    AUG_ASSIGN,
    OPERATOR,
    ERROR_TOKEN,
    EOF,
    NODE_NAME,
    NODE_LITERAL,
    NODE_CALL,
    NODE_ARG_LIST,
    NODE_ARG,
    NODE_KEYWORD_ARG,
    NODE_STAR_ARG,
    NODE_ATTR,
    NODE_INDEX,
    NODE_LIST,
    NODE_DICT,
    NODE_DICT_ENTRY,
    NODE_TUPLE,
    NODE_PAREN,
    NODE_COMPREHENSION,
    NODE_UNARY,
    NODE_BINARY,
    NODE_CONDITIONAL,
    NODE_EXPR_STMT,
    NODE_ASSIGN_STMT,
    NODE_ERROR,
    NODE_ROOT,
];

impl SyntaxKind {
    /// Whitespace and comments: kept in the tree but skipped by the parser.
    pub fn is_trivia(self) -> bool {
        matches!(self, WHITESPACE | COMMENT)
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum StarlarkLanguage {}

impl rowan::Language for StarlarkLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> SyntaxKind {
        ALL_KINDS
            .get(raw.0 as usize)
            .copied()
            .unwrap_or(NODE_ERROR)
    }

    fn kind_to_raw(kind: SyntaxKind) -> rowan::SyntaxKind {
        kind.into()
    }
}

pub type SyntaxNode = rowan::SyntaxNode<StarlarkLanguage>;

/// A syntax error with its location in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub range: TextRange,
    /// Line number, 1-indexed.
    pub line: usize,
    /// Column number, 1-indexed.
    pub column: usize,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl SyntaxError {
    pub(crate) fn new(source: &str, message: impl Into<String>, range: TextRange) -> Self {
        let (line, column) = offset_to_line_col(source, range.start().into());
        Self {
            message: message.into(),
            range,
            line,
            column,
        }
    }
}

/// Converts a byte offset into a 1-indexed `(line, column)` pair.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: SyntaxKind,
    pub text: &'a str,
    pub offset: usize,
}

impl Token<'_> {
    pub fn range(&self) -> TextRange {
        let start = TextSize::from(self.offset as u32);
        TextRange::at(start, TextSize::of(self.text))
    }
}

/// Splits `source` into tokens. Lexical problems (unterminated strings,
/// stray characters) are reported in the returned error list; the tokens
/// still cover the whole input.
pub fn tokenize(source: &str) -> (Vec<Token<'_>>, Vec<SyntaxError>) {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        depth: 0,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.errors)
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    tokens: Vec<Token<'a>>,
    errors: Vec<SyntaxError>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let kind = self.next_kind();
            debug_assert!(self.pos > start, "lexer must make progress");
            self.tokens.push(Token {
                kind,
                text: &self.source[start..self.pos],
                offset: start,
            });
        }
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, n: usize) -> u8 {
        self.bytes.get(self.pos + n).copied().unwrap_or(0)
    }

    fn error(&mut self, start: usize, message: &str) {
        let range = TextRange::new((start as u32).into(), (self.pos as u32).into());
        self.errors
            .push(SyntaxError::new(self.source, message, range));
    }

    fn next_kind(&mut self) -> SyntaxKind {
        let start = self.pos;
        let c = self.peek();
        match c {
            b' ' | b'\t' | b'\r' | b'\x0c' => {
                while matches!(self.peek(), b' ' | b'\t' | b'\r' | b'\x0c') {
                    self.pos += 1;
                }
                WHITESPACE
            }
            b'\\' if self.peek_at(1) == b'\n' => {
                self.pos += 2;
                WHITESPACE
            }
            b'\\' if self.peek_at(1) == b'\r' && self.peek_at(2) == b'\n' => {
                self.pos += 3;
                WHITESPACE
            }
            b'\n' => {
                self.pos += 1;
                if self.depth > 0 { WHITESPACE } else { NEWLINE }
            }
            b'#' => {
                while self.pos < self.bytes.len() && self.peek() != b'\n' {
                    self.pos += 1;
                }
                COMMENT
            }
            b'"' | b'\'' => self.string(start),
            b'0'..=b'9' => {
                self.number();
                NUMBER
            }
            b'.' if self.peek_at(1).is_ascii_digit() => {
                self.number();
                NUMBER
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while self.peek() == b'_' || self.peek().is_ascii_alphanumeric() {
                    self.pos += 1;
                }
                let word = &self.source[start..self.pos];
                let is_prefix = matches!(
                    word,
                    "r" | "R" | "b" | "B" | "rb" | "rB" | "Rb" | "RB" | "br" | "bR" | "Br" | "BR"
                );
                if is_prefix && matches!(self.peek(), b'"' | b'\'') {
                    self.string(start)
                } else {
                    IDENT
                }
            }
            b'(' | b'[' | b'{' => {
                self.pos += 1;
                self.depth += 1;
                match c {
                    b'(' => L_PAREN,
                    b'[' => L_BRACK,
                    _ => L_BRACE,
                }
            }
            b')' | b']' | b'}' => {
                self.pos += 1;
                self.depth = self.depth.saturating_sub(1);
                match c {
                    b')' => R_PAREN,
                    b']' => R_BRACK,
                    _ => R_BRACE,
                }
            }
            b',' => {
                self.pos += 1;
                COMMA
            }
            b'.' => {
                self.pos += 1;
                DOT
            }
            b':' => {
                self.pos += 1;
                COLON
            }
            b';' => {
                self.pos += 1;
                SEMICOLON
            }
            b'=' => {
                self.pos += 1;
                if self.peek() == b'=' {
                    self.pos += 1;
                    OPERATOR
                } else {
                    EQ
                }
            }
            b'!' if self.peek_at(1) == b'=' => {
                self.pos += 2;
                OPERATOR
            }
            b'<' | b'>' => {
                self.pos += 1;
                if self.peek() == c {
                    // << and >>, possibly augmented
                    self.pos += 1;
                    if self.peek() == b'=' {
                        self.pos += 1;
                        return AUG_ASSIGN;
                    }
                } else if self.peek() == b'=' {
                    self.pos += 1;
                }
                OPERATOR
            }
            b'*' | b'/' => {
                self.pos += 1;
                if self.peek() == c {
                    self.pos += 1;
                }
                if self.peek() == b'=' && &self.source[start..self.pos] != "**" {
                    self.pos += 1;
                    return AUG_ASSIGN;
                }
                OPERATOR
            }
            b'+' | b'-' | b'%' | b'|' | b'&' | b'^' => {
                self.pos += 1;
                if self.peek() == b'=' {
                    self.pos += 1;
                    return AUG_ASSIGN;
                }
                OPERATOR
            }
            b'~' => {
                self.pos += 1;
                OPERATOR
            }
            _ => {
                // Consume a whole UTF-8 scalar so token texts stay on char boundaries.
                let len = self.source[start..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
                self.pos += len;
                self.error(start, "unexpected character");
                ERROR_TOKEN
            }
        }
    }

    fn number(&mut self) {
        while self.peek() == b'_' || self.peek() == b'.' || self.peek().is_ascii_alphanumeric() {
            let c = self.peek();
            self.pos += 1;
            // exponent sign, e.g. 1e-3
            if matches!(c, b'e' | b'E') && matches!(self.peek(), b'+' | b'-') {
                self.pos += 1;
            }
        }
    }

    /// Lexes a string literal whose prefix (if any) starts at `start` and
    /// whose opening quote is at the current position.
    fn string(&mut self, start: usize) -> SyntaxKind {
        let quote = self.peek();
        let triple = self.peek_at(1) == quote && self.peek_at(2) == quote;
        self.pos += if triple { 3 } else { 1 };

        loop {
            if self.pos >= self.bytes.len() {
                self.error(start, "unterminated string literal");
                return STRING;
            }
            let c = self.peek();
            if c == b'\\' {
                self.pos = (self.pos + 2).min(self.bytes.len());
                continue;
            }
            if c == b'\n' && !triple {
                self.error(start, "unterminated string literal");
                return STRING;
            }
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return STRING;
                }
                if self.peek_at(1) == quote && self.peek_at(2) == quote {
                    self.pos += 3;
                    return STRING;
                }
            }
            self.pos += 1;
        }
    }
}

/// Decodes the value of a string literal token, including its prefix and
/// quotes. Returns `None` for byte strings, which never name repositories.
pub fn string_value(text: &str) -> Option<String> {
    let prefix_len = text.find(['"', '\'']).unwrap_or(text.len());
    let prefix = text[..prefix_len].to_ascii_lowercase();
    if prefix.contains('b') {
        return None;
    }
    let raw = prefix.contains('r');
    let body = &text[prefix_len..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    if body.len() < 2 * quote_len {
        return None;
    }
    let inner = &body[quote_len..body.len() - quote_len];
    if raw {
        return Some(inner.to_string());
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                out.extend(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32));
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                out.extend(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32));
            }
            Some('U') => {
                let hex: String = chars.by_ref().take(8).collect();
                out.extend(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32));
            }
            Some(d @ '0'..='7') => {
                let mut digits = String::from(d);
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(&n @ '0'..='7') => {
                            digits.push(n);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                out.extend(u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32));
            }
            // Unknown escapes are kept as written.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

/// Renders `value` as a double-quoted string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
