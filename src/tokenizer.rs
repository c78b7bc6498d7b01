//! Converts the text between `((` and `))` markers into a token stream
//! (spec.md §4.3).

use std::fmt;

use crate::error::{ParseError, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralToken {
    Bool(bool),
    Null,
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A bare, unquoted word: a path reference, or an operator name,
    /// possibly carrying a `@target`/`:target` suffix merged in (e.g.
    /// `vault@production`) per spec.md §4.3's greedy-longest-match rule.
    Word(String),
    Literal(LiteralToken),
    EnvVar(String),
    LParen,
    RParen,
    Pipe,
    Comma,
    At,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "{}", w),
            TokenKind::Literal(l) => write!(f, "{:?}", l),
            TokenKind::EnvVar(v) => write!(f, "${}", v),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Pipe => write!(f, "||"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::At => write!(f, "@"),
        }
    }
}

pub struct Tokenizer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '.' || c == '/'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | '[' | ']')
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Tokenizer { src, bytes: src.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    fn position(&self) -> Position {
        Position::new(self.pos, self.line, self.column)
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            let start = self.position();
            let Some(c) = self.peek_char() else { break };
            let kind = match c {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                '|' => {
                    self.advance();
                    if self.peek_char() == Some('|') {
                        self.advance();
                        TokenKind::Pipe
                    } else {
                        return Err(self.syntax_error("expected `||`", start));
                    }
                }
                '"' | '\'' => self.lex_quoted(c, start)?,
                '$' => self.lex_envvar(start)?,
                '-' | '0'..='9' => self.lex_number(start)?,
                '@' => {
                    self.advance();
                    TokenKind::At
                }
                _ if is_word_start(c) || c == '~' => self.lex_word(start)?,
                _ => return Err(self.syntax_error(&format!("unexpected character {:?}", c), start)),
            };
            out.push(Token { kind, pos: start });
        }
        Ok(out)
    }

    fn syntax_error(&self, message: &str, pos: Position) -> ParseError {
        ParseError::Expression {
            message: message.to_string(),
            pos_line: pos.line,
            pos_column: pos.column,
            snippet: caret_snippet(self.src, pos),
        }
    }

    fn lex_quoted(&mut self, quote: char, start: Position) -> Result<TokenKind, ParseError> {
        self.advance(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(self.syntax_error("unterminated string literal", start)),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('r') => s.push('\r'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some('\'') => s.push('\''),
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => return Err(self.syntax_error("unterminated escape sequence", start)),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(TokenKind::Literal(LiteralToken::String(s)))
    }

    fn lex_envvar(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        self.advance(); // consume '$'
        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.syntax_error("expected environment variable name after `$`", start));
        }
        Ok(TokenKind::EnvVar(name))
    }

    fn lex_number(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.pos;
        if self.peek_char() == Some('-') {
            self.advance();
            // A lone `-` (e.g. start of an identifier like `-foo`) is not
            // a number; fall back to a word.
            if !matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.pos = begin;
                return self.lex_word(start);
            }
        }
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.src[begin..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(|f| TokenKind::Literal(LiteralToken::Float(f)))
                .map_err(|_| self.syntax_error(&format!("invalid float literal {:?}", text), start))
        } else {
            text.parse::<i64>()
                .map(|i| TokenKind::Literal(LiteralToken::Int(i)))
                .map_err(|_| self.syntax_error(&format!("invalid integer literal {:?}", text), start))
        }
    }

    fn lex_word(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.pos;
        if self.peek_char() == Some('~') {
            self.advance();
            return Ok(TokenKind::Literal(LiteralToken::Null));
        }
        while let Some(c) = self.peek_char() {
            if is_word_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        // Greedy re-lex: `name@target` / `name:target` stay one token.
        while matches!(self.peek_char(), Some('@') | Some(':')) {
            self.advance();
            while let Some(c) = self.peek_char() {
                if is_word_char(c) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let text = &self.src[begin..self.pos];
        Ok(match text {
            "true" => TokenKind::Literal(LiteralToken::Bool(true)),
            "false" => TokenKind::Literal(LiteralToken::Bool(false)),
            "nil" | "null" => TokenKind::Literal(LiteralToken::Null),
            _ => TokenKind::Word(text.to_string()),
        })
    }
}

/// Render a source snippet with a caret pointing at `pos.column`, for
/// positioned parse-error reporting (spec.md §4.4). Delegates to the
/// teacher's `annotate-snippets` dependency rather than hand-formatting
/// the caret line, the same crate the teacher ships for diagnostic
/// rendering.
pub fn caret_snippet(src: &str, pos: Position) -> String {
    use annotate_snippets::display_list::{DisplayList, FormatOptions};
    use annotate_snippets::snippet::{AnnotationType, Slice, Snippet, SourceAnnotation};

    let line = src.lines().nth(pos.line.saturating_sub(1)).unwrap_or("");
    let col = pos.column.saturating_sub(1).min(line.len());
    let end = (col + 1).min(line.len()).max(col);
    let snippet = Snippet {
        title: None,
        footer: vec![],
        slices: vec![Slice {
            source: line,
            line_start: pos.line,
            origin: None,
            fold: false,
            annotations: vec![SourceAnnotation {
                label: "",
                annotation_type: AnnotationType::Error,
                range: (col, end),
            }],
        }],
        opt: FormatOptions { color: false, anonymized_line_numbers: false, margin: None },
    };
    DisplayList::from(snippet).to_string()
}

/// Matches the operator-call expression marker: a string whose trimmed
/// content is `(( ... ))`.
pub fn is_expression(s: &str) -> bool {
    let t = s.trim();
    t.starts_with("((") && t.ends_with("))") && t.len() >= 4
}

/// Extract the text between the `((`/`))` markers of an expression string.
pub fn expression_body(s: &str) -> &str {
    let t = s.trim();
    t[2..t.len() - 2].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Tokenizer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_grab_fallback() {
        let toks = kinds(r#"grab meta.domain || "default-domain""#);
        assert_eq!(
            toks,
            vec![
                TokenKind::Word("grab".into()),
                TokenKind::Word("meta.domain".into()),
                TokenKind::Pipe,
                TokenKind::Literal(LiteralToken::String("default-domain".into())),
            ]
        );
    }

    #[test]
    fn escaped_newline_in_string() {
        let toks = kinds(r#"concat test "a\nb""#);
        assert_eq!(
            toks,
            vec![
                TokenKind::Word("concat".into()),
                TokenKind::Word("test".into()),
                TokenKind::Literal(LiteralToken::String("a\nb".into())),
            ]
        );
    }

    #[test]
    fn null_keyword_variants() {
        assert_eq!(kinds("~"), vec![TokenKind::Literal(LiteralToken::Null)]);
        assert_eq!(kinds("null"), vec![TokenKind::Literal(LiteralToken::Null)]);
        // Non-matching casing is a plain reference, not a literal.
        assert_eq!(kinds("Null"), vec![TokenKind::Word("Null".into())]);
    }

    #[test]
    fn targeted_operator_merges_at_target() {
        assert_eq!(kinds("vault@production"), vec![TokenKind::Word("vault@production".into())]);
    }

    #[test]
    fn expression_markers_detected() {
        assert!(is_expression("(( grab foo ))"));
        assert!(!is_expression("not an expr"));
        assert_eq!(expression_body("(( grab foo ))"), "grab foo");
    }
}
