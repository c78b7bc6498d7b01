//! Recursive-descent parser: tokens -> [`Expr`] AST (spec.md §4.4).

use crate::cursor::Cursor;
use crate::error::{ParseError, Position};
use crate::tokenizer::{caret_snippet, LiteralToken, Token, TokenKind, Tokenizer};
use crate::value::Value;

/// A parsed expression node (spec.md §3 `Expr`).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Reference(Cursor),
    EnvVar(String),
    OperatorCall(String, Vec<Expr>),
    LogicalOr(Box<Expr>, Box<Expr>),
}

/// Splits a possibly-targeted operator word (`vault@production`,
/// `vault:production`) into its base name and optional target.
pub fn split_operator_target(word: &str) -> (&str, Option<&str>) {
    if let Some(idx) = word.find(|c| c == '@' || c == ':') {
        (&word[..idx], Some(&word[idx + 1..]))
    } else {
        (word, None)
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    src: &'a str,
    pos: usize,
    is_operator: &'a dyn Fn(&str) -> bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, message: &str, token: Option<&Token>) -> ParseError {
        self.error_at(message, token.map(|t| t.pos).unwrap_or_default())
    }

    fn error_at(&self, message: &str, pos: Position) -> ParseError {
        ParseError::Expression {
            message: message.to_string(),
            pos_line: pos.line,
            pos_column: pos.column,
            snippet: caret_snippet(self.src, pos),
        }
    }

    /// expr := primary ( '||' primary )*
    fn parse_expr(&mut self, allow_ws_call: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary(allow_ws_call)?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Pipe)) {
            self.advance();
            let right = self.parse_primary(allow_ws_call)?;
            left = Expr::LogicalOr(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self, allow_ws_call: bool) -> Result<Expr, ParseError> {
        let tok = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression", None))?;
        let pos = tok.pos;
        match tok.kind {
            TokenKind::Literal(lit) => {
                self.advance();
                Ok(Expr::Literal(literal_to_value(lit)))
            }
            TokenKind::EnvVar(name) => {
                self.advance();
                Ok(Expr::EnvVar(name))
            }
            TokenKind::Word(word) => {
                self.advance();
                let (base, _target) = split_operator_target(&word);
                let is_op = (self.is_operator)(base);
                if is_op && matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    self.advance(); // consume '('
                    let args = self.parse_arglist(true)?;
                    self.expect_rparen()?;
                    Ok(Expr::OperatorCall(word, args))
                } else if is_op && allow_ws_call && self.peek().is_some() {
                    let args = self.parse_arglist(false)?;
                    Ok(Expr::OperatorCall(word, args))
                } else {
                    Ok(Expr::Reference(Cursor::parse(&word)))
                }
            }
            TokenKind::LParen => Err(self.error_at(
                "unexpected `(`: nested calls must be written as `operator(args)`",
                pos,
            )),
            other => Err(self.error_at(&format!("unexpected token `{}`", other), pos)),
        }
    }

    /// arglist := expr ( ',' expr )*  (comma optional; whitespace alone
    /// separates arguments per spec.md §4.4).
    fn parse_arglist(&mut self, paren_form: bool) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        loop {
            let done = if paren_form {
                matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen) | None)
            } else {
                self.peek().is_none()
            };
            if done {
                break;
            }
            args.push(self.parse_expr(false)?);
            // A comma is consumed if present; whitespace alone (no token
            // emitted for it) already separates the next argument.
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                self.advance();
            }
        }
        Ok(args)
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        match self.advance().map(|t| t.kind.clone()) {
            Some(TokenKind::RParen) => Ok(()),
            other => Err(self.error(
                &format!("expected `)`, found {:?}", other),
                self.tokens.get(self.pos.saturating_sub(1)),
            )),
        }
    }
}

fn literal_to_value(lit: LiteralToken) -> Value {
    match lit {
        LiteralToken::Bool(b) => Value::Bool(b),
        LiteralToken::Null => Value::Null,
        LiteralToken::Int(i) => Value::Int(i),
        LiteralToken::Float(f) => Value::Float(f),
        LiteralToken::String(s) => Value::String(s),
    }
}

/// Parse the text between `((`/`))` markers into an [`Expr`].
///
/// `is_operator` tells the parser whether a bare word names a registered
/// operator (spec.md §4.3: "any identifier whose name is a registered
/// operator"); the outermost expression is allowed to use the
/// whitespace-argument call form (`grab a b`), nested call arguments are
/// not (they must write `operator(args)` so the parser can tell where
/// their own argument list ends).
pub fn parse_expression(body: &str, is_operator: &dyn Fn(&str) -> bool) -> Result<Expr, ParseError> {
    let tokens = Tokenizer::new(body).tokenize()?;
    let mut parser = Parser { tokens, src: body, pos: 0, is_operator };
    let expr = parser.parse_expr(true)?;
    if let Some(tok) = parser.peek() {
        return Err(parser.error(&format!("unexpected trailing token `{}`", tok.kind), Some(tok)));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(names: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |n: &str| names.contains(&n)
    }

    #[test]
    fn grab_with_fallback_literal() {
        let is_op = ops(&["grab"]);
        let expr = parse_expression(r#"grab meta.domain || "default-domain""#, &is_op).unwrap();
        match expr {
            Expr::OperatorCall(name, args) => {
                assert_eq!(name, "grab");
                assert_eq!(args.len(), 1);
                match &args[0] {
                    Expr::LogicalOr(l, r) => {
                        assert_eq!(**l, Expr::Reference(Cursor::parse("meta.domain")));
                        assert_eq!(**r, Expr::Literal(Value::String("default-domain".into())));
                    }
                    other => panic!("expected LogicalOr, got {:?}", other),
                }
            }
            other => panic!("expected OperatorCall, got {:?}", other),
        }
    }

    #[test]
    fn nested_call_requires_parens() {
        let is_op = ops(&["concat", "grab"]);
        let expr = parse_expression(r#"concat meta.name "-" grab(meta.suffix)"#, &is_op).unwrap();
        match expr {
            Expr::OperatorCall(name, args) => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[2], Expr::OperatorCall(ref n, _) if n == "grab"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bare_reference_without_operator() {
        let is_op = ops(&[]);
        let expr = parse_expression("meta.foo", &is_op).unwrap();
        assert_eq!(expr, Expr::Reference(Cursor::parse("meta.foo")));
    }
}
