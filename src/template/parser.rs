//! Recursive-descent parser for template expressions
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, equality, comparison, `+`,
//! unary (`!`, `-`), postfix (`.name`, `[index]`, calls).

use crate::error::EvalErrorKind;
use crate::template::lexer::{tokenize, Spanned, Token};
use crate::template::value::Value;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
}

/// Parse a complete expression
pub fn parse_expression(source: &str, base: usize) -> Result<Expr, EvalErrorKind> {
    let tokens = tokenize(source, base)?;
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.ternary()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {:?} after expression", other))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

type ParseResult<T> = Result<T, EvalErrorKind>;

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.index)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.position)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> ParseResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, detail: String) -> EvalErrorKind {
        EvalErrorKind::SyntaxError {
            position: self.position(),
            detail,
        }
    }

    fn ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.ternary()?;
        self.expect(Token::Colon, "':' in conditional expression")?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        while self.eat(&Token::Plus) {
            let right = self.unary()?;
            left = Expr::Binary(BinaryOp::Add, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Token::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                    _ => return Err(self.error("expected a name after '.'".to_string())),
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(Token::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let position = self.position();
        match self.advance() {
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Unset)),
                _ if self.eat(&Token::LParen) => {
                    let args = self.arguments(Token::RParen, "')'")?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Ident(name)),
            },
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.arguments(Token::RBracket, "']'")?)),
            Token::Eof => Err(EvalErrorKind::SyntaxError {
                position,
                detail: "unexpected end of expression".to_string(),
            }),
            other => Err(EvalErrorKind::SyntaxError {
                position,
                detail: format!("unexpected {:?}", other),
            }),
        }
    }

    /// Comma-separated expressions up to `close`
    fn arguments(&mut self, close: Token, what: &str) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.ternary()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("a || b && c == d", 0).unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Or,
                ident("a"),
                Box::new(Expr::Binary(
                    BinaryOp::And,
                    ident("b"),
                    Box::new(Expr::Binary(BinaryOp::Eq, ident("c"), ident("d"))),
                )),
            )
        );
    }

    #[test]
    fn test_call_member_and_index() {
        let expr = parse_expression("f(parameters.shell, xs[0])", 0).unwrap();
        assert_eq!(
            expr,
            Expr::Call(
                "f".to_string(),
                vec![
                    Expr::Member(ident("parameters"), "shell".to_string()),
                    Expr::Index(ident("xs"), Box::new(Expr::Literal(Value::Int(0)))),
                ]
            )
        );
    }

    #[test]
    fn test_nested_ternary() {
        let expr = parse_expression("a ? 'x' : b ? 'y' : 'z'", 0).unwrap();
        assert!(matches!(expr, Expr::Ternary(_, _, ref otherwise) if matches!(**otherwise, Expr::Ternary(..))));
    }

    #[test]
    fn test_list_literal() {
        let expr = parse_expression("['a', file]", 0).unwrap();
        assert_eq!(
            expr,
            Expr::List(vec![
                Expr::Literal(Value::from("a")),
                Expr::Ident("file".to_string())
            ])
        );
    }

    #[test]
    fn test_trailing_tokens() {
        assert!(matches!(
            parse_expression("a b", 0),
            Err(EvalErrorKind::SyntaxError { position: 2, .. })
        ));
    }

    #[test]
    fn test_missing_operand() {
        assert!(matches!(
            parse_expression("a ==", 3),
            Err(EvalErrorKind::SyntaxError { position: 7, .. })
        ));
        assert!(parse_expression("f(a,", 0).is_err());
        assert!(parse_expression("", 0).is_err());
    }
}
