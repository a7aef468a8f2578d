//! Tokenizer for template expressions

use crate::error::EvalErrorKind;

/// Expression token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Str(String),
    Int(i64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

/// A token and its byte offset in the template
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Split an expression into tokens
///
/// `base` is the offset of the expression inside its template, so positions
/// in errors point into the template text.
pub fn tokenize(source: &str, base: usize) -> Result<Vec<Spanned>, EvalErrorKind> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let position = base + offset;
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (ch, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('!', _) => (Token::Bang, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('"', _) | ('\'', _) => {
                let (text, consumed) = read_string(&chars[i..], ch, position)?;
                tokens.push(Spanned {
                    token: Token::Str(text),
                    position,
                });
                i += consumed;
                continue;
            }
            (c, _) if c.is_ascii_digit() => {
                let end = chars[i..]
                    .iter()
                    .position(|(_, c)| !c.is_ascii_digit())
                    .map_or(chars.len(), |n| i + n);
                let digits: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let value = digits.parse().map_err(|_| EvalErrorKind::SyntaxError {
                    position,
                    detail: format!("integer '{}' is out of range", digits),
                })?;
                tokens.push(Spanned {
                    token: Token::Int(value),
                    position,
                });
                i = end;
                continue;
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let end = chars[i..]
                    .iter()
                    .position(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
                    .map_or(chars.len(), |n| i + n);
                let ident: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                tokens.push(Spanned {
                    token: Token::Ident(ident),
                    position,
                });
                i = end;
                continue;
            }
            (c, _) => {
                return Err(EvalErrorKind::SyntaxError {
                    position,
                    detail: format!("unexpected character '{}'", c),
                })
            }
        };

        tokens.push(Spanned { token, position });
        i += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        position: base + source.len(),
    });
    Ok(tokens)
}

/// Read a quoted string starting at `chars[0]`; returns the text and chars consumed
fn read_string(
    chars: &[(usize, char)],
    quote: char,
    position: usize,
) -> Result<(String, usize), EvalErrorKind> {
    let mut text = String::new();
    let mut i = 1;

    while i < chars.len() {
        let ch = chars[i].1;
        if ch == quote {
            return Ok((text, i + 1));
        }
        if ch == '\\' {
            let escaped = chars.get(i + 1).map(|(_, c)| *c);
            match escaped {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(c) => text.push(c),
                None => break,
            }
            i += 2;
            continue;
        }
        text.push(ch);
        i += 1;
    }

    Err(EvalErrorKind::SyntaxError {
        position,
        detail: "unterminated string literal".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source, 0)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a == b && !c || d != 1"),
            vec![
                Token::Ident("a".into()),
                Token::EqEq,
                Token::Ident("b".into()),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("c".into()),
                Token::OrOr,
                Token::Ident("d".into()),
                Token::NotEq,
                Token::Int(1),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\"b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string_position() {
        let err = tokenize("x + 'abc", 10).unwrap_err();
        assert_eq!(
            err,
            EvalErrorKind::SyntaxError {
                position: 14,
                detail: "unterminated string literal".to_string()
            }
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(
            tokenize("a # b", 0),
            Err(EvalErrorKind::SyntaxError { position: 2, .. })
        ));
    }
}
