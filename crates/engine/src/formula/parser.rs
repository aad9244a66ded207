// Formula parser - tokenizes "="-prefixed expression text and drives an
// ExprBuilder with events in postfix order.
// Supports: numbers, cell refs (A1, $A$1), ranges (A1:B5), functions,
// basic math (+, -, *, /, ^), comparisons (<, <=, >, >=, =, <>), string
// literals with "" as an escaped quote.
//
// Precedence, loosest to tightest: comparisons; + -; * /; unary -; ^
// (right-associative). Unary minus binds looser than ^, so "=-A1^2"
// negates the square.

use crate::error::ParseError;

use super::builder::ExprBuilder;

/// Parse a formula and stream it into `builder` in postfix order.
///
/// The text must start with `=` (surrounding whitespace is tolerated) and
/// contain exactly one expression.
pub fn parse_expression<B: ExprBuilder>(formula: &str, builder: &mut B) -> Result<(), ParseError> {
    let body = formula
        .trim()
        .strip_prefix('=')
        .ok_or(ParseError::MissingEquals)?;
    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(ParseError::EmptyFormula);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        builder,
    };
    parser.comparison()?;
    if parser.pos != parser.tokens.len() {
        return Err(ParseError::TrailingInput);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    /// Cell reference text, `$` markers included.
    CellRef(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Colon,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '^' => {
                tokens.push(Token::Caret);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            ':' => {
                tokens.push(Token::Colon);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            '=' => {
                tokens.push(Token::Eq);
                chars.next();
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        tokens.push(Token::Le);
                        chars.next();
                    }
                    Some('>') => {
                        tokens.push(Token::Ne);
                        chars.next();
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    tokens.push(Token::Ge);
                    chars.next();
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            // A doubled quote stays in the literal.
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                s.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(ch) => s.push(ch),
                        None => return Err(ParseError::UnterminatedString),
                    }
                }
                tokens.push(Token::StringLit(s));
            }
            c if c.is_ascii_digit() || c == '.' => {
                tokens.push(number_token(&mut chars)?);
            }
            c if c == '$' || c.is_ascii_alphabetic() => {
                tokens.push(name_token(&mut chars)?);
            }
            other => return Err(ParseError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

/// Read a numeric literal: digits and dots, then an optional exponent
/// (`3e1`, `5e+1`).
fn number_token(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Token, ParseError> {
    let mut text = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_digit() || ch == '.' {
            text.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    if matches!(chars.peek(), Some('e') | Some('E')) {
        text.push('e');
        chars.next();
        if matches!(chars.peek(), Some('+') | Some('-')) {
            text.push(chars.next().ok_or(ParseError::UnexpectedEnd)?);
        }
        let mut exponent_digits = 0;
        while let Some(&ch) = chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                chars.next();
                exponent_digits += 1;
            } else {
                break;
            }
        }
        if exponent_digits == 0 {
            return Err(ParseError::BadNumber(text));
        }
    }
    match text.parse::<f64>() {
        Ok(n) => Ok(Token::Number(n)),
        Err(_) => Err(ParseError::BadNumber(text)),
    }
}

/// Read a cell reference (`A1`, `$A$1`) or an identifier (`sum`). Letters
/// followed by digits make a reference; bare letters an identifier; a `$`
/// demands the full reference shape.
fn name_token(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Token, ParseError> {
    let mut text = String::new();
    let dollar_col = chars.peek() == Some(&'$');
    if dollar_col {
        text.push('$');
        chars.next();
    }

    let mut letters = 0;
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_alphabetic() {
            text.push(ch);
            letters += 1;
            chars.next();
        } else {
            break;
        }
    }
    if letters == 0 {
        return Err(ParseError::UnexpectedChar('$'));
    }

    let dollar_row = chars.peek() == Some(&'$');
    if dollar_row {
        text.push('$');
        chars.next();
    }

    let mut digits = 0;
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_digit() {
            text.push(ch);
            digits += 1;
            chars.next();
        } else {
            break;
        }
    }

    if digits > 0 {
        Ok(Token::CellRef(text))
    } else if dollar_col || dollar_row {
        Err(crate::error::BadReference(text).into())
    } else {
        Ok(Token::Ident(text))
    }
}

struct Parser<'a, B: ExprBuilder> {
    tokens: Vec<Token>,
    pos: usize,
    builder: &'a mut B,
}

impl<'a, B: ExprBuilder> Parser<'a, B> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn comparison(&mut self) -> Result<(), ParseError> {
        self.additive()?;
        while let Some(token) = self.peek() {
            let emit: fn(&mut B) = match token {
                Token::Eq => B::op_eq,
                Token::Ne => B::op_ne,
                Token::Lt => B::op_lt,
                Token::Le => B::op_le,
                Token::Gt => B::op_gt,
                Token::Ge => B::op_ge,
                _ => break,
            };
            self.pos += 1;
            self.additive()?;
            emit(self.builder);
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<(), ParseError> {
        self.term()?;
        while let Some(token) = self.peek() {
            let emit: fn(&mut B) = match token {
                Token::Plus => B::op_add,
                Token::Minus => B::op_sub,
                _ => break,
            };
            self.pos += 1;
            self.term()?;
            emit(self.builder);
        }
        Ok(())
    }

    fn term(&mut self) -> Result<(), ParseError> {
        self.unary()?;
        while let Some(token) = self.peek() {
            let emit: fn(&mut B) = match token {
                Token::Star => B::op_mul,
                Token::Slash => B::op_div,
                _ => break,
            };
            self.pos += 1;
            self.unary()?;
            emit(self.builder);
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), ParseError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            self.unary()?;
            self.builder.op_neg();
            Ok(())
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<(), ParseError> {
        self.atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            // Right-associative; the exponent may itself be negated.
            self.unary()?;
            self.builder.op_pow();
        }
        Ok(())
    }

    fn atom(&mut self) -> Result<(), ParseError> {
        match self.bump() {
            Some(Token::Number(n)) => {
                self.builder.val_number(n);
                Ok(())
            }
            Some(Token::StringLit(s)) => {
                self.builder.val_string(s);
                Ok(())
            }
            Some(Token::CellRef(start)) => {
                if self.peek() == Some(&Token::Colon) {
                    self.pos += 1;
                    match self.bump() {
                        Some(Token::CellRef(end)) => {
                            self.builder.val_range(&format!("{}:{}", start, end));
                            Ok(())
                        }
                        Some(token) => Err(ParseError::UnexpectedToken(format!("{:?}", token))),
                        None => Err(ParseError::UnexpectedEnd),
                    }
                } else {
                    self.builder.val_reference(&start);
                    Ok(())
                }
            }
            Some(Token::Ident(name)) => self.call(name),
            Some(Token::LParen) => {
                self.comparison()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(()),
                    Some(token) => Err(ParseError::UnexpectedToken(format!("{:?}", token))),
                    None => Err(ParseError::UnexpectedEnd),
                }
            }
            Some(token) => Err(ParseError::UnexpectedToken(format!("{:?}", token))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    /// `name(arg, ...)`; the argument count becomes the event's arity.
    fn call(&mut self, name: String) -> Result<(), ParseError> {
        match self.bump() {
            Some(Token::LParen) => {}
            Some(token) => return Err(ParseError::UnexpectedToken(format!("{:?}", token))),
            None => return Err(ParseError::UnexpectedEnd),
        }

        let mut argc = 0;
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                self.comparison()?;
                argc += 1;
                match self.bump() {
                    Some(Token::Comma) => {}
                    Some(Token::RParen) => break,
                    Some(token) => return Err(ParseError::UnexpectedToken(format!("{:?}", token))),
                    None => return Err(ParseError::UnexpectedEnd),
                }
            }
        }
        self.builder.func_call(&name, argc);
        Ok(())
    }
}
