//! S-expression reader for recipe files.
//!
//! Parses input like:
//! ```lisp
//! ; comment
//! (formula "magnum-bindings"
//!   (depends-on "pybind11" build)
//!   (install (run "cmake" "--build" ".")))
//! ```
//!
//! Exactly one top-level expression is accepted; anything after it other
//! than whitespace and comments is an error.

use crate::ast::Expr;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character '{ch}' at line {line}, column {col}")]
    UnexpectedChar { ch: char, line: usize, col: usize },
    #[error("unclosed string starting at line {line}")]
    UnclosedString { line: usize },
    #[error("unclosed list starting at line {line}")]
    UnclosedList { line: usize },
    #[error("trailing input at line {line}, column {col}")]
    TrailingInput { line: usize, col: usize },
}

/// Parse a single S-expression document.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut reader = Reader::new(input);
    let expr = reader.expr()?;
    reader.skip_whitespace_and_comments();
    if reader.peek().is_some() {
        return Err(ParseError::TrailingInput {
            line: reader.line,
            col: reader.col,
        });
    }
    Ok(expr)
}

struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace_and_comments();

        match self.peek() {
            None => Err(ParseError::UnexpectedEof),
            Some('(') => self.list(),
            Some('"') => self.string(),
            Some(')') => Err(ParseError::UnexpectedChar {
                ch: ')',
                line: self.line,
                col: self.col,
            }),
            Some(_) => self.atom(),
        }
    }

    fn list(&mut self) -> Result<Expr, ParseError> {
        let line = self.line;
        self.bump(); // '('
        let mut items = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                None => return Err(ParseError::UnclosedList { line }),
                Some(')') => {
                    self.bump();
                    return Ok(Expr::List(items));
                }
                Some(_) => items.push(self.expr()?),
            }
        }
    }

    fn string(&mut self) -> Result<Expr, ParseError> {
        let line = self.line;
        self.bump(); // opening '"'
        let mut s = String::new();

        loop {
            match self.bump() {
                None => return Err(ParseError::UnclosedString { line }),
                Some('"') => return Ok(Expr::Atom(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(c) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => return Err(ParseError::UnclosedString { line }),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let mut s = String::new();

        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                break;
            }
            s.push(c);
            self.bump();
        }

        if s.is_empty() {
            Err(ParseError::UnexpectedChar {
                ch: self.peek().unwrap_or(' '),
                line: self.line,
                col: self.col,
            })
        } else {
            Ok(Expr::Atom(s))
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            if self.peek() == Some(';') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }
}
