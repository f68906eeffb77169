//! Syntax tree for recipe S-expressions.

use std::fmt;

/// An S-expression is either an atom (string) or a list of expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A bare symbol or a quoted string. The two are not distinguished once
    /// parsed: `build` and `"build"` are the same atom.
    Atom(String),

    /// A parenthesized list, e.g. `(run "cmake" "..")`.
    List(Vec<Expr>),
}

impl Expr {
    pub fn atom(s: impl Into<String>) -> Self {
        Expr::Atom(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::List(items.into_iter().collect())
    }

    /// Returns the atom value if this is an Atom, None otherwise.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Expr::Atom(s) => Some(s),
            Expr::List(_) => None,
        }
    }

    /// Returns the list if this is a List, None otherwise.
    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::Atom(_) => None,
            Expr::List(items) => Some(items),
        }
    }

    /// Returns true if this is an atom with the given value.
    pub fn is_atom(&self, value: &str) -> bool {
        self.as_atom() == Some(value)
    }

    /// If this is a list, returns the first element (the "head" or form name).
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// Elements after the head. An empty list has no tail.
    pub fn tail(&self) -> Option<&[Expr]> {
        match self.as_list()? {
            [] => None,
            [_, rest @ ..] => Some(rest),
        }
    }

    fn is_flat(&self) -> bool {
        match self {
            Expr::Atom(_) => true,
            Expr::List(items) => items.iter().all(|e| matches!(e, Expr::Atom(_))),
        }
    }

    /// Render with one nested form per line.
    ///
    /// Lists that contain only atoms stay on one line; a list with nested
    /// lists keeps its leading atoms on the opening line and puts each
    /// following element on its own line, indented two spaces per level.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out
    }

    fn write_pretty(&self, out: &mut String, depth: usize) {
        if self.is_flat() {
            out.push_str(&self.to_string());
            return;
        }

        let Expr::List(items) = self else {
            unreachable!("atoms are flat")
        };

        let leading = items
            .iter()
            .take_while(|e| matches!(e, Expr::Atom(_)))
            .count();

        out.push('(');
        for (i, item) in items[..leading].iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&item.to_string());
        }

        let indent = "  ".repeat(depth + 1);
        for (i, item) in items[leading..].iter().enumerate() {
            if leading == 0 && i == 0 {
                item.write_pretty(out, depth + 1);
                continue;
            }
            out.push('\n');
            out.push_str(&indent);
            item.write_pretty(out, depth + 1);
        }
        out.push(')');
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\\'))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Atom(s) => {
                if needs_quotes(s) {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                } else {
                    write!(f, "{}", s)
                }
            }
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}
