//! Boolean query language.
//!
//! ```text
//! query   := expr EOF
//! expr    := operand [ op operand ]
//! operand := WORD | '"' WORD '"' | '(' expr ')'
//! op      := and | or | not            (case-insensitive)
//! WORD    := [A-Za-z0-9]+
//! ```
//!
//! Every operator takes exactly two operands, so three or more operands must be
//! grouped explicitly: `(a and b) and c`. A flat chain such as `a and b and c`
//! is rejected with [`QueryError::Chained`]. Groups nest at most
//! [`MAX_DEPTH`] levels deep.

use crate::{DocId, Result};
use std::collections::HashSet;
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("empty query")]
    Empty,
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unclosed quote starting at {pos}")]
    UnclosedQuote { pos: usize },
    #[error("quoted term at {pos} must be a single alphanumeric word")]
    BadQuotedTerm { pos: usize },
    #[error("unmatched ')' at {pos}")]
    UnmatchedClose { pos: usize },
    #[error("missing ')' for '(' at {pos}")]
    UnclosedParen { pos: usize },
    #[error("expected a term or '(' at {pos}, found {found}")]
    ExpectedOperand { pos: usize, found: String },
    #[error("expected and/or/not at {pos}, found {found}")]
    ExpectedOperator { pos: usize, found: String },
    #[error("operator at {pos} chains a third operand; group operands with parentheses")]
    Chained { pos: usize },
    #[error("'(' at {pos} nests deeper than {} levels", MAX_DEPTH)]
    TooDeep { pos: usize },
}

/// Deepest parenthesis nesting the parser accepts.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "and" => Some(Operator::And),
            "or" => Some(Operator::Or),
            "not" => Some(Operator::Not),
            _ => None,
        }
    }

    /// Combine two ordered id lists, keeping the left list's order.
    pub fn apply(self, left: Vec<DocId>, right: Vec<DocId>) -> Vec<DocId> {
        match self {
            Operator::And => intersect(left, &right),
            Operator::Or => union(left, right),
            Operator::Not => difference(left, &right),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
        })
    }
}

pub fn intersect(left: Vec<DocId>, right: &[DocId]) -> Vec<DocId> {
    let keep: HashSet<DocId> = right.iter().copied().collect();
    left.into_iter().filter(|id| keep.contains(id)).collect()
}

pub fn union(mut left: Vec<DocId>, right: Vec<DocId>) -> Vec<DocId> {
    let mut seen: HashSet<DocId> = left.iter().copied().collect();
    for id in right {
        if seen.insert(id) {
            left.push(id);
        }
    }
    left
}

pub fn difference(left: Vec<DocId>, right: &[DocId]) -> Vec<DocId> {
    let drop: HashSet<DocId> = right.iter().copied().collect();
    left.into_iter().filter(|id| !drop.contains(id)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Bare word; subject to the blacklist.
    Term(String),
    /// Quoted word; bypasses the blacklist.
    Exact(String),
    Binary(Operator, Box<Expr>, Box<Expr>),
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Term(word) => write!(f, "{word}"),
            Expr::Exact(word) => write!(f, "\"{word}\""),
            Expr::Binary(op, left, right) => write!(f, "({left} {op} {right})"),
        }
    }
}

/// Resolves query leaves to ordered document id lists.
pub trait TermLookup {
    /// Documents containing `term`; `exact` leaves skip the blacklist.
    fn documents(&self, term: &str, exact: bool) -> Result<Vec<DocId>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf<'a> {
    pub word: &'a str,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    root: Expr,
}

impl Query {
    pub fn parse(input: &str) -> std::result::Result<Self, QueryError> {
        let tokens = lex(input)?;
        let mut parser = Parser { tokens, at: 0, end: input.len(), depth: 0 };
        let root = parser.parse_query()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Expr { &self.root }

    pub fn evaluate<L: TermLookup + ?Sized>(&self, lookup: &L) -> Result<Vec<DocId>> {
        eval(&self.root, lookup)
    }

    /// Leaf words in left-to-right order.
    pub fn terms(&self) -> Vec<Leaf<'_>> {
        let mut out = Vec::new();
        collect_leaves(&self.root, &mut out);
        out
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { Display::fmt(&self.root, f) }
}

fn eval<L: TermLookup + ?Sized>(expr: &Expr, lookup: &L) -> Result<Vec<DocId>> {
    match expr {
        Expr::Term(word) => lookup.documents(word, false),
        Expr::Exact(word) => lookup.documents(word, true),
        Expr::Binary(op, left, right) => {
            let l = eval(left, lookup)?;
            let r = eval(right, lookup)?;
            Ok(op.apply(l, r))
        }
    }
}

fn collect_leaves<'a>(expr: &'a Expr, out: &mut Vec<Leaf<'a>>) {
    match expr {
        Expr::Term(word) => out.push(Leaf { word, exact: false }),
        Expr::Exact(word) => out.push(Leaf { word, exact: true }),
        Expr::Binary(_, left, right) => {
            collect_leaves(left, out);
            collect_leaves(right, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(Operator),
    Open,
    Close,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{w}'"),
            Token::Quoted(w) => write!(f, "'\"{w}\"'"),
            Token::Op(op) => write!(f, "operator {op}"),
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
        }
    }
}

#[derive(Debug)]
struct Lexeme {
    token: Token,
    pos: usize,
}

fn lex(input: &str) -> std::result::Result<Vec<Lexeme>, QueryError> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                out.push(Lexeme { token: Token::Open, pos });
            }
            ')' => {
                chars.next();
                out.push(Lexeme { token: Token::Close, pos });
            }
            '"' => {
                chars.next();
                let mut word = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    word.push(c);
                }
                if !closed {
                    return Err(QueryError::UnclosedQuote { pos });
                }
                if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(QueryError::BadQuotedTerm { pos });
                }
                out.push(Lexeme { token: Token::Quoted(word.to_lowercase()), pos });
            }
            c if c.is_ascii_alphanumeric() => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !c.is_ascii_alphanumeric() {
                        break;
                    }
                    word.push(c.to_ascii_lowercase());
                    chars.next();
                }
                let token = match Operator::from_word(&word) {
                    Some(op) => Token::Op(op),
                    None => Token::Word(word),
                };
                out.push(Lexeme { token, pos });
            }
            other => return Err(QueryError::UnexpectedChar { ch: other, pos }),
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Lexeme>,
    at: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> { self.tokens.get(self.at) }

    fn next(&mut self) -> Option<&Lexeme> {
        let lexeme = self.tokens.get(self.at);
        if lexeme.is_some() {
            self.at += 1;
        }
        lexeme
    }

    fn parse_query(&mut self) -> std::result::Result<Expr, QueryError> {
        if self.tokens.is_empty() {
            return Err(QueryError::Empty);
        }
        let expr = self.parse_expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(Lexeme { token: Token::Op(_), pos }) => Err(QueryError::Chained { pos: *pos }),
            Some(Lexeme { token: Token::Close, pos }) => Err(QueryError::UnmatchedClose { pos: *pos }),
            Some(Lexeme { token, pos }) => {
                Err(QueryError::ExpectedOperator { pos: *pos, found: token.to_string() })
            }
        }
    }

    fn parse_expr(&mut self) -> std::result::Result<Expr, QueryError> {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Lexeme { token: Token::Op(op), .. }) => *op,
            _ => return Ok(left),
        };
        self.at += 1;
        let right = self.parse_operand()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_operand(&mut self) -> std::result::Result<Expr, QueryError> {
        let end = self.end;
        let (token, open_pos) = match self.next() {
            Some(lexeme) => (lexeme.token.clone(), lexeme.pos),
            None => {
                return Err(QueryError::ExpectedOperand { pos: end, found: "end of query".into() })
            }
        };
        match token {
            Token::Word(w) => Ok(Expr::Term(w)),
            Token::Quoted(w) => Ok(Expr::Exact(w)),
            Token::Open => {
                if self.depth == MAX_DEPTH {
                    return Err(QueryError::TooDeep { pos: open_pos });
                }
                self.depth += 1;
                let inner = self.parse_expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Lexeme { token: Token::Close, .. }) => Ok(inner),
                    None => Err(QueryError::UnclosedParen { pos: open_pos }),
                    Some(Lexeme { token: Token::Op(_), pos }) => Err(QueryError::Chained { pos: *pos }),
                    Some(Lexeme { token, pos }) => {
                        Err(QueryError::ExpectedOperator { pos: *pos, found: token.to_string() })
                    }
                }
            }
            other => Err(QueryError::ExpectedOperand { pos: open_pos, found: other.to_string() }),
        }
    }
}
