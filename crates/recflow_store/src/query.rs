//! Query strings understood by [`MemoryStore`](crate::MemoryStore).
//!
//! Supported grammar:
//!
//! ```text
//! query   := [clause ("and" clause)*] ["limit" N] ["offset" N]
//! clause  := field ("=" | "!=") "\"" value "\""
//! ```
//!
//! `limit` and `offset` may appear in either order. Keywords are
//! case-insensitive. `$id` may be used as a field name.

use recflow_protocol::{Record, ID_MARKER};
use serde_json::Value;
use thiserror::Error;

/// Failure to parse a query string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query ended in the middle of a clause.
    #[error("unexpected end of query")]
    UnexpectedEnd,

    /// A token appeared where it is not allowed.
    #[error("unexpected token `{0}`")]
    Unexpected(String),

    /// A quoted value has no closing quote.
    #[error("unterminated string")]
    UnterminatedString,

    /// A `limit` or `offset` argument is not a number.
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
    Eq,
    Ne,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Str(s) => format!("\"{s}\""),
            Token::Eq => "=".into(),
            Token::Ne => "!=".into(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Ne),
                    Some(other) => return Err(QueryError::Unexpected(format!("!{other}"))),
                    None => return Err(QueryError::UnexpectedEnd),
                }
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => return Err(QueryError::UnterminatedString),
                        },
                        Some('"') => break,
                        Some(other) => value.push(other),
                        None => return Err(QueryError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '=' | '!' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    field: String,
    op: Op,
    value: String,
}

impl Clause {
    fn matches(&self, record: &Record) -> bool {
        let equal = if self.field == ID_MARKER {
            record.id.as_ref().is_some_and(|id| id.as_str() == self.value)
        } else {
            record
                .field(&self.field)
                .is_some_and(|v| value_equals(v, &self.value))
        };
        match self.op {
            Op::Eq => equal,
            Op::Ne => !equal,
        }
    }
}

/// Compares a field value with a query literal.
fn value_equals(value: &Value, literal: &str) -> bool {
    match value {
        Value::String(s) => s == literal,
        Value::Number(n) => n.to_string() == literal,
        Value::Bool(b) => b.to_string() == literal,
        _ => false,
    }
}

/// A parsed query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
    limit: Option<usize>,
    offset: usize,
}

impl Filter {
    /// Parses a query string. An empty string matches everything.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(input)?;
        let mut filter = Filter::default();
        let mut rest = tokens.as_slice();

        // Clauses.
        if let Some(first) = rest.first() {
            if !first.is_keyword("limit") && !first.is_keyword("offset") {
                loop {
                    let (clause, tail) = parse_clause(rest)?;
                    filter.clauses.push(clause);
                    rest = tail;
                    match rest.first() {
                        Some(t) if t.is_keyword("and") => rest = &rest[1..],
                        _ => break,
                    }
                }
            }
        }

        // Trailing limit / offset.
        while let Some(token) = rest.first() {
            let keyword = if token.is_keyword("limit") && filter.limit.is_none() {
                "limit"
            } else if token.is_keyword("offset") && filter.offset == 0 {
                "offset"
            } else {
                return Err(QueryError::Unexpected(token.describe()));
            };
            let n = match rest.get(1) {
                Some(Token::Word(w)) => w
                    .parse::<usize>()
                    .map_err(|_| QueryError::InvalidNumber(w.clone()))?,
                Some(other) => return Err(QueryError::InvalidNumber(other.describe())),
                None => return Err(QueryError::UnexpectedEnd),
            };
            if keyword == "limit" {
                filter.limit = Some(n);
            } else {
                filter.offset = n;
            }
            rest = &rest[2..];
        }

        Ok(filter)
    }

    /// Returns true if the record satisfies every clause.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|c| c.matches(record))
    }

    /// Filters records, then applies offset and limit.
    pub fn apply<'a, I>(&self, records: I) -> Vec<&'a Record>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Counts matching records, ignoring offset and limit.
    pub fn count<'a, I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = &'a Record>,
    {
        records.into_iter().filter(|r| self.matches(r)).count()
    }
}

fn parse_clause(tokens: &[Token]) -> Result<(Clause, &[Token]), QueryError> {
    let field = match tokens.first() {
        Some(Token::Word(w)) => w.clone(),
        Some(other) => return Err(QueryError::Unexpected(other.describe())),
        None => return Err(QueryError::UnexpectedEnd),
    };
    let op = match tokens.get(1) {
        Some(Token::Eq) => Op::Eq,
        Some(Token::Ne) => Op::Ne,
        Some(other) => return Err(QueryError::Unexpected(other.describe())),
        None => return Err(QueryError::UnexpectedEnd),
    };
    let value = match tokens.get(2) {
        Some(Token::Str(s)) => s.clone(),
        Some(other) => return Err(QueryError::Unexpected(other.describe())),
        None => return Err(QueryError::UnexpectedEnd),
    };
    Ok((Clause { field, op, value }, &tokens[3..]))
}
