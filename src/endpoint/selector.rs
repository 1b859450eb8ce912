//! Label selectors in query strings
//!
//! Parses the `labelSelector` query parameter into match labels and match
//! expressions, rewrites the label names and values, and encodes the result
//! back in canonical form: requirements sorted by key, set values sorted.

use crate::error::{Error, Result};
use crate::names::PrefixedNameRewriter;
use crate::rules::Action;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use url::form_urlencoded;

pub const LABEL_SELECTOR_PARAM: &str = "labelSelector";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A set-based requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: BTreeSet<String>,
}

/// A parsed label selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<Requirement>,
}

impl LabelSelector {
    /// Rewrite label names and values
    pub fn rewrite(&self, names: &PrefixedNameRewriter, action: Action) -> LabelSelector {
        let match_labels = self
            .match_labels
            .iter()
            .map(|(key, value)| names.rewrite_name_value(key, value, action))
            .collect();

        let match_expressions = self
            .match_expressions
            .iter()
            .map(|req| {
                let values: Vec<String> = req.values.iter().cloned().collect();
                let (key, values) = names.rewrite_name_values(&req.key, &values, action);
                Requirement {
                    key,
                    operator: req.operator,
                    values: values.into_iter().collect(),
                }
            })
            .collect();

        LabelSelector {
            match_labels,
            match_expressions,
        }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<(&str, String)> = self
            .match_labels
            .iter()
            .map(|(key, value)| (key.as_str(), format!("{key}={value}")))
            .collect();

        for req in &self.match_expressions {
            let values = req.values.iter().cloned().collect::<Vec<_>>().join(",");
            let part = match req.operator {
                Operator::In => format!("{} in ({values})", req.key),
                Operator::NotIn => format!("{} notin ({values})", req.key),
                Operator::Exists => req.key.clone(),
                Operator::DoesNotExist => format!("!{}", req.key),
            };
            parts.push((req.key.as_str(), part));
        }

        // Stable: requirements on the same key keep their order.
        parts.sort_by(|a, b| a.0.cmp(b.0));
        let joined = parts.into_iter().map(|(_, p)| p).collect::<Vec<_>>().join(",");
        write!(f, "{joined}")
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        Parser {
            lexer: Lexer { input }.peekable(),
            source: input,
        }
        .parse()
    }
}

// =============================================================================
// Query Rewriting
// =============================================================================

/// Rewrite the `labelSelector` parameter of a raw query string
///
/// Returns `None` when there is no selector, nothing changed, or the
/// selector does not parse. Other parameters keep their raw text and order.
pub fn rewrite_label_selector_query(
    raw_query: &str,
    names: &PrefixedNameRewriter,
    action: Action,
) -> Option<String> {
    if !raw_query.contains(LABEL_SELECTOR_PARAM) {
        return None;
    }

    let mut changed = false;
    let mut pairs = Vec::new();
    for pair in raw_query.split('&') {
        let decoded = form_urlencoded::parse(pair.as_bytes()).next();
        let Some((key, value)) = decoded.filter(|(k, v)| k == LABEL_SELECTOR_PARAM && !v.is_empty()) else {
            pairs.push(pair.to_string());
            continue;
        };

        let selector = match value.parse::<LabelSelector>() {
            Ok(selector) => selector,
            Err(err) => {
                debug!(error = %err, "Label selector left as is");
                return None;
            }
        };
        let rewritten = selector.rewrite(names, action);
        if rewritten == selector {
            pairs.push(pair.to_string());
            continue;
        }

        changed = true;
        let encoded: String = form_urlencoded::byte_serialize(rewritten.to_string().as_bytes()).collect();
        pairs.push(format!("{key}={encoded}"));
    }

    changed.then(|| pairs.join("&"))
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Not,
    Equal,
    NotEqual,
    Greater,
    Less,
    Comma,
    LeftParen,
    RightParen,
}

struct Lexer<'s> {
    input: &'s str,
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.input = self.input.trim_start();
        self.input.chars().next()?;

        const SYMBOLS: &[(&str, Token)] = &[
            ("==", Token::Equal),
            ("!=", Token::NotEqual),
            ("=", Token::Equal),
            ("!", Token::Not),
            (">", Token::Greater),
            ("<", Token::Less),
            (",", Token::Comma),
            ("(", Token::LeftParen),
            (")", Token::RightParen),
        ];

        for (symbol, token) in SYMBOLS {
            if let Some(rest) = self.input.strip_prefix(symbol) {
                self.input = rest;
                return Some(token.clone());
            }
        }

        let end = self
            .input
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '!' | '<' | '>' | ',' | '(' | ')'))
            .unwrap_or(self.input.len());
        let (ident, rest) = self.input.split_at(end);
        self.input = rest;
        Some(Token::Ident(ident.to_string()))
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'s> {
    lexer: std::iter::Peekable<Lexer<'s>>,
    source: &'s str,
}

impl<'s> Parser<'s> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::LabelSelector {
            selector: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> Result<LabelSelector> {
        let mut selector = LabelSelector::default();

        loop {
            match self.lexer.next() {
                None => break,
                Some(Token::Not) => {
                    let key = self.ident("key after `!`")?;
                    selector.match_expressions.push(Requirement {
                        key,
                        operator: Operator::DoesNotExist,
                        values: BTreeSet::new(),
                    });
                }
                Some(Token::Ident(key)) => self.requirement(key, &mut selector)?,
                Some(token) => return Err(self.error(format!("unexpected {token:?} at start of requirement"))),
            }

            match self.lexer.next() {
                None => break,
                Some(Token::Comma) => continue,
                Some(token) => return Err(self.error(format!("unexpected {token:?} after requirement"))),
            }
        }

        Ok(selector)
    }

    fn requirement(&mut self, key: String, selector: &mut LabelSelector) -> Result<()> {
        match self.lexer.peek() {
            None | Some(Token::Comma) => {
                selector.match_expressions.push(Requirement {
                    key,
                    operator: Operator::Exists,
                    values: BTreeSet::new(),
                });
            }
            Some(Token::Equal) => {
                self.lexer.next();
                let value = self.value()?;
                selector.match_labels.insert(key, value);
            }
            Some(Token::NotEqual) => {
                self.lexer.next();
                let value = self.value()?;
                selector.match_expressions.push(Requirement {
                    key,
                    operator: Operator::NotIn,
                    values: BTreeSet::from([value]),
                });
            }
            Some(Token::Ident(op)) if op == "in" || op == "notin" => {
                let operator = if op == "in" { Operator::In } else { Operator::NotIn };
                self.lexer.next();
                let values = self.set()?;
                selector.match_expressions.push(Requirement { key, operator, values });
            }
            Some(Token::Greater) | Some(Token::Less) => {
                return Err(self.error("`>` and `<` are not valid label selector operators"));
            }
            Some(token) => {
                let token = token.clone();
                return Err(self.error(format!("unexpected {token:?} after key `{key}`")));
            }
        }
        Ok(())
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.lexer.next() {
            Some(Token::Ident(ident)) => Ok(ident),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    /// Value after `=` or `!=`. An empty value is allowed.
    fn value(&mut self) -> Result<String> {
        match self.lexer.peek() {
            None | Some(Token::Comma) => Ok(String::new()),
            _ => self.ident("value"),
        }
    }

    fn set(&mut self) -> Result<BTreeSet<String>> {
        if self.lexer.next() != Some(Token::LeftParen) {
            return Err(self.error("expected `(` after set operator"));
        }

        let mut values = BTreeSet::new();
        loop {
            match self.lexer.next() {
                Some(Token::Ident(value)) => {
                    values.insert(value);
                }
                Some(Token::RightParen) => break,
                _ => return Err(self.error("expected value or `)` in set")),
            }
            match self.lexer.next() {
                Some(Token::Comma) => continue,
                Some(Token::RightParen) => break,
                _ => return Err(self.error("expected `,` or `)` after value")),
            }
        }
        Ok(values)
    }
}
