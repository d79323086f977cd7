//! Structural pattern matching over [`Term`] values.
//!
//! A [`Pattern`] either rejects a term or accepts it and produces an ordered
//! list of bindings. The grammar mirrors Erlang-style selective receive:
//!
//! - [`ANY`] matches anything and binds the value.
//! - [`IGNORE`] matches anything and binds nothing.
//! - A type token ([`Pattern::Type`]) matches any term of that kind and binds
//!   the value.
//! - A literal matches by structural equality and binds nothing.
//! - A tuple pattern matches a tuple of exactly the same arity element-wise,
//!   concatenating child bindings in order.
//!
//! Matching is total: [`match_term`] never panics. Unsupported patterns are
//! unrepresentable because the grammar is a closed enum; misuse is caught
//! where patterns are constructed, not where they are matched.

use crate::term::{Term, TermKind};

/// A pattern over [`Term`] values.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Match any value, binding it.
    Any,
    /// Match any value, binding nothing.
    Ignore,
    /// Match any term of the given kind, binding it.
    Type(TermKind),
    /// Match a structurally equal term, binding nothing.
    Literal(Term),
    /// Match a tuple of exactly this arity, element-wise.
    Tuple(Vec<Pattern>),
}

/// Wildcard pattern that binds the matched value.
pub const ANY: Pattern = Pattern::Any;

/// Wildcard pattern that discards the matched value.
pub const IGNORE: Pattern = Pattern::Ignore;

impl Pattern {
    /// Literal pattern from anything convertible to a [`Term`].
    pub fn literal(value: impl Into<Term>) -> Self {
        Self::Literal(value.into())
    }

    /// Type-token pattern for the given kind.
    #[must_use]
    pub fn of_type(kind: TermKind) -> Self {
        Self::Type(kind)
    }

    /// Tuple pattern from element patterns.
    #[must_use]
    pub fn tuple(items: Vec<Pattern>) -> Self {
        Self::Tuple(items)
    }
}

impl From<Term> for Pattern {
    fn from(value: Term) -> Self {
        Self::Literal(value)
    }
}

/// Match `value` against `pattern`.
///
/// Returns the ordered bindings on success, `None` on mismatch. Bindings are
/// clones of the matched sub-terms; the value itself is left untouched so a
/// failed arm costs nothing.
#[must_use]
pub fn match_term(value: &Term, pattern: &Pattern) -> Option<Vec<Term>> {
    match pattern {
        Pattern::Any => Some(vec![value.clone()]),
        Pattern::Ignore => Some(Vec::new()),
        Pattern::Type(kind) => (value.kind() == *kind).then(|| vec![value.clone()]),
        Pattern::Literal(expected) => (value == expected).then(Vec::new),
        Pattern::Tuple(patterns) => {
            let items = value.as_tuple()?;
            if items.len() != patterns.len() {
                return None;
            }
            let mut bindings = Vec::new();
            for (item, sub) in items.iter().zip(patterns) {
                bindings.extend(match_term(item, sub)?);
            }
            Some(bindings)
        }
    }
}
