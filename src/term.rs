//! Dynamic message values.
//!
//! Everything that travels through a mailbox is a [`Term`]: a small dynamic
//! algebra of integers, floats, booleans, strings, pids, refs, tuples, and
//! opaque user payloads. Protocol messages are tagged tuples whose first
//! element is a reserved `Str` tag (see [`crate::messaging`]).
//!
//! Equality is structural, except for [`Term::Value`] payloads which compare
//! by pointer identity: two opaque payloads are equal only when they are the
//! same allocation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::pid::{Pid, Ref};

/// A dynamically typed message value.
#[derive(Clone)]
pub enum Term {
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// String; also used for protocol tags and atoms.
    Str(String),
    /// Process address.
    Pid(Pid),
    /// Unique correlation token.
    Ref(Ref),
    /// Ordered heterogeneous tuple.
    Tuple(Vec<Term>),
    /// Opaque user payload, compared by allocation identity.
    Value(Arc<dyn Any + Send + Sync>),
}

/// The type class of a [`Term`], used by type-token patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Matches [`Term::Int`].
    Int,
    /// Matches [`Term::Float`].
    Float,
    /// Matches [`Term::Bool`].
    Bool,
    /// Matches [`Term::Str`].
    Str,
    /// Matches [`Term::Pid`].
    Pid,
    /// Matches [`Term::Ref`].
    Ref,
    /// Matches [`Term::Tuple`] of any arity.
    Tuple,
    /// Matches [`Term::Value`].
    Value,
}

impl Term {
    /// Build a tuple term from its elements.
    #[must_use]
    pub fn tuple(items: Vec<Term>) -> Self {
        Self::Tuple(items)
    }

    /// The empty tuple.
    #[must_use]
    pub fn unit() -> Self {
        Self::Tuple(Vec::new())
    }

    /// Wrap an arbitrary value as an opaque payload.
    #[must_use]
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// The type class of this term.
    #[must_use]
    pub fn kind(&self) -> TermKind {
        match self {
            Self::Int(_) => TermKind::Int,
            Self::Float(_) => TermKind::Float,
            Self::Bool(_) => TermKind::Bool,
            Self::Str(_) => TermKind::Str,
            Self::Pid(_) => TermKind::Pid,
            Self::Ref(_) => TermKind::Ref,
            Self::Tuple(_) => TermKind::Tuple,
            Self::Value(_) => TermKind::Value,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float payload, if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Pid payload, if this is a `Pid`.
    #[must_use]
    pub fn as_pid(&self) -> Option<&Pid> {
        match self {
            Self::Pid(pid) => Some(pid),
            _ => None,
        }
    }

    /// Ref payload, if this is a `Ref`.
    #[must_use]
    pub fn as_ref_token(&self) -> Option<Ref> {
        match self {
            Self::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Tuple elements, if this is a `Tuple`.
    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Consume a tuple term into its elements.
    #[must_use]
    pub fn into_tuple(self) -> Option<Vec<Term>> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Downcast an opaque payload to a concrete type.
    #[must_use]
    pub fn downcast_value<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Value(v) => (&**v as &dyn Any).downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Pid(a), Self::Pid(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            // Opaque payloads are equal only when they share an allocation.
            (Self::Value(a), Self::Value(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Pid(pid) => write!(f, "{pid}"),
            Self::Ref(r) => write!(f, "{r}"),
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Self::Value(_) => write!(f, "#value"),
        }
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Term {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Pid> for Term {
    fn from(pid: Pid) -> Self {
        Self::Pid(pid)
    }
}

impl From<Ref> for Term {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Self::Tuple(items)
    }
}
