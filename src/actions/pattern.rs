//! # Pattern matching over dispatched actions.
//!
//! A [`Pattern`] turns a subscription filter into a boolean test over
//! actions. Patterns are stateless and evaluated fresh per action.
//!
//! ## Shapes
//! - [`Pattern::Any`] — wildcard, matches every action
//! - [`Pattern::Kind`] — exact type-string equality
//! - [`Pattern::AnyOf`] — logical OR over sub-patterns (recursive); empty matches nothing
//! - [`Pattern::Where`] — arbitrary predicate over the action
//!
//! Action creators convert into patterns by their stable type string
//! (`Pattern::from(&creator)`), so a creator can be used anywhere a
//! pattern is expected without invoking it.

use std::fmt;
use std::sync::Arc;

use super::action::Action;

/// Boolean test over actions, used by bus subscriptions and supervisors.
#[derive(Clone)]
pub enum Pattern {
    /// Matches every action (`"*"`).
    Any,
    /// Matches actions whose kind equals the given type string.
    Kind(String),
    /// Matches if any sub-pattern matches. Empty list matches nothing.
    AnyOf(Vec<Pattern>),
    /// Matches if the predicate returns true.
    Where(Arc<dyn Fn(&Action) -> bool + Send + Sync>),
}

impl Pattern {
    /// Exact-kind pattern.
    pub fn kind(kind: impl Into<String>) -> Self {
        Pattern::Kind(kind.into())
    }

    /// Predicate pattern.
    pub fn matching<F>(predicate: F) -> Self
    where
        F: Fn(&Action) -> bool + Send + Sync + 'static,
    {
        Pattern::Where(Arc::new(predicate))
    }

    /// Evaluates the pattern against one action.
    ///
    /// No side effects; safe to call per action.
    pub fn matches(&self, action: &Action) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Kind(kind) => action.kind.as_ref() == kind,
            Pattern::AnyOf(patterns) => patterns.iter().any(|p| p.matches(action)),
            Pattern::Where(predicate) => predicate(action),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "Any"),
            Pattern::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            Pattern::AnyOf(patterns) => f.debug_tuple("AnyOf").field(patterns).finish(),
            Pattern::Where(_) => write!(f, "Where(..)"),
        }
    }
}

impl From<&str> for Pattern {
    fn from(kind: &str) -> Self {
        if kind == "*" {
            Pattern::Any
        } else {
            Pattern::Kind(kind.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_matches_everything() {
        assert!(Pattern::Any.matches(&Action::new("x")));
        assert!(Pattern::Any.matches(&Action::new("y").with_error()));
    }

    #[test]
    fn test_kind_requires_exact_equality() {
        let p = Pattern::kind("todos/add");
        assert!(p.matches(&Action::new("todos/add")));
        assert!(!p.matches(&Action::new("todos/remove")));
        assert!(!p.matches(&Action::new("todos/add2")));
    }

    #[test]
    fn test_any_of_is_logical_or() {
        let p = Pattern::AnyOf(vec![
            Pattern::kind("a"),
            Pattern::AnyOf(vec![Pattern::kind("b")]),
        ]);
        assert!(p.matches(&Action::new("a")));
        assert!(p.matches(&Action::new("b")));
        assert!(!p.matches(&Action::new("c")));
    }

    #[test]
    fn test_empty_any_of_matches_nothing() {
        let p = Pattern::AnyOf(vec![]);
        assert!(!p.matches(&Action::new("a")));
    }

    #[test]
    fn test_predicate_pattern() {
        let p = Pattern::matching(|a: &Action| a.error);
        assert!(p.matches(&Action::new("x").with_error()));
        assert!(!p.matches(&Action::new("x")));
    }

    #[test]
    fn test_wildcard_string_conversion() {
        assert!(matches!(Pattern::from("*"), Pattern::Any));
        assert!(matches!(Pattern::from("a"), Pattern::Kind(_)));
    }
}
