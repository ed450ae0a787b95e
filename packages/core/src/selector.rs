use std::fmt;
use std::rc::Rc;

use crate::error::WaitError;

/// A caller-supplied matching predicate over node handles.
pub type NodePredicate<N> = Rc<dyn Fn(&N) -> bool>;

/// What a wait is looking for.
///
/// A `Pattern` is interpreted by the scope's [`SelectorMatcher`]; the engine
/// never inspects the string itself. A `Predicate` is run against each node a
/// change batch reports. `Any` reports every added or removed node unfiltered.
pub enum Selector<N> {
    /// No filtering: every reported node is a match.
    Any,
    /// A structural pattern, matched against tag/attribute/hierarchy by the
    /// scope's matcher.
    Pattern(String),
    /// A boolean predicate over node handles.
    ///
    /// Predicates are keyed by allocation identity, like callbacks: cloning
    /// the `Rc` refers to the same wait entry, while a second `Rc::new` of an
    /// identical closure is a different selector.
    Predicate(NodePredicate<N>),
}

impl<N> Selector<N> {
    /// A structural pattern selector.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    /// A predicate selector.
    pub fn predicate(predicate: impl Fn(&N) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(predicate))
    }

    pub(crate) fn key(&self) -> SelectorKey {
        match self {
            Selector::Any => SelectorKey::Any,
            Selector::Pattern(pattern) => SelectorKey::Pattern(pattern.clone()),
            Selector::Predicate(predicate) => {
                SelectorKey::Predicate(Rc::as_ptr(predicate) as *const () as usize)
            }
        }
    }
}

impl<N> Clone for Selector<N> {
    fn clone(&self) -> Self {
        match self {
            Selector::Any => Selector::Any,
            Selector::Pattern(pattern) => Selector::Pattern(pattern.clone()),
            Selector::Predicate(predicate) => Selector::Predicate(predicate.clone()),
        }
    }
}

impl<N> fmt::Debug for Selector<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Any => f.write_str("Selector::Any"),
            Selector::Pattern(pattern) => f.debug_tuple("Selector::Pattern").field(pattern).finish(),
            Selector::Predicate(predicate) => f
                .debug_tuple("Selector::Predicate")
                .field(&(Rc::as_ptr(predicate) as *const ()))
                .finish(),
        }
    }
}

impl<N> From<&str> for Selector<N> {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

impl<N> From<String> for Selector<N> {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

/// Registry key derived from a [`Selector`]: patterns compare by value,
/// predicates by allocation identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SelectorKey {
    Any,
    Pattern(String),
    Predicate(usize),
}

/// Selector evaluation against a concrete tree.
///
/// The engine consumes this capability; it never walks the tree itself. All
/// three query methods must agree with each other for the same pattern.
pub trait SelectorMatcher<N> {
    /// Does `node` itself satisfy `pattern`?
    fn matches_self(&self, node: &N, pattern: &str) -> bool;

    /// Every descendant of `root` satisfying `pattern`, in document order.
    /// `root` itself is not a candidate.
    fn find_descendants(&self, root: &N, pattern: &str) -> Vec<N>;

    /// Does `node` or any of its descendants satisfy `pattern`?
    ///
    /// A change record may report only the root of an inserted subtree; this
    /// is the combinator that detects a match buried inside it.
    fn matches_self_or_descendant(&self, node: &N, pattern: &str) -> bool {
        self.matches_self(node, pattern) || !self.find_descendants(node, pattern).is_empty()
    }

    /// Validate a pattern before any wait is registered for it.
    ///
    /// Matchers that can detect malformed patterns should reject them here so
    /// the error reaches the caller from the registration call rather than
    /// from a later delivery. The default accepts everything.
    fn check_pattern(&self, pattern: &str) -> Result<(), WaitError> {
        let _ = pattern;
        Ok(())
    }
}
