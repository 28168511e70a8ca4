//! Deferred manifest values.

use std::fmt;
use std::sync::Arc;

/// Callable producing a deferred value, `None` when it cannot.
pub type DeferredFn<T> = Arc<dyn Fn() -> Option<T> + Send + Sync>;

/// A manifest value that may still need resolution.
///
/// Manifests declare `installed` and `version` either literally or as a
/// reference to something only known at runtime (a type name, a constant,
/// a callable). The [`Resolver`](crate::Resolver) turns every variant into a
/// concrete value.
#[derive(Clone, Default)]
pub enum Deferred<T> {
    /// Not declared; the plugin class decides.
    #[default]
    Unresolved,
    /// Already concrete.
    Literal(T),
    /// Name of a type, constant or callable looked up in [`Symbols`](crate::Symbols).
    Reference(String),
    /// Computed on first resolution.
    Callable(DeferredFn<T>),
}

impl<T> Deferred<T> {
    /// Wrap a closure as a deferred callable.
    pub fn callable(f: impl Fn() -> Option<T> + Send + Sync + 'static) -> Self {
        Self::Callable(Arc::new(f))
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => f.write_str("Unresolved"),
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Reference(name) => f.debug_tuple("Reference").field(name).finish(),
            Self::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl<T: PartialEq> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unresolved, Self::Unresolved) => true,
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
