//! Post-fetch transformations whose results are cached on their own key.

use std::fmt;

/// A pure function applied to a decoded value after it is fetched.
///
/// `identifier` must be stable across runs: it qualifies the cache key of the
/// transformed value, so two transformers sharing an identifier share entries.
pub trait ImageTransformer<V>: Send + Sync {
    fn identifier(&self) -> &str;

    /// Transform `value`, or return `None` if it cannot be transformed
    fn transform(&self, value: V) -> Option<V>;
}

/// [`ImageTransformer`] built from a closure
pub struct FnTransformer<F> {
    identifier: String,
    f: F,
}

impl<F> FnTransformer<F> {
    pub fn new(identifier: impl Into<String>, f: F) -> Self {
        Self {
            identifier: identifier.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnTransformer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl<V, F> ImageTransformer<V> for FnTransformer<F>
where
    F: Fn(V) -> Option<V> + Send + Sync,
{
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn transform(&self, value: V) -> Option<V> {
        (self.f)(value)
    }
}
