use std::{
    fmt,
    fmt::{Debug, Display},
};

/// A wrapper for credentials that must never leak into logs.
///
/// Configuration structs carrying API keys (the block explorer key, for one) derive `Debug` and get logged at
/// startup, so the guard has to live in the type: both `Debug` and `Display` render as `****`, and the only way at
/// the value is an explicit [`Secret::reveal`] call at the point of use.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Grants access to the wrapped value. Call this where the secret is consumed, not where it is passed around.
    pub fn reveal(&self) -> &T {
        &self.value
    }

    /// Unwraps the secret, consuming the guard.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
