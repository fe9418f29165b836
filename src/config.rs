//! Configure function registries

use std::fmt;

/// What a registry does when a `(name, arity)` pair is registered twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DuplicatePolicy {
    /// Keep the existing binding and fail with
    /// [`Error::DuplicateRegistration`](crate::Error::DuplicateRegistration).
    #[default]
    Reject,
    /// Replace the existing binding; the previous descriptor is handed back to
    /// the caller.
    Replace,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DuplicatePolicy::Reject => f.pad("reject"),
            DuplicatePolicy::Replace => f.pad("replace"),
        }
    }
}

/// Registry configuration options.
///
/// ```rust
/// use sqlfn::config::{DuplicatePolicy, RegistryConfig};
/// use sqlfn::FunctionRegistry;
///
/// let config = RegistryConfig::default().with_duplicate_policy(DuplicatePolicy::Replace);
/// let registry = FunctionRegistry::with_config(config);
/// assert_eq!(registry.config().duplicate_policy(), DuplicatePolicy::Replace);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    duplicate_policy: DuplicatePolicy,
}

impl RegistryConfig {
    /// Set the policy applied to a second registration of the same
    /// `(name, arity)`.
    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Current duplicate registration policy.
    #[inline]
    #[must_use]
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_rejects() {
        assert_eq!(RegistryConfig::default().duplicate_policy(), DuplicatePolicy::Reject);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::default().with_duplicate_policy(DuplicatePolicy::Replace);
        assert_eq!(config.duplicate_policy(), DuplicatePolicy::Replace);
        assert_eq!(DuplicatePolicy::Replace.to_string(), "replace");
    }
}
