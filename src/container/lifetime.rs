use std::fmt;

use serde::{Deserialize, Serialize};

/// How long a resolved instance is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// One instance for the lifetime of the provider, built at first resolution.
    Singleton,
    /// One instance per unit of work (one incoming request).
    Scoped,
    /// A fresh instance on every resolution.
    Transient,
}

impl Lifetime {
    /// Singleton and Scoped cache; Transient never does.
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifetime::Singleton | Lifetime::Scoped)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => write!(f, "singleton"),
            Lifetime::Scoped => write!(f, "scoped"),
            Lifetime::Transient => write!(f, "transient"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_uncached() {
        assert!(Lifetime::Singleton.is_cached());
        assert!(Lifetime::Scoped.is_cached());
        assert!(!Lifetime::Transient.is_cached());
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(Lifetime::Singleton.to_string(), "singleton");
        assert_eq!(Lifetime::Scoped.to_string(), "scoped");
        assert_eq!(Lifetime::Transient.to_string(), "transient");
    }
}
