//! Paths that bypass authentication.
//!
//! Matching is exact on the request path (query string excluded). There is
//! no prefix, wildcard, or case-insensitive matching: `/auth/login/extra`
//! and `/Auth/Login` are protected.

use std::collections::HashSet;

/// Default unauthenticated paths.
pub const DEFAULT_ALLOW_LIST_PATHS: [&str; 4] = [
    "/auth/login",
    "/auth/register",
    "/auth/public-key",
    "/users/validate",
];

/// Immutable set of exact paths that skip the auth filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    paths: HashSet<String>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOW_LIST_PATHS)
    }
}

impl AllowList {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `path` exactly equals an allow-listed entry.
    pub fn is_allowed(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
