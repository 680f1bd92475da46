/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Case-insensitive attribute names and the attribute sets they key.

use crate::error::ManifestError;
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
};

/// Longest attribute name accepted by the parser.
pub const MAX_NAME_LEN: usize = 70;

pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const SIGNATURE_VERSION: &str = "Signature-Version";
pub const CREATED_BY: &str = "Created-By";
pub const NAME: &str = "Name";
pub const DIGEST_ALGORITHMS: &str = "Digest-Algorithms";

/// A validated attribute key.
///
/// The original spelling is kept for output; comparison, ordering and hashing
/// use the ASCII-lowercased form only.
#[derive(Clone)]
pub struct AttributeName {
    original: String,
    normalized: String,
}

impl AttributeName {
    /// Validates `name` (ASCII letters, digits, `_` and `-`, non-empty).
    pub fn new(name: &str) -> Result<Self, ManifestError> {
        if name.is_empty() {
            return Err(ManifestError::Format("empty attribute name".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ManifestError::Format(format!(
                "attribute name longer than {} bytes: {}",
                MAX_NAME_LEN, name
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(ManifestError::Format(format!(
                "invalid character {:?} in attribute name `{}`",
                bad, name
            )));
        }
        Ok(Self::trusted(name))
    }

    /// Skips validation. Only for names known to be well formed.
    pub(crate) fn trusted(name: &str) -> Self {
        Self {
            original: name.to_string(),
            normalized: name.to_ascii_lowercase(),
        }
    }

    pub fn manifest_version() -> Self {
        Self::trusted(MANIFEST_VERSION)
    }

    pub fn signature_version() -> Self {
        Self::trusted(SIGNATURE_VERSION)
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Case-insensitive suffix test, used for the `-Digest` naming convention.
    pub(crate) fn strip_suffix_ignore_case(&self, suffix: &str) -> Option<&str> {
        let split = self.original.len().checked_sub(suffix.len())?;
        if self.normalized[split..] == suffix.to_ascii_lowercase() {
            Some(&self.original[..split])
        } else {
            None
        }
    }
}

impl PartialEq for AttributeName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for AttributeName {}

impl Hash for AttributeName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for AttributeName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl fmt::Debug for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.original)
    }
}

impl TryFrom<&str> for AttributeName {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Attribute values keyed by [`AttributeName`].
///
/// Wraps the map instead of exposing it so every key goes through name
/// validation. Equality ignores insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeSet {
    values: BTreeMap<AttributeName, String>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &AttributeName) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Looks up a name given as text; invalid names are simply absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        AttributeName::new(name).ok().and_then(|n| self.get(&n))
    }

    /// Stores `value`, returning the value it replaced.
    pub fn put(&mut self, name: AttributeName, value: impl Into<String>) -> Option<String> {
        self.values.insert(name, value.into())
    }

    pub fn remove(&mut self, name: &AttributeName) -> Option<String> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &AttributeName) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &str)> {
        self.values.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_compare_case_insensitively() {
        let a = AttributeName::new("SHA-256-Digest").unwrap();
        let b = AttributeName::new("sha-256-digest").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.as_str(), "SHA-256-Digest");
    }

    #[test]
    fn invalid_names_are_rejected() {
        for bad in ["", "has space", "colon:", "naïve", "dot.name"] {
            assert!(
                matches!(AttributeName::new(bad), Err(ManifestError::Format(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(AttributeName::new(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(AttributeName::new("Class_Path-2").is_ok());
    }

    #[test]
    fn put_returns_previous_value() {
        let mut set = AttributeSet::new();
        let key = AttributeName::new("Created-By").unwrap();
        assert_eq!(set.put(key.clone(), "one"), None);
        assert_eq!(
            set.put(AttributeName::new("created-by").unwrap(), "two"),
            Some("one".to_string())
        );
        assert_eq!(set.get(&key), Some("two"));
        assert_eq!(set.get_str("CREATED-BY"), Some("two"));
        assert_eq!(set.get_str("not valid"), None);
        assert_eq!(set.len(), 1);
        assert_eq!(set.remove(&key), Some("two".to_string()));
        assert!(set.is_empty());
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = AttributeSet::new();
        a.put(AttributeName::new("A").unwrap(), "1");
        a.put(AttributeName::new("B").unwrap(), "2");
        let mut b = AttributeSet::new();
        b.put(AttributeName::new("b").unwrap(), "2");
        b.put(AttributeName::new("a").unwrap(), "1");
        assert_eq!(a, b);

        b.put(AttributeName::new("a").unwrap(), "other");
        assert_ne!(a, b);
    }

    #[test]
    fn digest_suffix_is_stripped_ignoring_case() {
        let name = AttributeName::new("SHA1-digest-MANIFEST").unwrap();
        assert_eq!(name.strip_suffix_ignore_case("-Digest-Manifest"), Some("SHA1"));
        assert_eq!(name.strip_suffix_ignore_case("-Digest"), None);
        let short = AttributeName::new("X").unwrap();
        assert_eq!(short.strip_suffix_ignore_case("-Digest"), None);
    }
}
