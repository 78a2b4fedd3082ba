//! Domain model types for bidwarden.
//!
//! This module defines the small value types shared by every layer:
//! - [`ProviderId`] - Key of a provider entry in the credential file
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Identifier for a credential entry (e.g., "autodesk", "microsoft").
///
/// Provider IDs are the keys of the credential file and are normalized to
/// lowercase.
///
/// # Examples
///
/// ```
/// use bidwarden_core::ProviderId;
///
/// let autodesk = ProviderId::new("Autodesk");
/// assert_eq!(autodesk.as_str(), "autodesk");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a new provider ID.
    ///
    /// The ID is normalized to lowercase.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// Get the provider ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when the secret is dropped.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }

    /// Length of the secret in characters.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Whether the secret is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// A short preview safe for diagnostics: the first and last four
    /// characters, or only the length for short values.
    pub fn preview(&self) -> String {
        let len = self.char_len();
        if len <= 16 {
            return format!("<{} chars>", len);
        }
        let head: String = self.0.chars().take(4).collect();
        let tail: String = self.0.chars().skip(len - 4).collect();
        format!("{}...{}", head, tail)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_normalization() {
        let id = ProviderId::new("MSGraph");
        assert_eq!(id.as_str(), "msgraph");
        assert_eq!(id.to_string(), "msgraph");
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_secret_preview_hides_middle() {
        let secret = Secret::new("abcd-0123456789-wxyz");
        assert_eq!(secret.preview(), "abcd...wxyz");

        let short = Secret::new("tiny");
        assert_eq!(short.preview(), "<4 chars>");
    }

    #[test]
    fn test_secret_into_inner() {
        let secret = Secret::new("value");
        assert_eq!(secret.into_inner(), "value");
    }

    #[test]
    fn test_secret_serializes_transparently() {
        let secret = Secret::new("abc");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"abc\"");
        let parsed: Secret = serde_json::from_str("\"xyz\"").unwrap();
        assert_eq!(parsed.expose(), "xyz");
    }
}
