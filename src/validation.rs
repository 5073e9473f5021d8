//! Field-keyed validation errors.
//!
//! Every mutating operation collects all of its field failures into a
//! [`Violations`] list and only then fails, so the caller receives one
//! [`ValidationError`] describing every problem with the request.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// One or more validation failures grouped by field key.
///
/// Keys keep the order in which they were first reported and a key may
/// carry several messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("The request is invalid.")]
pub struct ValidationError {
    state: Vec<(String, Vec<String>)>,
}

impl ValidationError {
    /// Human-readable summary shared by every validation failure.
    pub const MESSAGE: &'static str = "The request is invalid.";

    /// Build from `(key, message)` pairs, grouping messages by key.
    pub fn new<I, K, M>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, M)>,
        K: Into<String>,
        M: Into<String>,
    {
        let mut err = Self::default();
        for (key, message) in pairs {
            err.push(key.into(), message.into());
        }
        err
    }

    /// A validation error with exactly one message.
    pub fn single(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([(key.into(), message.into())])
    }

    /// The fixed failure raised when an operation requires a signed-in user.
    pub fn not_authenticated(key: &str) -> Self {
        Self::single(key, "Authentication required.")
    }

    fn push(&mut self, key: String, message: String) {
        match self.state.iter_mut().find(|(k, _)| *k == key) {
            Some((_, messages)) => messages.push(message),
            None => self.state.push((key, vec![message])),
        }
    }

    /// The merged `{key: [messages...]}` structure in insertion order.
    pub fn state(&self) -> &[(String, Vec<String>)] {
        &self.state
    }

    /// Messages recorded for one key.
    pub fn messages(&self, key: &str) -> Option<&[String]> {
        self.state
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, messages)| messages.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.state.iter().map(|(k, _)| k.as_str())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.state.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn message(&self) -> &'static str {
        Self::MESSAGE
    }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut outer = serializer.serialize_map(Some(2))?;
        outer.serialize_entry("message", Self::MESSAGE)?;
        outer.serialize_entry("state", &StateMap(&self.state))?;
        outer.end()
    }
}

struct StateMap<'a>(&'a [(String, Vec<String>)]);

impl Serialize for StateMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, messages) in self.0 {
            map.serialize_entry(key, messages)?;
        }
        map.end()
    }
}

/// Accumulates failures for one validation pass.
#[derive(Debug, Default)]
pub struct Violations {
    pairs: Vec<(String, String)>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.pairs.push((key.into(), message.into()));
    }

    /// Record `message` under `key` when `failed` holds.
    pub fn check(&mut self, failed: bool, key: &str, message: &str) {
        if failed {
            self.push(key, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Finish the pass: `Ok(())` when nothing was recorded.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.pairs.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.pairs))
        }
    }
}

/// Single-item failure when `value` is missing. Used for the checks that
/// must pass before field validation makes sense (signed in, record exists).
pub fn require<T>(value: Option<T>, key: &str, message: &str) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::single(key, message))
}

/// Single-item failure unless `condition` holds.
pub fn ensure(condition: bool, key: &str, message: &str) -> Result<(), ValidationError> {
    if condition {
        Ok(())
    } else {
        Err(ValidationError::single(key, message))
    }
}

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.\-]{1,30}[A-Za-z0-9]$").unwrap());

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 72;

/// `true` for `None`, empty and whitespace-only strings.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Absolute http(s) URL with a host.
pub fn is_valid_url(value: &str) -> bool {
    match url::Url::parse(value.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

/// 3 to 32 characters: letters, digits, spaces, `_`, `.` and `-`, starting
/// and ending with a letter or digit.
pub fn is_valid_username(value: &str) -> bool {
    USERNAME_RE.is_match(value)
}

/// Bcrypt only looks at the first 72 bytes, so longer passwords are refused.
pub fn is_valid_password(value: &str) -> bool {
    let len = value.len();
    (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len)
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| c.is_alphabetic())
}
