//! Namespace keys partitioning the document space.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const NAMESPACE_MAX_CHARS: usize = 64;

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid namespace regex"));

/// Validated namespace key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

/// Namespace validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    Empty,
    TooLong(usize),
    InvalidCharacters(String),
}

impl Display for NamespaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "namespace must not be empty"),
            Self::TooLong(len) => write!(
                f,
                "namespace is {len} chars long; at most {NAMESPACE_MAX_CHARS} allowed"
            ),
            Self::InvalidCharacters(value) => {
                write!(f, "namespace `{value}` contains unsupported characters")
            }
        }
    }
}

impl Error for NamespaceError {}

impl Namespace {
    /// Parses and validates one namespace key.
    pub fn parse(value: &str) -> Result<Self, NamespaceError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(NamespaceError::Empty);
        }
        let len = trimmed.chars().count();
        if len > NAMESPACE_MAX_CHARS {
            return Err(NamespaceError::TooLong(len));
        }
        if !NAMESPACE_RE.is_match(trimmed) {
            return Err(NamespaceError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0
    }
}
