//! Domain identifiers.
//!
//! Job ids are assigned by the caller at enqueue time, so unlike a generated
//! surrogate key they are plain strings. The newtype keeps them from being
//! mixed up with commands or state names at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a job. Globally unique, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Blank ids (empty or whitespace only) are rejected at enqueue.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_bare_string() {
        let id = JobId::new("j1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"j1\"");

        let back: JobId = serde_json::from_str("\"j1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(JobId::new("").is_blank());
        assert!(JobId::new("  \t").is_blank());
        assert!(!JobId::new("job-1").is_blank());
    }
}
