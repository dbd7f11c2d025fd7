//! Fully qualified container image references.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A pull string of the form `registry/repository:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Build a reference from a registry root, a repository name and a tag.
    ///
    /// Trailing slashes on the registry root are ignored, so
    /// `registry.example.com/org/` and `registry.example.com/org` produce
    /// the same image.
    pub fn new(registry_root: &str, repository: &str, tag: &str) -> CoreResult<Self> {
        let registry = registry_root.trim().trim_end_matches('/');
        if registry.is_empty() {
            return Err(CoreError::InvalidImage("empty registry root".to_string()));
        }
        let repository = repository.trim().trim_matches('/');
        if repository.is_empty() {
            return Err(CoreError::InvalidImage("empty repository name".to_string()));
        }
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(CoreError::InvalidImage(format!(
                "empty tag for {registry}/{repository}"
            )));
        }
        if tag.contains(['/', ':', '@']) || tag.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidImage(format!("invalid tag: {tag}")));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}
