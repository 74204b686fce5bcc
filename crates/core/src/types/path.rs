//! Library-relative item paths

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slash-delimited key identifying a library item relative to the library root
///
/// Paths never start or end with `/`, contain no empty segments and no
/// `.`/`..` components, so two items are equal exactly when their strings are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Validates and wraps a relative path
    pub fn new(path: impl Into<String>) -> Result<Self, AppError> {
        let path = path.into();
        let invalid = |reason: &str| AppError::InvalidPath {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("path is empty"));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(invalid("path must not start or end with '/'"));
        }
        for segment in path.split('/') {
            match segment {
                "" => return Err(invalid("path contains an empty segment")),
                "." | ".." => return Err(invalid("path contains a relative component")),
                _ => {}
            }
        }

        Ok(Self(path))
    }

    /// Returns the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment of the path
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Containing folder, or `None` for items at the library root
    pub fn parent(&self) -> Option<RelativePath> {
        self.0
            .rfind('/')
            .map(|index| RelativePath(self.0[..index].to_string()))
    }

    /// Appends a single child segment
    pub fn join(&self, name: &str) -> Result<RelativePath, AppError> {
        RelativePath::new(format!("{}/{}", self.0, name))
    }

    /// Replaces the last segment
    pub fn with_file_name(&self, name: &str) -> Result<RelativePath, AppError> {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => RelativePath::new(name),
        }
    }

    /// True if `other` lives somewhere below this path
    pub fn is_ancestor_of(&self, other: &RelativePath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// True if the paths are equal or one contains the other
    pub fn overlaps(&self, other: &RelativePath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelativePath::new(value)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        RelativePath::new(value)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(RelativePath::new("").is_err());
        assert!(RelativePath::new("/books/a.mp3").is_err());
        assert!(RelativePath::new("books/").is_err());
        assert!(RelativePath::new("books//a.mp3").is_err());
        assert!(RelativePath::new("books/../a.mp3").is_err());
    }

    #[test]
    fn test_parent_and_file_name() {
        let p = path("fantasy/tolkien/hobbit.m4b");
        assert_eq!(p.file_name(), "hobbit.m4b");
        assert_eq!(p.parent(), Some(path("fantasy/tolkien")));
        assert_eq!(path("hobbit.m4b").parent(), None);
    }

    #[test]
    fn test_with_file_name() {
        let p = path("fantasy/old-name");
        assert_eq!(p.with_file_name("new-name").unwrap(), path("fantasy/new-name"));
        assert_eq!(path("root").with_file_name("other").unwrap(), path("other"));
    }

    #[test]
    fn test_ancestry_respects_segment_boundaries() {
        let folder = path("fantasy");
        assert!(folder.is_ancestor_of(&path("fantasy/hobbit.m4b")));
        assert!(!folder.is_ancestor_of(&path("fantasy-extra/book.mp3")));
        assert!(!folder.is_ancestor_of(&folder));
    }

    #[test]
    fn test_overlaps() {
        let folder = path("fantasy");
        let book = path("fantasy/hobbit.m4b");
        assert!(folder.overlaps(&book));
        assert!(book.overlaps(&folder));
        assert!(book.overlaps(&book));
        assert!(!book.overlaps(&path("scifi/dune.mp3")));
    }

    #[test]
    fn test_serde_validates() {
        let ok: RelativePath = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(ok, path("a/b"));
        assert!(serde_json::from_str::<RelativePath>("\"/a\"").is_err());
    }
}
