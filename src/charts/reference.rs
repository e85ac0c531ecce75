//! Shape caller supplied strings into validated chart requests.
//!
//! Nothing here talks to the network or consults the allow-list.
use std::fmt::Display;

use super::error::ServiceError;

/// Which version of a chart is wanted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selector {
    Tag(String),
    Digest(String),
}

impl Selector {
    /// Build a selector from optional tag and digest strings.
    ///
    /// Empty strings count as absent.
    pub fn from_parts(
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Option<Self>, ServiceError> {
        let tag = tag.filter(|t| !t.is_empty());
        let digest = digest.filter(|d| !d.is_empty());

        match (tag, digest) {
            (Some(_), Some(_)) => Err(ServiceError::InvalidRequest(
                "tag and digest cannot be specified simultaneously".to_string(),
            )),
            (Some(tag), None) => Ok(Some(Self::Tag(tag.to_string()))),
            (None, Some(digest)) => Ok(Some(Self::Digest(digest.to_string()))),
            (None, None) => Ok(None),
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "tag: {tag}"),
            Self::Digest(digest) => write!(f, "digest: {digest}"),
        }
    }
}

/// A repository plus an optional version selector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChartReference {
    pub repository: String,
    pub selector: Option<Selector>,
}

impl ChartReference {
    /// Validate input for a describe call. The selector may be omitted.
    pub fn for_describe(
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let repository = require_repository(repository)?;
        let selector = Selector::from_parts(tag, digest)?;
        Ok(Self {
            repository,
            selector,
        })
    }
}

impl Display for ChartReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.selector {
            Some(Selector::Tag(tag)) => write!(f, "{}:{tag}", self.repository),
            Some(Selector::Digest(digest)) => write!(f, "{}@{digest}", self.repository),
            None => f.write_str(&self.repository),
        }
    }
}

/// A validated request for one file inside a chart archive.
///
/// Unlike [`ChartReference`], the selector is mandatory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileRequest {
    pub repository: String,
    pub selector: Selector,
    pub file_name: String,
}

impl FileRequest {
    pub fn new(
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
        file_name: &str,
    ) -> Result<Self, ServiceError> {
        let repository = require_repository(repository)?;
        if file_name.is_empty() {
            return Err(ServiceError::InvalidRequest("missing file name".to_string()));
        }
        let selector = Selector::from_parts(tag, digest)?.ok_or_else(|| {
            ServiceError::InvalidRequest("tag or digest is required".to_string())
        })?;

        Ok(Self {
            repository,
            selector,
            file_name: file_name.to_string(),
        })
    }
}

fn require_repository(repository: &str) -> Result<String, ServiceError> {
    let repository = repository.trim();
    if repository.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "missing repository name".to_string(),
        ));
    }
    Ok(repository.to_string())
}
