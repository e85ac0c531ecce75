use std::collections::HashSet;

use super::error::ServiceError;

/// The fixed set of repositories this service may query.
#[derive(Clone, Debug, Default)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, repository: &str) -> bool {
        self.names.contains(repository)
    }

    /// Fail with [`ServiceError::NotAllowed`] unless the repository is listed.
    pub fn check(&self, repository: &str) -> Result<(), ServiceError> {
        if self.is_allowed(repository) {
            Ok(())
        } else {
            Err(ServiceError::NotAllowed(repository.to_string()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Allowed names in a stable order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership() {
        let allow = AllowList::new(["charts/app", "charts/db"]);
        assert!(allow.is_allowed("charts/app"));
        assert!(!allow.is_allowed("charts/other"));
        assert!(allow.check("charts/db").is_ok());
        assert_eq!(
            allow.check("charts/other"),
            Err(ServiceError::NotAllowed("charts/other".to_string()))
        );
    }

    #[test]
    fn names_are_sorted_and_deduplicated() {
        let allow = AllowList::new(["b", "a", "b"]);
        assert_eq!(allow.len(), 2);
        assert_eq!(allow.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_list_allows_nothing() {
        let allow = AllowList::default();
        assert!(allow.is_empty());
        assert!(!allow.is_allowed(""));
    }
}
