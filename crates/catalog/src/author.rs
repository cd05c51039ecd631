use serde::{Deserialize, Serialize};

use bookstore_core::{AuthorId, DomainError, DomainResult, Entity};

/// A book author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub email: Option<String>,
    pub birth_year: Option<i32>,
}

impl Author {
    pub fn new(id: AuthorId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("author name must not be empty"));
        }
        Ok(Self {
            id,
            name,
            email: None,
            birth_year: None,
        })
    }

    /// Case-insensitive substring match on the author's name.
    pub fn name_contains(&self, fragment: &str) -> bool {
        self.name.to_lowercase().contains(&fragment.to_lowercase())
    }
}

impl Entity for Author {
    type Id = AuthorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_ignores_case() {
        let a = Author::new(AuthorId::new(), "Agatha Christie").unwrap();
        assert!(a.name_contains("agatha"));
        assert!(a.name_contains("CHRIST"));
        assert!(a.name_contains(""));
        assert!(!a.name_contains("Orwell"));
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(Author::new(AuthorId::new(), "  ").is_err());
    }
}
