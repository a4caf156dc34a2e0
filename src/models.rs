use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorName(String);

impl AuthorName {
    pub fn new(raw: &str) -> Result<Self, AuthorNameEmptyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Err(AuthorNameEmptyError)
        } else {
            Ok(Self(trimmed.into()))
        }
    }

    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuthorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
#[error("Author name cannot be empty")]
pub struct AuthorNameEmptyError;

#[derive(Debug, Clone)]
pub struct Author {
    id: i64,
    name: AuthorName,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Author {
    pub const fn new(
        id: i64,
        name: AuthorName,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &AuthorName {
        &self.name
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// A book together with the ids of every author it is linked to. The id order
/// carries no meaning; the linked set is what the storage layer keeps in step
/// with the link table.
#[derive(Debug, Clone)]
pub struct Book {
    id: i64,
    name: String,
    author_ids: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Book {
    pub const fn new(
        id: i64,
        name: String,
        author_ids: Vec<i64>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            author_ids,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn author_ids(&self) -> &[i64] {
        &self.author_ids
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Every failure the storage layer reports. Driver errors never cross this
/// boundary raw; they are classified into one of the not-found kinds or kept
/// opaque.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("author does not exist")]
    AuthorNotFound,
    #[error("book does not exist")]
    BookNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_name_trims_whitespace() {
        let name = AuthorName::new("  Ursula K. Le Guin ").unwrap();
        assert_eq!(name.as_str(), "Ursula K. Le Guin");
    }

    #[test]
    fn author_name_rejects_empty() {
        assert!(AuthorName::new("").is_err());
        assert!(AuthorName::new("   ").is_err());
    }
}
