use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_core::{BookId, CustomerId, DomainError, DomainResult, Entity, ReviewId, ValueObject};

/// Star rating, 1 to 5 inclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Rating(u8);

impl ValueObject for Rating {}

impl Rating {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 5;

    pub fn new(stars: i32) -> DomainResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&stars) {
            return Err(DomainError::validation(format!(
                "rating must be between {} and {}, got {stars}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(stars as u8))
    }

    pub fn stars(&self) -> i32 {
        i32::from(self.0)
    }
}

impl TryFrom<i32> for Rating {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for i32 {
    fn from(value: Rating) -> Self {
        value.stars()
    }
}

/// A customer's review of a book. At most one per (book, customer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub book_id: BookId,
    pub customer_id: CustomerId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Review {
    type Id = ReviewId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_range() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(1).unwrap().stars(), 1);
        assert_eq!(Rating::new(5).unwrap().stars(), 5);
    }
}
