use serde::{Deserialize, Serialize};

use bookstore_core::{CustomerId, DomainError, DomainResult, Entity, ValueObject};

/// Longest email the store accepts (column is `VARCHAR(150)`).
pub const EMAIL_MAX_LEN: usize = 150;

/// Customer email, the natural key used by callers.
///
/// Only surrounding whitespace is stripped; case is preserved because lookups
/// are exact matches against the unique column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl ValueObject for Email {}

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DomainError::validation("customer email must not be empty"));
        }
        if s.len() > EMAIL_MAX_LEN {
            return Err(DomainError::validation(format!(
                "customer email is longer than {EMAIL_MAX_LEN} characters"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// An email used only to look a customer up: trimmed and non-blank, no
    /// length limit.
    pub fn lookup(raw: &str) -> DomainResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DomainError::validation("customer email must not be empty"));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub phone: Option<String>,
}

impl Customer {
    pub fn new(
        id: CustomerId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: Email,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email,
            phone: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_but_keeps_case() {
        assert_eq!(Email::parse("  Alice@Example.com ").unwrap().as_str(), "Alice@Example.com");
    }

    #[test]
    fn blank_email_is_rejected() {
        assert!(matches!(Email::parse(" \t"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn overlong_email_is_rejected() {
        let long = format!("{}@example.com", "a".repeat(EMAIL_MAX_LEN));
        assert!(Email::parse(&long).is_err());
    }

    #[test]
    fn lookup_accepts_overlong_email() {
        let long = format!("{}@example.com", "a".repeat(EMAIL_MAX_LEN));
        assert_eq!(Email::lookup(&long).unwrap().as_str(), long);
        assert!(Email::lookup("   ").is_err());
    }

    #[test]
    fn full_name_joins_parts() {
        let c = Customer::new(
            CustomerId::new(),
            "Alice",
            "Johnson",
            Email::parse("alice@example.com").unwrap(),
        );
        assert_eq!(c.full_name(), "Alice Johnson");
    }
}
