use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bookstore_core::{
    AuthorId, BookId, CategoryId, DomainError, DomainResult, Entity, Money, ValueObject,
};

/// Longest ISBN the store accepts (column is `VARCHAR(20)`).
pub const ISBN_MAX_LEN: usize = 20;

/// International Standard Book Number, as written on the cover.
///
/// Hyphens are kept verbatim because lookups are exact matches against the
/// stored column. The check digit is not verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl ValueObject for Isbn {}

impl Isbn {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DomainError::validation("isbn must not be empty"));
        }
        if s.len() > ISBN_MAX_LEN {
            return Err(DomainError::validation(format!(
                "isbn '{s}' is longer than {ISBN_MAX_LEN} characters"
            )));
        }
        if !s.chars().any(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(format!("isbn '{s}' contains no digits")));
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_digit() || *c == '-' || *c == 'X' || *c == 'x'))
        {
            return Err(DomainError::validation(format!(
                "isbn '{s}' contains invalid character '{bad}'"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// A lookup key taken as given: trimmed, non-blank, otherwise unchecked.
    ///
    /// A key that no stored book carries simply matches nothing.
    pub fn lookup(raw: &str) -> DomainResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DomainError::validation("isbn must not be empty"));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Isbn {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Isbn::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(value: Isbn) -> Self {
        value.0
    }
}

impl core::fmt::Display for Isbn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an order line names the book it wants: by ISBN or by primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookRef {
    Isbn(Isbn),
    Id(BookId),
}

impl BookRef {
    /// Anything that parses as a UUID is a book id; any other non-blank
    /// string is an ISBN lookup key.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let s = raw.trim();
        if let Ok(uuid) = Uuid::parse_str(s) {
            return Ok(BookRef::Id(BookId::from_uuid(uuid)));
        }
        Isbn::lookup(s).map(BookRef::Isbn)
    }
}

impl From<Isbn> for BookRef {
    fn from(value: Isbn) -> Self {
        BookRef::Isbn(value)
    }
}

impl From<BookId> for BookRef {
    fn from(value: BookId) -> Self {
        BookRef::Id(value)
    }
}

impl core::fmt::Display for BookRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BookRef::Isbn(isbn) => core::fmt::Display::fmt(isbn, f),
            BookRef::Id(id) => core::fmt::Display::fmt(id, f),
        }
    }
}

/// A sellable book with its current price and stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    id: BookId,
    isbn: Isbn,
    title: String,
    author_id: Option<AuthorId>,
    category_id: Option<CategoryId>,
    price: Money,
    stock_quantity: i32,
}

impl Book {
    pub fn new(
        id: BookId,
        isbn: Isbn,
        title: impl Into<String>,
        price: Money,
        stock_quantity: i32,
    ) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::validation("book title must not be empty"));
        }
        if stock_quantity < 0 {
            return Err(DomainError::invariant(format!(
                "stock_quantity must be non-negative, got {stock_quantity}"
            )));
        }
        Ok(Self {
            id,
            isbn,
            title,
            author_id: None,
            category_id: None,
            price,
            stock_quantity,
        })
    }

    pub fn with_author(mut self, author_id: AuthorId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn id_typed(&self) -> BookId {
        self.id
    }

    pub fn isbn(&self) -> &Isbn {
        &self.isbn
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author_id(&self) -> Option<AuthorId> {
        self.author_id
    }

    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock_quantity(&self) -> i32 {
        self.stock_quantity
    }

    pub fn matches(&self, book_ref: &BookRef) -> bool {
        match book_ref {
            BookRef::Isbn(isbn) => &self.isbn == isbn,
            BookRef::Id(id) => &self.id == id,
        }
    }

    pub fn can_supply(&self, quantity: i32) -> bool {
        quantity >= 0 && self.stock_quantity >= quantity
    }

    /// Remove `quantity` units from stock.
    pub fn take_stock(&mut self, quantity: i32) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !self.can_supply(quantity) {
            return Err(DomainError::invariant(format!(
                "cannot take {quantity} units of {}: only {} in stock",
                self.isbn, self.stock_quantity
            )));
        }
        self.stock_quantity -= quantity;
        Ok(())
    }

    pub fn set_price(&mut self, price: Money) {
        self.price = price;
    }
}

impl Entity for Book {
    type Id = BookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(stock: i32) -> Book {
        Book::new(
            BookId::new(),
            Isbn::parse("978-0451524935").unwrap(),
            "1984",
            Money::from_cents(1299),
            stock,
        )
        .unwrap()
    }

    #[test]
    fn isbn_accepts_hyphens_and_check_letter() {
        assert_eq!(Isbn::parse(" 0-8044-2957-X ").unwrap().as_str(), "0-8044-2957-X");
    }

    #[test]
    fn isbn_rejects_bad_input() {
        assert!(Isbn::parse("").is_err());
        assert!(Isbn::parse("   ").is_err());
        assert!(Isbn::parse("----").is_err());
        assert!(Isbn::parse("978 0451524935").is_err());
        assert!(Isbn::parse("978-0451524935-0000000").is_err());
    }

    #[test]
    fn book_ref_prefers_uuid() {
        let id = BookId::new();
        assert_eq!(BookRef::parse(&id.to_string()).unwrap(), BookRef::Id(id));
        assert_eq!(
            BookRef::parse("9780451524935").unwrap(),
            BookRef::Isbn(Isbn::parse("9780451524935").unwrap())
        );
    }

    #[test]
    fn book_ref_keeps_unusual_isbn_keys() {
        let long = "1".repeat(ISBN_MAX_LEN + 5);
        for raw in ["ISBN 0-00", "no-such-book", long.as_str()] {
            assert_eq!(BookRef::parse(raw).unwrap().to_string(), raw);
        }
        assert!(BookRef::parse("  ").is_err());
    }

    #[test]
    fn book_ref_display_is_the_raw_identifier() {
        assert_eq!(BookRef::parse("978-1").unwrap().to_string(), "978-1");
    }

    #[test]
    fn new_rejects_negative_stock() {
        let err = Book::new(
            BookId::new(),
            Isbn::parse("1").unwrap(),
            "t",
            Money::ZERO,
            -1,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn matches_by_isbn_or_id() {
        let b = book(1);
        assert!(b.matches(&BookRef::Id(b.id_typed())));
        assert!(b.matches(&BookRef::Isbn(b.isbn().clone())));
        assert!(!b.matches(&BookRef::Id(BookId::new())));
    }

    #[test]
    fn take_stock_never_goes_negative() {
        let mut b = book(3);
        b.take_stock(2).unwrap();
        assert_eq!(b.stock_quantity(), 1);
        assert!(b.take_stock(2).is_err());
        assert_eq!(b.stock_quantity(), 1);
        b.take_stock(1).unwrap();
        assert_eq!(b.stock_quantity(), 0);
    }
}
