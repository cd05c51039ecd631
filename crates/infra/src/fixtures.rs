//! Sample bookstore dataset for tests, benches and local experiments.

use chrono::Utc;
use rust_decimal::Decimal;

use bookstore_catalog::{Author, Book, Category, Isbn, Rating, Review};
use bookstore_core::{AuthorId, BookId, CategoryId, CustomerId, DomainResult, Money, ReviewId};
use bookstore_customers::{Customer, Email};

use crate::store::{BookstoreState, InMemoryStore};

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const CAROL: &str = "carol@example.com";

/// 1984, 12.99, 50 in stock.
pub const NINETEEN_EIGHTY_FOUR: &str = "978-0451524935";
/// Animal Farm, 9.99, 40 in stock.
pub const ANIMAL_FARM: &str = "978-0451526342";
/// Harry Potter and the Philosopher's Stone, 19.99, 100 in stock.
pub const PHILOSOPHERS_STONE: &str = "978-0747532699";
/// Murder on the Orient Express, 14.50, 25 in stock.
pub const MURDER_ON_THE_ORIENT_EXPRESS: &str = "978-0062693662";
/// The Hobbit, 15.00, 3 in stock.
pub const THE_HOBBIT: &str = "978-0547928227";
/// I, Robot, 11.25, 0 in stock, no reviews.
pub const I_ROBOT: &str = "978-0553382563";

/// Every sample ISBN, in catalog order.
pub const BOOK_ISBNS: [&str; 6] = [
    NINETEEN_EIGHTY_FOUR,
    ANIMAL_FARM,
    PHILOSOPHERS_STONE,
    MURDER_ON_THE_ORIENT_EXPRESS,
    THE_HOBBIT,
    I_ROBOT,
];

struct BookRow {
    isbn: &'static str,
    title: &'static str,
    author: usize,
    category: usize,
    cents: u64,
    stock: i32,
}

const AUTHORS: [(&str, i32); 5] = [
    ("George Orwell", 1903),
    ("J.K. Rowling", 1965),
    ("Agatha Christie", 1890),
    ("J.R.R. Tolkien", 1892),
    ("Isaac Asimov", 1920),
];

const CATEGORIES: [(&str, &str); 4] = [
    ("Fiction", "Literary and general fiction"),
    ("Fantasy", "Magic, quests and other worlds"),
    ("Mystery", "Crime and detective stories"),
    ("Science Fiction", "Robots, space and the future"),
];

const BOOKS: [BookRow; 6] = [
    BookRow { isbn: NINETEEN_EIGHTY_FOUR, title: "1984", author: 0, category: 0, cents: 1299, stock: 50 },
    BookRow { isbn: ANIMAL_FARM, title: "Animal Farm", author: 0, category: 0, cents: 999, stock: 40 },
    BookRow { isbn: PHILOSOPHERS_STONE, title: "Harry Potter and the Philosopher's Stone", author: 1, category: 1, cents: 1999, stock: 100 },
    BookRow { isbn: MURDER_ON_THE_ORIENT_EXPRESS, title: "Murder on the Orient Express", author: 2, category: 2, cents: 1450, stock: 25 },
    BookRow { isbn: THE_HOBBIT, title: "The Hobbit", author: 3, category: 1, cents: 1500, stock: 3 },
    BookRow { isbn: I_ROBOT, title: "I, Robot", author: 4, category: 3, cents: 1125, stock: 0 },
];

const CUSTOMERS: [(&str, &str, &str, &str); 3] = [
    ("Alice", "Johnson", ALICE, "555-0101"),
    ("Bob", "Smith", BOB, "555-0102"),
    ("Carol", "Davis", CAROL, "555-0103"),
];

/// (book index, customer index, stars)
const REVIEWS: [(usize, usize, i32); 6] = [
    (0, 0, 5),
    (0, 1, 4),
    (2, 0, 5),
    (2, 2, 5),
    (3, 1, 3),
    (4, 2, 4),
];

pub fn sample_store() -> DomainResult<InMemoryStore> {
    sample_state().map(InMemoryStore::with_state)
}

/// Build the sample dataset with fresh ids.
pub fn sample_state() -> DomainResult<BookstoreState> {
    let mut state = BookstoreState::new();

    let mut author_ids = Vec::with_capacity(AUTHORS.len());
    for (name, birth_year) in AUTHORS {
        let mut author = Author::new(AuthorId::new(), name)?;
        author.birth_year = Some(birth_year);
        author_ids.push(author.id);
        state.add_author(author)?;
    }

    let mut category_ids = Vec::with_capacity(CATEGORIES.len());
    for (name, description) in CATEGORIES {
        let mut category = Category::new(CategoryId::new(), name)?;
        category.description = Some(description.to_string());
        category_ids.push(category.id);
        state.add_category(category)?;
    }

    let mut book_ids = Vec::with_capacity(BOOKS.len());
    for row in &BOOKS {
        let book = Book::new(
            BookId::new(),
            Isbn::parse(row.isbn)?,
            row.title,
            Money::new(Decimal::new(row.cents as i64, 2))?,
            row.stock,
        )?
        .with_author(author_ids[row.author])
        .with_category(category_ids[row.category]);
        book_ids.push(book.id_typed());
        state.add_book(book)?;
    }

    let mut customer_ids = Vec::with_capacity(CUSTOMERS.len());
    for (first, last, email, phone) in CUSTOMERS {
        let mut customer = Customer::new(CustomerId::new(), first, last, Email::parse(email)?);
        customer.phone = Some(phone.to_string());
        customer_ids.push(customer.id);
        state.add_customer(customer)?;
    }

    for (book, customer, stars) in REVIEWS {
        state.add_review(Review {
            id: ReviewId::new(),
            book_id: book_ids[book],
            customer_id: customer_ids[customer],
            rating: Rating::new(stars)?,
            comment: None,
            created_at: Utc::now(),
        })?;
    }

    Ok(state)
}
