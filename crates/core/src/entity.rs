//! Row identity.

/// A stored row with a stable identifier.
///
/// Two values with the same id are the same row, possibly observed at
/// different times (a book before and after its stock changed).
pub trait Entity {
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;

    fn same_row(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
