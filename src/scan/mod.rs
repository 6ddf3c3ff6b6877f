//! Reference scan coordinator populating a [`DirTree`](crate::tree::DirTree)
//! from the local filesystem.

mod listing;
mod scanner;

pub use listing::ListingError;
pub use scanner::{ScanError, Scanner, ScannerCreationError};
