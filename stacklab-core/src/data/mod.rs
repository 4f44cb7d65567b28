//! Bar table canonicalization.

pub mod canonicalize;

pub use canonicalize::{canonicalize, DataError};
