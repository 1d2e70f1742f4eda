//! Common utilities and types shared across npm-bisect crates.

pub mod error;
pub mod filter;
pub mod timestamp;

pub use error::{Error, Result};
pub use filter::PackageFilter;
pub use timestamp::Timestamp;
