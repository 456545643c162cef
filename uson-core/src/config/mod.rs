//! Configuration types
//!
//! Link timing configuration, stored as postcard binary data.

pub mod link;

pub use link::*;
