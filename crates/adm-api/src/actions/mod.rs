//! Reusable request actions.

pub mod index;

pub use index::index;
