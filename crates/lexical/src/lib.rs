//! Lexical search over a scroll-capable store
//!
//! Turns the `LexicalStore` scroll capability into a scored top-K keyword
//! search with field boosting. Emits per-term hit records and token
//! positions so the keyword-points rescorer can reason about proximity
//! and placement downstream.

pub mod adapter;
pub mod tokenize;

pub use adapter::{LexicalSearchAdapter, LexicalSearchRequest};
pub use tokenize::{tokenize_query, STOPLIST};
