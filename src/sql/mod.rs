//! SQL emission.
//!
//! - [`token`] - Token types and the [`TokenStream`] the compiler writes to

pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use token::{quote_ident, Token, TokenStream};
