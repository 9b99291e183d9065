//! Preprocessing-token scanner for C source files.
//!
//! The scanner turns one registered file's bytes into a lazy stream of
//! [`token::Token`]s, each carrying the whitespace and comments that preceded
//! it, so the original input can be reconstructed byte for byte.

pub mod literal;
pub mod scanner;
pub mod token;
pub mod token_stream;
