//! Foundational types for the C front-end: the multi-file source registry
//! and the diagnostics it reports positions through.

pub mod errors;
pub mod source;
