//! Search module - filter expression types and SQL generation.
//!
//! This module turns a client-supplied filter tree such as
//! `company CONTAINS "Acme" AND (source = "linkedin" OR reposted = 1)`
//! into a parameterized SELECT over the application table.

pub mod filters;
pub mod query;

pub use filters::*;
pub use query::{compile, render_literal, CompiledQuery, SqlParam};
