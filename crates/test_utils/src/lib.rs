//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! payment distribution test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built units, dates and bills
//! - `builders`: Builders for bills and an in-memory engine harness
//! - `assertions`: Assertion helpers for previews
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
