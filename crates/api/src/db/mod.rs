//! Shared database schema, migrations, and query builders.
//!
//! Every statement the server runs is built here so column names live in
//! one place (`tables`).

pub mod activity;
pub mod migrations;
pub mod plans;
pub mod printers;
pub mod projects;
pub mod settings;
pub mod tables;
pub mod templates;
pub mod users;

// Re-export tables for convenience
pub use tables::*;

/// A built statement: SQL text plus its bound values.
pub type Built = (String, sea_query::Values);

/// SQLite expression for "now" in the same format as column defaults.
pub(crate) fn now() -> sea_query::SimpleExpr {
    sea_query::Expr::cust("datetime('now')")
}
