//! Key/value settings query builders.

use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};

use super::tables::Settings;
use super::{Built, now};

/// Well-known setting: `"false"` closes self-service registration.
pub const REGISTRATION_ENABLED: &str = "registration_enabled";
/// Well-known setting: plan id assigned to new accounts.
pub const DEFAULT_PLAN: &str = "default_plan";

/// Value for a single key.
pub fn get(key: &str) -> Built {
    Query::select()
        .column(Settings::Value)
        .from(Settings::Table)
        .and_where(Expr::col(Settings::Key).eq(key))
        .build(SqliteQueryBuilder)
}

/// All `(key, value)` pairs ordered by key.
pub fn list_all() -> Built {
    Query::select()
        .columns([Settings::Key, Settings::Value])
        .from(Settings::Table)
        .order_by(Settings::Key, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Insert or replace one setting.
pub fn upsert(key: &str, value: &str) -> Built {
    Query::insert()
        .into_table(Settings::Table)
        .columns([Settings::Key, Settings::Value, Settings::UpdatedAt])
        .values_panic([key.into(), value.into(), now()])
        .on_conflict(
            OnConflict::column(Settings::Key)
                .update_columns([Settings::Value, Settings::UpdatedAt])
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}
