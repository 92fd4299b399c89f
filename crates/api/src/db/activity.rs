//! Audit trail query builders.

use sea_query::{Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{UserActivity, Users};
use crate::ActivityAction;

/// Record one activity row.
pub fn insert(user_id: &str, action: ActivityAction, detail: Option<&str>) -> Built {
    Query::insert()
        .into_table(UserActivity::Table)
        .columns([
            UserActivity::UserId,
            UserActivity::Action,
            UserActivity::Detail,
        ])
        .values_panic([
            user_id.into(),
            action.as_str().into(),
            detail.map(str::to_string).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Most recent activity with the user's email. Column order matches
/// `activity_from_row()`.
pub fn recent(limit: u32) -> Built {
    Query::select()
        .column((UserActivity::Table, UserActivity::Id))
        .column((UserActivity::Table, UserActivity::UserId))
        .column((Users::Table, Users::Email))
        .column((UserActivity::Table, UserActivity::Action))
        .column((UserActivity::Table, UserActivity::Detail))
        .column((UserActivity::Table, UserActivity::CreatedAt))
        .from(UserActivity::Table)
        .left_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((UserActivity::Table, UserActivity::UserId)),
        )
        .order_by((UserActivity::Table, UserActivity::Id), Order::Desc)
        .limit(limit as u64)
        .build(SqliteQueryBuilder)
}

/// Count rows of one action kind.
pub fn count_by_action(action: ActivityAction) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(UserActivity::Table)
        .and_where(Expr::col(UserActivity::Action).eq(action.as_str()))
        .build(SqliteQueryBuilder)
}
