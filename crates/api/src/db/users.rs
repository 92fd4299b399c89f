//! User / auth query builders.

use sea_query::{Asterisk, Cond, Expr, Func, LikeExpr, Order, Query, SqliteQueryBuilder};

use super::tables::Users;
use super::{Built, now};
use crate::Role;

/// Result of building a paginated user list query.
pub struct BuiltUserListQuery {
    pub count_query: Built,
    pub select_query: Built,
    pub page: u32,
    pub per_page: u32,
}

// ── Helpers ────────────────────────────────────────────────────────────────

const LIKE_ESCAPE: char = '!';

/// `%term%` with LIKE wildcards in `term` escaped so they match literally.
fn contains_pattern(term: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, LIKE_ESCAPE | '%' | '_') {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}

/// Add the profile columns to a SELECT.
/// Column order must match `profile_from_row()` positional mappers.
fn profile_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.columns([
        Users::Id,
        Users::Email,
        Users::Name,
        Users::Role,
        Users::PlanId,
        Users::Credits,
        Users::PrinterModel,
        Users::DefaultOffsetX,
        Users::DefaultOffsetY,
        Users::CreatedAt,
        Users::LastLoginAt,
    ])
}

/// Number of columns emitted by `profile_columns`.
pub const PROFILE_COLUMN_COUNT: usize = 11;

// ── User lookups ───────────────────────────────────────────────────────────

/// Find a user profile by id.
pub fn get_profile(user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    profile_columns(&mut q);
    q.from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Find user by email for login: profile columns followed by
/// `password_hash, password_salt`.
pub fn get_by_email_for_login(email: &str) -> Built {
    let mut q = Query::select().to_owned();
    profile_columns(&mut q);
    q.columns([Users::PasswordHash, Users::PasswordSalt])
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Check email existence.
pub fn email_exists(email: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Get password hash/salt for a user.
pub fn get_password_fields(user_id: &str) -> Built {
    Query::select()
        .columns([Users::PasswordHash, Users::PasswordSalt])
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Remaining credits for a user.
pub fn get_credits(user_id: &str) -> Built {
    Query::select()
        .column(Users::Credits)
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Count all users.
pub fn count_all() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Users::Table)
        .build(SqliteQueryBuilder)
}

/// Paginated admin listing, newest first, optionally filtered by a
/// case-insensitive substring of email or name.
pub fn list(search: Option<&str>, page: u32, per_page: u32) -> BuiltUserListQuery {
    let filter = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let term = s.to_lowercase();
            let name = Expr::expr(Func::lower(Expr::col(Users::Name)));
            Cond::any()
                .add(Expr::col(Users::Email).like(contains_pattern(&term)))
                .add(name.like(contains_pattern(&term)))
        });

    let mut count = Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Users::Table)
        .to_owned();
    let mut select = Query::select().to_owned();
    profile_columns(&mut select);
    select
        .from(Users::Table)
        .order_by(Users::CreatedAt, Order::Desc)
        .order_by(Users::Id, Order::Asc)
        .limit(per_page as u64)
        .offset(((page.saturating_sub(1)) as u64) * per_page as u64);

    if let Some(cond) = filter {
        count.cond_where(cond.clone());
        select.cond_where(cond);
    }

    BuiltUserListQuery {
        count_query: count.build(SqliteQueryBuilder),
        select_query: select.build(SqliteQueryBuilder),
        page,
        per_page,
    }
}

// ── User inserts ───────────────────────────────────────────────────────────

/// Parameters for inserting a user.
pub struct InsertParams<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: &'a str,
    pub password_salt: &'a str,
    pub role: Role,
    pub plan_id: Option<&'a str>,
    pub credits: i64,
}

/// Insert user with email/password.
pub fn insert(p: &InsertParams<'_>) -> Built {
    Query::insert()
        .into_table(Users::Table)
        .columns([
            Users::Id,
            Users::Email,
            Users::Name,
            Users::PasswordHash,
            Users::PasswordSalt,
            Users::Role,
            Users::PlanId,
            Users::Credits,
        ])
        .values_panic([
            p.id.into(),
            p.email.into(),
            p.name.into(),
            p.password_hash.into(),
            p.password_salt.into(),
            p.role.as_str().into(),
            p.plan_id.map(str::to_string).into(),
            p.credits.into(),
        ])
        .build(SqliteQueryBuilder)
}

// ── User updates ───────────────────────────────────────────────────────────

/// Update password.
pub fn update_password(user_id: &str, password_hash: &str, password_salt: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::PasswordHash, password_hash)
        .value(Users::PasswordSalt, password_salt)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Update printer calibration defaults.
///
/// `printer_model`: `None` keeps the stored model, `Some(None)` clears it.
pub fn update_calibration(
    user_id: &str,
    printer_model: Option<Option<&str>>,
    default_offset_x: f64,
    default_offset_y: f64,
) -> Built {
    let mut q = Query::update();
    q.table(Users::Table)
        .value(Users::DefaultOffsetX, default_offset_x)
        .value(Users::DefaultOffsetY, default_offset_y)
        .and_where(Expr::col(Users::Id).eq(user_id));
    if let Some(model) = printer_model {
        q.value(Users::PrinterModel, model.map(str::to_string));
    }
    q.build(SqliteQueryBuilder)
}

/// Stamp `last_login_at`.
pub fn touch_last_login(user_id: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::LastLoginAt, now())
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Take one credit. Affects zero rows when the balance is already empty.
pub fn consume_credit(user_id: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::Credits, Expr::col(Users::Credits).sub(1))
        .and_where(Expr::col(Users::Id).eq(user_id))
        .and_where(Expr::col(Users::Credits).gt(0))
        .build(SqliteQueryBuilder)
}

/// Admin edit of role / plan / credits. `None` when nothing would change.
pub fn admin_update(
    user_id: &str,
    role: Option<Role>,
    plan_id: Option<&str>,
    credits: Option<i64>,
) -> Option<Built> {
    if role.is_none() && plan_id.is_none() && credits.is_none() {
        return None;
    }
    let mut q = Query::update();
    q.table(Users::Table);
    if let Some(role) = role {
        q.value(Users::Role, role.as_str());
    }
    if let Some(plan_id) = plan_id {
        q.value(Users::PlanId, plan_id);
    }
    if let Some(credits) = credits {
        q.value(Users::Credits, credits);
    }
    q.and_where(Expr::col(Users::Id).eq(user_id));
    Some(q.build(SqliteQueryBuilder))
}

/// Delete a user (projects, templates, activity cascade).
pub fn delete(user_id: &str) -> Built {
    Query::delete()
        .from_table(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}
