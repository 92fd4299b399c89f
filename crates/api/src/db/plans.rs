//! Plan (pricing tier) query builders.

use sea_query::{Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Plans;

/// Column order must match `plan_from_row()`.
fn plan_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.columns([
        Plans::Id,
        Plans::Name,
        Plans::PriceCents,
        Plans::Credits,
        Plans::Description,
        Plans::IsActive,
    ])
}

/// Plans offered publicly, cheapest first.
pub fn list_active() -> Built {
    let mut q = Query::select().to_owned();
    plan_columns(&mut q);
    q.from(Plans::Table)
        .and_where(Expr::col(Plans::IsActive).eq(true))
        .order_by(Plans::PriceCents, Order::Asc)
        .order_by(Plans::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// SELECT one plan.
pub fn get_by_id(id: &str) -> Built {
    let mut q = Query::select().to_owned();
    plan_columns(&mut q);
    q.from(Plans::Table)
        .and_where(Expr::col(Plans::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Check a plan exists.
pub fn exists(id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Plans::Table)
        .and_where(Expr::col(Plans::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// INSERT a plan.
pub fn insert(
    id: &str,
    name: &str,
    price_cents: i64,
    credits: i64,
    description: Option<&str>,
    is_active: bool,
) -> Built {
    Query::insert()
        .into_table(Plans::Table)
        .columns([
            Plans::Id,
            Plans::Name,
            Plans::PriceCents,
            Plans::Credits,
            Plans::Description,
            Plans::IsActive,
        ])
        .values_panic([
            id.into(),
            name.into(),
            price_cents.into(),
            credits.into(),
            description.map(str::to_string).into(),
            is_active.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Fields a plan update may change.
#[derive(Default)]
pub struct UpdateParams<'a> {
    pub name: Option<&'a str>,
    pub price_cents: Option<i64>,
    pub credits: Option<i64>,
    pub description: Option<&'a str>,
    pub is_active: Option<bool>,
}

/// UPDATE a plan. `None` when nothing would change.
pub fn update(id: &str, p: &UpdateParams<'_>) -> Option<Built> {
    let mut q = Query::update();
    q.table(Plans::Table);
    let mut changed = false;
    if let Some(name) = p.name {
        q.value(Plans::Name, name);
        changed = true;
    }
    if let Some(price) = p.price_cents {
        q.value(Plans::PriceCents, price);
        changed = true;
    }
    if let Some(credits) = p.credits {
        q.value(Plans::Credits, credits);
        changed = true;
    }
    if let Some(description) = p.description {
        q.value(Plans::Description, description);
        changed = true;
    }
    if let Some(active) = p.is_active {
        q.value(Plans::IsActive, active);
        changed = true;
    }
    if !changed {
        return None;
    }
    q.and_where(Expr::col(Plans::Id).eq(id));
    Some(q.build(SqliteQueryBuilder))
}

/// DELETE a plan. Users on it keep their credits; `plan_id` is nulled by FK.
pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Plans::Table)
        .and_where(Expr::col(Plans::Id).eq(id))
        .build(SqliteQueryBuilder)
}
