//! Template query builders.

use sea_query::{Asterisk, Cond, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Templates;

/// Column order must match `template_from_row()`.
fn template_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.columns([
        Templates::Id,
        Templates::Name,
        Templates::Category,
        Templates::WidthMm,
        Templates::HeightMm,
        Templates::CreatedAt,
    ])
}

fn owned_by(id: &str, user_id: &str) -> sea_query::Condition {
    Cond::all()
        .add(Expr::col(Templates::Id).eq(id))
        .add(Expr::col(Templates::UserId).eq(user_id))
}

/// INSERT a new template.
pub fn insert(
    id: &str,
    user_id: &str,
    name: &str,
    category: Option<&str>,
    width_mm: f64,
    height_mm: f64,
) -> Built {
    Query::insert()
        .into_table(Templates::Table)
        .columns([
            Templates::Id,
            Templates::UserId,
            Templates::Name,
            Templates::Category,
            Templates::WidthMm,
            Templates::HeightMm,
        ])
        .values_panic([
            id.into(),
            user_id.into(),
            name.into(),
            category.map(str::to_string).into(),
            width_mm.into(),
            height_mm.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// List a user's templates alphabetically.
pub fn list_for_user(user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    template_columns(&mut q);
    q.from(Templates::Table)
        .and_where(Expr::col(Templates::UserId).eq(user_id))
        .order_by(Templates::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// SELECT one template owned by the user.
pub fn get_for_user(id: &str, user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    template_columns(&mut q);
    q.from(Templates::Table)
        .cond_where(owned_by(id, user_id))
        .build(SqliteQueryBuilder)
}

/// UPDATE a template. `None` when nothing would change.
pub fn update(
    id: &str,
    user_id: &str,
    name: Option<&str>,
    category: Option<&str>,
    width_mm: Option<f64>,
    height_mm: Option<f64>,
) -> Option<Built> {
    if name.is_none() && category.is_none() && width_mm.is_none() && height_mm.is_none() {
        return None;
    }
    let mut q = Query::update();
    q.table(Templates::Table);
    if let Some(name) = name {
        q.value(Templates::Name, name);
    }
    if let Some(category) = category {
        q.value(Templates::Category, category);
    }
    if let Some(w) = width_mm {
        q.value(Templates::WidthMm, w);
    }
    if let Some(h) = height_mm {
        q.value(Templates::HeightMm, h);
    }
    q.cond_where(owned_by(id, user_id));
    Some(q.build(SqliteQueryBuilder))
}

/// DELETE a template owned by the user.
pub fn delete_for_user(id: &str, user_id: &str) -> Built {
    Query::delete()
        .from_table(Templates::Table)
        .cond_where(owned_by(id, user_id))
        .build(SqliteQueryBuilder)
}

/// Count all templates.
pub fn count_all() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Templates::Table)
        .build(SqliteQueryBuilder)
}
