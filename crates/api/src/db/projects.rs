//! Project query builders. Every statement is scoped to the owning user.

use sea_query::{Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::tables::Projects;
use super::{Built, now};

// ── Helpers ────────────────────────────────────────────────────────────────

/// Summary columns. Order must match `project_summary_from_row()`.
fn summary_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.columns([
        Projects::Id,
        Projects::Name,
        Projects::TemplateId,
        Projects::WidthMm,
        Projects::HeightMm,
        Projects::OffsetX,
        Projects::OffsetY,
        Projects::Thumbnail,
        Projects::CreatedAt,
        Projects::UpdatedAt,
    ])
}

/// Number of columns emitted by `summary_columns`; the detail query appends
/// `canvas_json` after them.
pub const SUMMARY_COLUMN_COUNT: usize = 10;

fn owned_by(id: &str, user_id: &str) -> sea_query::Condition {
    sea_query::Cond::all()
        .add(Expr::col(Projects::Id).eq(id))
        .add(Expr::col(Projects::UserId).eq(user_id))
}

// ── Queries ────────────────────────────────────────────────────────────────

/// Parameters for inserting a project.
pub struct InsertParams<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub name: &'a str,
    pub canvas_json: &'a str,
    pub template_id: Option<&'a str>,
    pub width_mm: f64,
    pub height_mm: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub thumbnail: Option<&'a str>,
}

/// INSERT a new project.
pub fn insert(p: &InsertParams<'_>) -> Built {
    Query::insert()
        .into_table(Projects::Table)
        .columns([
            Projects::Id,
            Projects::UserId,
            Projects::Name,
            Projects::CanvasJson,
            Projects::TemplateId,
            Projects::WidthMm,
            Projects::HeightMm,
            Projects::OffsetX,
            Projects::OffsetY,
            Projects::Thumbnail,
        ])
        .values_panic([
            p.id.into(),
            p.user_id.into(),
            p.name.into(),
            p.canvas_json.into(),
            p.template_id.map(str::to_string).into(),
            p.width_mm.into(),
            p.height_mm.into(),
            p.offset_x.into(),
            p.offset_y.into(),
            p.thumbnail.map(str::to_string).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// List a user's projects, most recently updated first.
pub fn list_for_user(user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    summary_columns(&mut q);
    q.from(Projects::Table)
        .and_where(Expr::col(Projects::UserId).eq(user_id))
        .order_by(Projects::UpdatedAt, Order::Desc)
        .order_by(Projects::CreatedAt, Order::Desc)
        .build(SqliteQueryBuilder)
}

/// Fetch one project with its canvas document.
pub fn get_for_user(id: &str, user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    summary_columns(&mut q);
    q.column(Projects::CanvasJson)
        .from(Projects::Table)
        .cond_where(owned_by(id, user_id))
        .build(SqliteQueryBuilder)
}

/// Check a project exists and belongs to the user.
pub fn exists_for_user(id: &str, user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Projects::Table)
        .cond_where(owned_by(id, user_id))
        .build(SqliteQueryBuilder)
}

/// Fields a project update may change. `None` leaves the column as is.
#[derive(Default)]
pub struct UpdateParams<'a> {
    pub name: Option<&'a str>,
    pub canvas_json: Option<&'a str>,
    pub width_mm: Option<f64>,
    pub height_mm: Option<f64>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub thumbnail: Option<&'a str>,
}

/// UPDATE a project. Always bumps `updated_at`.
pub fn update(id: &str, user_id: &str, p: &UpdateParams<'_>) -> Built {
    let mut q = Query::update();
    q.table(Projects::Table).value(Projects::UpdatedAt, now());
    if let Some(name) = p.name {
        q.value(Projects::Name, name);
    }
    if let Some(canvas) = p.canvas_json {
        q.value(Projects::CanvasJson, canvas);
    }
    if let Some(w) = p.width_mm {
        q.value(Projects::WidthMm, w);
    }
    if let Some(h) = p.height_mm {
        q.value(Projects::HeightMm, h);
    }
    if let Some(x) = p.offset_x {
        q.value(Projects::OffsetX, x);
    }
    if let Some(y) = p.offset_y {
        q.value(Projects::OffsetY, y);
    }
    if let Some(thumb) = p.thumbnail {
        q.value(Projects::Thumbnail, thumb);
    }
    q.cond_where(owned_by(id, user_id))
        .build(SqliteQueryBuilder)
}

/// DELETE a project owned by the user.
pub fn delete_for_user(id: &str, user_id: &str) -> Built {
    Query::delete()
        .from_table(Projects::Table)
        .cond_where(owned_by(id, user_id))
        .build(SqliteQueryBuilder)
}

/// Count all projects.
pub fn count_all() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Projects::Table)
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_always_touches_updated_at_and_scopes_by_owner() {
        let (sql, values) = update("p1", "u1", &UpdateParams::default());
        assert!(sql.contains("\"updated_at\" = datetime('now')"));
        assert!(sql.contains("\"user_id\" = ?"));
        assert_eq!(values.0.len(), 2);
    }

    #[test]
    fn detail_query_appends_canvas_column() {
        let (sql, _) = get_for_user("p1", "u1");
        let canvas_pos = sql.find("\"canvas_json\"").unwrap();
        let updated_pos = sql.find("\"updated_at\"").unwrap();
        assert!(canvas_pos > updated_pos);
    }
}
