use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sublimate_api::db::Built;
use sublimate_api::db::migrations::MIGRATIONS;
use sublimate_api::{
    ActivityEntry, PlanResponse, PrinterModelResponse, ProjectSummary, Role, TemplateResponse,
    UserProfile,
};

use crate::error::ApiErr;

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run raw SQL (one or more statements, no parameters).
    pub fn query(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn().execute_batch(sql)
    }

    /// Execute a built statement, returning the number of affected rows.
    pub fn run(&self, built: Built) -> rusqlite::Result<usize> {
        sq_execute(&self.conn(), built)
    }

    /// First row of a built query, if any.
    pub fn get_one<T, F>(&self, built: Built, f: F) -> rusqlite::Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        sq_query_opt(&self.conn(), built, f)
    }

    /// All rows of a built query.
    pub fn get_all<T, F>(&self, built: Built, f: F) -> rusqlite::Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        sq_query_map(&self.conn(), built, f)
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, ApiErr>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, ApiErr>,
    {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(ApiErr::from_db("begin transaction"))?;
        let out = f(&tx)?;
        tx.commit().map_err(ApiErr::from_db("commit transaction"))?;
        Ok(out)
    }
}

/// Initialize the database: open connection, enable WAL, run migrations.
///
/// Accepts `sqlite://path`, `sqlite:path`, a bare path or `:memory:`.
pub fn init_db(database_url: &str) -> Result<Db> {
    let conn = match database_path(database_url) {
        None => Connection::open_in_memory().context("opening in-memory SQLite database")?,
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let conn = Connection::open(&path)
                .with_context(|| format!("opening SQLite database {}", path.display()))?;
            // WAL for better concurrent read performance
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        }
    };
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn database_path(database_url: &str) -> Option<PathBuf> {
    let raw = database_url.trim();
    let raw = raw
        .strip_prefix("sqlite://")
        .or_else(|| raw.strip_prefix("sqlite:"))
        .unwrap_or(raw);
    if raw.is_empty() || raw == ":memory:" {
        return None;
    }
    Some(Path::new(raw).to_path_buf())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query ⇄ rusqlite bridge
// ---------------------------------------------------------------------------

fn bind_values(values: sea_query::Values) -> rusqlite::Result<Vec<rusqlite::types::Value>> {
    values.0.into_iter().map(to_sql_value).collect()
}

fn to_sql_value(value: sea_query::Value) -> rusqlite::Result<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;
    use sea_query::Value as Sq;

    fn int<T: Into<i64>>(v: Option<T>) -> Sql {
        v.map_or(Sql::Null, |n| Sql::Integer(n.into()))
    }

    Ok(match value {
        Sq::Bool(v) => int(v.map(i64::from)),
        Sq::TinyInt(v) => int(v),
        Sq::SmallInt(v) => int(v),
        Sq::Int(v) => int(v),
        Sq::BigInt(v) => int(v),
        Sq::TinyUnsigned(v) => int(v),
        Sq::SmallUnsigned(v) => int(v),
        Sq::Unsigned(v) => int(v),
        Sq::BigUnsigned(v) => int(v.map(|n| i64::try_from(n).unwrap_or(i64::MAX))),
        Sq::Float(v) => v.map_or(Sql::Null, |f| Sql::Real(f.into())),
        Sq::Double(v) => v.map_or(Sql::Null, Sql::Real),
        Sq::String(v) => v.map_or(Sql::Null, |s| Sql::Text(*s)),
        Sq::Char(v) => v.map_or(Sql::Null, |c| Sql::Text(c.to_string())),
        Sq::Bytes(v) => v.map_or(Sql::Null, |b| Sql::Blob(*b)),
        #[allow(unreachable_patterns)]
        other => {
            return Err(rusqlite::Error::ToSqlConversionFailure(
                format!("unsupported bound value: {other:?}").into(),
            ));
        }
    })
}

/// Execute a built statement on any connection (or transaction).
pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    let params = bind_values(values)?;
    conn.execute(&sql, rusqlite::params_from_iter(params))
}

/// Exactly one row; `QueryReturnedNoRows` otherwise.
pub fn sq_query_row<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let params = bind_values(values)?;
    conn.query_row(&sql, rusqlite::params_from_iter(params), f)
}

/// Zero or one row.
pub fn sq_query_opt<T, F>(
    conn: &Connection,
    built: Built,
    f: F,
) -> rusqlite::Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    sq_query_row(conn, built, f).optional()
}

/// All rows.
pub fn sq_query_map<T, F>(
    conn: &Connection,
    (sql, values): Built,
    f: F,
) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let params = bind_values(values)?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), f)?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Row mappers (column order defined by the builders in `sublimate_api::db`)
// ---------------------------------------------------------------------------

pub fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    let role: String = row.get(3)?;
    Ok(UserProfile {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: Role::from_db(&role),
        plan_id: row.get(4)?,
        credits: row.get(5)?,
        printer_model: row.get(6)?,
        default_offset_x: row.get(7)?,
        default_offset_y: row.get(8)?,
        created_at: row.get(9)?,
        last_login_at: row.get(10)?,
    })
}

pub fn project_summary_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectSummary> {
    Ok(ProjectSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        template_id: row.get(2)?,
        width_mm: row.get(3)?,
        height_mm: row.get(4)?,
        offset_x: row.get(5)?,
        offset_y: row.get(6)?,
        thumbnail: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn template_from_row(row: &Row<'_>) -> rusqlite::Result<TemplateResponse> {
    Ok(TemplateResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        width_mm: row.get(3)?,
        height_mm: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<PlanResponse> {
    Ok(PlanResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        price_cents: row.get(2)?,
        credits: row.get(3)?,
        description: row.get(4)?,
        is_active: row.get(5)?,
    })
}

pub fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityEntry> {
    Ok(ActivityEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email: row.get(2)?,
        action: row.get(3)?,
        detail: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn printer_from_row(row: &Row<'_>) -> rusqlite::Result<PrinterModelResponse> {
    Ok(PrinterModelResponse {
        name: row.get(0)?,
        avg_offset_x: row.get(1)?,
        avg_offset_y: row.get(2)?,
        sample_count: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sublimate_api::db;

    #[test]
    fn database_url_forms() {
        assert_eq!(database_path(":memory:"), None);
        assert_eq!(database_path("sqlite://:memory:"), None);
        assert_eq!(
            database_path("sqlite://data/app.db"),
            Some(PathBuf::from("data/app.db"))
        );
        assert_eq!(
            database_path("sqlite:/var/lib/app.db"),
            Some(PathBuf::from("/var/lib/app.db"))
        );
        assert_eq!(database_path("app.db"), Some(PathBuf::from("app.db")));
    }

    #[test]
    fn migrations_seed_plans_and_settings() {
        let db = init_db(":memory:").unwrap();
        let plans = db.get_all(db::plans::list_active(), plan_from_row).unwrap();
        let ids: Vec<&str> = plans.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["free", "pro", "business"]);

        let default_plan: Option<String> = db
            .get_one(db::settings::get(db::settings::DEFAULT_PLAN), |row| row.get(0))
            .unwrap();
        assert_eq!(default_plan.as_deref(), Some("free"));
    }

    #[test]
    fn migrations_are_applied_once_per_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sublimate.db");
        let url = format!("sqlite://{}", path.display());

        let db = init_db(&url).unwrap();
        db.run(db::settings::upsert("default_plan", "pro")).unwrap();
        drop(db);

        // Reopening must not re-run the seed inserts over the edited value.
        let db = init_db(&url).unwrap();
        let value: Option<String> = db
            .get_one(db::settings::get("default_plan"), |row| row.get(0))
            .unwrap();
        assert_eq!(value.as_deref(), Some("pro"));
        let applied: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
    }

    #[test]
    fn get_one_returns_none_for_missing_rows() {
        let db = init_db(":memory:").unwrap();
        let missing = db
            .get_one(db::users::get_profile("nobody"), profile_from_row)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = init_db(":memory:").unwrap();
        let result: Result<(), ApiErr> = db.transaction(|tx| {
            sq_execute(tx, db::settings::upsert("maintenance", "on"))
                .map_err(ApiErr::from_db("upsert"))?;
            Err(ApiErr::bad_request("abort"))
        });
        assert!(result.is_err());
        let value: Option<String> = db
            .get_one(db::settings::get("maintenance"), |row| row.get(0))
            .unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn raw_query_executes_batches() {
        let db = init_db(":memory:").unwrap();
        db.query("INSERT INTO settings (key, value) VALUES ('a', '1'), ('b', '2');")
            .unwrap();
        let all = db
            .get_all(db::settings::list_all(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .unwrap();
        assert!(all.contains(&("a".to_string(), "1".to_string())));
        assert!(all.contains(&("b".to_string(), "2".to_string())));
    }
}
