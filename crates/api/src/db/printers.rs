//! Printer model calibration + print feedback query builders.

use sea_query::{Asterisk, Expr, Func, OnConflict, Order, Query, SqliteQueryBuilder};

use super::tables::{PrintFeedback, PrinterModels};
use super::{Built, now};
use crate::FeedbackOutcome;
use crate::service::Calibration;

/// Column order must match `printer_from_row()`.
fn printer_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.columns([
        PrinterModels::Name,
        PrinterModels::AvgOffsetX,
        PrinterModels::AvgOffsetY,
        PrinterModels::SampleCount,
        PrinterModels::UpdatedAt,
    ])
}

/// SELECT one model by normalized name.
pub fn get(name: &str) -> Built {
    let mut q = Query::select().to_owned();
    printer_columns(&mut q);
    q.from(PrinterModels::Table)
        .and_where(Expr::col(PrinterModels::Name).eq(name))
        .build(SqliteQueryBuilder)
}

/// All models, most sampled first.
pub fn list_all() -> Built {
    let mut q = Query::select().to_owned();
    printer_columns(&mut q);
    q.from(PrinterModels::Table)
        .order_by(PrinterModels::SampleCount, Order::Desc)
        .order_by(PrinterModels::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Write the new averages for a model, creating it on first sample.
pub fn upsert_calibration(name: &str, cal: &Calibration) -> Built {
    Query::insert()
        .into_table(PrinterModels::Table)
        .columns([
            PrinterModels::Name,
            PrinterModels::AvgOffsetX,
            PrinterModels::AvgOffsetY,
            PrinterModels::SampleCount,
            PrinterModels::UpdatedAt,
        ])
        .values_panic([
            name.into(),
            cal.avg_offset_x.into(),
            cal.avg_offset_y.into(),
            cal.sample_count.into(),
            now(),
        ])
        .on_conflict(
            OnConflict::column(PrinterModels::Name)
                .update_columns([
                    PrinterModels::AvgOffsetX,
                    PrinterModels::AvgOffsetY,
                    PrinterModels::SampleCount,
                    PrinterModels::UpdatedAt,
                ])
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// Parameters for logging one print outcome.
pub struct FeedbackParams<'a> {
    pub user_id: &'a str,
    pub project_id: Option<&'a str>,
    pub printer_model: &'a str,
    pub offset_x: f64,
    pub offset_y: f64,
    pub outcome: FeedbackOutcome,
    pub notes: Option<&'a str>,
}

/// INSERT a print feedback row.
pub fn insert_feedback(p: &FeedbackParams<'_>) -> Built {
    Query::insert()
        .into_table(PrintFeedback::Table)
        .columns([
            PrintFeedback::UserId,
            PrintFeedback::ProjectId,
            PrintFeedback::PrinterModel,
            PrintFeedback::OffsetX,
            PrintFeedback::OffsetY,
            PrintFeedback::Outcome,
            PrintFeedback::Notes,
        ])
        .values_panic([
            p.user_id.into(),
            p.project_id.map(str::to_string).into(),
            p.printer_model.into(),
            p.offset_x.into(),
            p.offset_y.into(),
            p.outcome.as_str().into(),
            p.notes.map(str::to_string).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Count all feedback rows.
pub fn count_feedback() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(PrintFeedback::Table)
        .build(SqliteQueryBuilder)
}

/// Per-model averages joined with outcome counts.
///
/// Columns: name, avg_offset_x, avg_offset_y, sample_count, aligned,
/// shifted, failed.
pub fn analytics() -> Built {
    // Conditional aggregates: keep as raw SQL with sea-query values
    let sql = "SELECT pm.\"name\", pm.\"avg_offset_x\", pm.\"avg_offset_y\", pm.\"sample_count\", \
               COALESCE(SUM(CASE WHEN pf.\"outcome\" = ? THEN 1 ELSE 0 END), 0), \
               COALESCE(SUM(CASE WHEN pf.\"outcome\" = ? THEN 1 ELSE 0 END), 0), \
               COALESCE(SUM(CASE WHEN pf.\"outcome\" = ? THEN 1 ELSE 0 END), 0) \
               FROM \"printer_models\" pm \
               LEFT JOIN \"print_feedback\" pf ON pf.\"printer_model\" = pm.\"name\" \
               GROUP BY pm.\"name\" \
               ORDER BY pm.\"sample_count\" DESC, pm.\"name\" ASC"
        .to_string();
    let values = sea_query::Values(vec![
        FeedbackOutcome::Aligned.as_str().into(),
        FeedbackOutcome::Shifted.as_str().into(),
        FeedbackOutcome::Failed.as_str().into(),
    ]);
    (sql, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_binds_one_value_per_placeholder() {
        let (sql, values) = analytics();
        assert_eq!(sql.matches('?').count(), values.0.len());
    }

    #[test]
    fn upsert_overwrites_existing_averages() {
        let (sql, values) = upsert_calibration(
            "epson et-2800",
            &Calibration {
                avg_offset_x: 1.0,
                avg_offset_y: 2.0,
                sample_count: 4,
            },
        );
        assert!(sql.contains("ON CONFLICT (\"name\") DO UPDATE"));
        assert_eq!(values.0.len(), 4);
    }
}
