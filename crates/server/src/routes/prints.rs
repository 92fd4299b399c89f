use axum::{extract::State, http::StatusCode};
use serde_json::json;

use sublimate_api::{
    ActivityAction, FeedbackRequest, PrintRequest, PrintResponse, PrinterAnalytics,
    PrinterAnalyticsResponse, PrinterListResponse, PrinterModelResponse, db,
    service::{self, Calibration},
};

use crate::error::ApiErr;
use crate::extract::{ApiJson, ApiPath};
use crate::routes::auth::{AdminUser, AuthUser};
use crate::storage::{Db, printer_from_row, profile_from_row, sq_execute, sq_query_opt};

fn calibration_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Calibration> {
    Ok(Calibration {
        avg_offset_x: row.get(1)?,
        avg_offset_y: row.get(2)?,
        sample_count: row.get(3)?,
    })
}

fn ensure_project_owned(db: &Db, project_id: &str, user_id: &str) -> Result<(), ApiErr> {
    let owned: bool = db
        .get_one(db::projects::exists_for_user(project_id, user_id), |row| {
            row.get(0)
        })
        .map_err(ApiErr::from_db("check project"))?
        .unwrap_or(false);
    if !owned {
        return Err(ApiErr::not_found("project not found"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Print logging
// ---------------------------------------------------------------------------

/// POST /api/prints: spend a credit and get the offset to print with.
pub async fn log_print(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<PrintRequest>,
) -> Result<ApiJson<PrintResponse>, ApiErr> {
    let profile = db
        .get_one(db::users::get_profile(&user.user_id), profile_from_row)
        .map_err(ApiErr::from_db("load profile"))?
        .ok_or_else(|| ApiErr::unauthorized("account no longer exists"))?;

    let printer_model = match req.printer_model.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(service::normalize_printer_model(raw)?),
        _ => profile.printer_model.clone(),
    };
    let project_id = req
        .project_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    if let Some(project_id) = project_id {
        ensure_project_owned(&db, project_id, &user.user_id)?;
    }

    let detail = json!({
        "project_id": project_id,
        "printer_model": printer_model,
    })
    .to_string();

    let (remaining_credits, community) = db.transaction(|tx| {
        if !user.is_admin() {
            let charged = sq_execute(tx, db::users::consume_credit(&user.user_id))
                .map_err(ApiErr::from_db("consume credit"))?;
            if charged == 0 {
                return Err(ApiErr::forbidden("no print credits remaining"));
            }
        }

        sq_execute(
            tx,
            db::activity::insert(&user.user_id, ActivityAction::Print, Some(&detail)),
        )
        .map_err(ApiErr::from_db("record print activity"))?;

        let credits: i64 = sq_query_opt(tx, db::users::get_credits(&user.user_id), |row| {
            row.get(0)
        })
        .map_err(ApiErr::from_db("read credits"))?
        .unwrap_or(0);

        let community = match printer_model.as_deref() {
            Some(model) => sq_query_opt(tx, db::printers::get(model), calibration_from_row)
                .map_err(ApiErr::from_db("load printer calibration"))?,
            None => None,
        };
        Ok((credits, community))
    })?;

    let (suggested_offset_x, suggested_offset_y, offset_source) = service::suggest_offset(
        community,
        (profile.default_offset_x, profile.default_offset_y),
    );

    tracing::info!(
        user_id = %user.user_id,
        printer = ?printer_model,
        remaining_credits,
        "print logged"
    );

    Ok(ApiJson(PrintResponse {
        remaining_credits,
        suggested_offset_x,
        suggested_offset_y,
        offset_source,
    }))
}

// ---------------------------------------------------------------------------
// Calibration feedback
// ---------------------------------------------------------------------------

/// POST /api/printers/feedback: fold one measured offset into the model average.
pub async fn submit_feedback(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<FeedbackRequest>,
) -> Result<(StatusCode, ApiJson<PrinterModelResponse>), ApiErr> {
    let model = service::normalize_printer_model(&req.printer_model)?;
    service::validate_offset(req.offset_x, req.offset_y)?;
    let project_id = req
        .project_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    if let Some(project_id) = project_id {
        ensure_project_owned(&db, project_id, &user.user_id)?;
    }
    let notes = req.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let printer = db.transaction(|tx| {
        let current = sq_query_opt(tx, db::printers::get(&model), calibration_from_row)
            .map_err(ApiErr::from_db("load printer calibration"))?
            .unwrap_or_default();
        let next = current.apply_sample(req.offset_x, req.offset_y);

        sq_execute(
            tx,
            db::printers::insert_feedback(&db::printers::FeedbackParams {
                user_id: &user.user_id,
                project_id,
                printer_model: &model,
                offset_x: req.offset_x,
                offset_y: req.offset_y,
                outcome: req.outcome,
                notes,
            }),
        )
        .map_err(ApiErr::from_db("insert feedback"))?;
        sq_execute(tx, db::printers::upsert_calibration(&model, &next))
            .map_err(ApiErr::from_db("update printer calibration"))?;

        sq_query_opt(tx, db::printers::get(&model), printer_from_row)
            .map_err(ApiErr::from_db("reload printer"))?
            .ok_or_else(|| ApiErr::internal("printer calibration missing after update"))
    })?;

    tracing::info!(
        printer = %printer.name,
        outcome = %req.outcome,
        samples = printer.sample_count,
        "calibration feedback applied"
    );

    Ok((StatusCode::CREATED, ApiJson(printer)))
}

/// GET /api/printers
pub async fn list_printers(
    State(db): State<Db>,
    _user: AuthUser,
) -> Result<ApiJson<PrinterListResponse>, ApiErr> {
    let printers = db
        .get_all(db::printers::list_all(), printer_from_row)
        .map_err(ApiErr::from_db("list printers"))?;
    Ok(ApiJson(PrinterListResponse { printers }))
}

/// GET /api/printers/{name}
pub async fn get_printer(
    State(db): State<Db>,
    _user: AuthUser,
    ApiPath(name): ApiPath<String>,
) -> Result<ApiJson<PrinterModelResponse>, ApiErr> {
    let model = service::normalize_printer_model(&name)?;
    db.get_one(db::printers::get(&model), printer_from_row)
        .map_err(ApiErr::from_db("load printer"))?
        .map(ApiJson)
        .ok_or_else(|| ApiErr::not_found("printer model not found"))
}

/// GET /api/admin/printers/analytics
pub async fn printer_analytics(
    State(db): State<Db>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiJson<PrinterAnalyticsResponse>, ApiErr> {
    let printers = db
        .get_all(db::printers::analytics(), |row| {
            let aligned: i64 = row.get(4)?;
            let shifted: i64 = row.get(5)?;
            let failed: i64 = row.get(6)?;
            Ok(PrinterAnalytics {
                name: row.get(0)?,
                avg_offset_x: row.get(1)?,
                avg_offset_y: row.get(2)?,
                sample_count: row.get(3)?,
                aligned,
                shifted,
                failed,
                success_rate: service::success_rate(aligned, aligned + shifted + failed),
            })
        })
        .map_err(ApiErr::from_db("printer analytics"))?;
    Ok(ApiJson(PrinterAnalyticsResponse { printers }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, test_state};
    use sublimate_api::{FeedbackOutcome, OffsetSource, Role};

    fn feedback(model: &str, x: f64, y: f64, outcome: FeedbackOutcome) -> FeedbackRequest {
        FeedbackRequest {
            printer_model: model.into(),
            offset_x: x,
            offset_y: y,
            outcome,
            project_id: None,
            notes: None,
        }
    }

    fn print_activity_count(db: &Db) -> i64 {
        db.get_one(db::activity::count_by_action(ActivityAction::Print), |row| {
            row.get(0)
        })
        .unwrap()
        .unwrap()
    }

    #[tokio::test]
    async fn feedback_average_is_arithmetic_mean() {
        let state = test_state();
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 0);
        let samples = [(1.0, -2.0), (2.5, 0.5), (-0.5, 1.0), (3.0, 3.5)];

        let mut last = None;
        for (i, (x, y)) in samples.iter().enumerate() {
            // Spelling varies; normalization keeps one model row.
            let name = if i % 2 == 0 { "Epson ET-2800" } else { " epson  et-2800" };
            let (status, ApiJson(printer)) = submit_feedback(
                State(state.db.clone()),
                user.clone(),
                ApiJson(feedback(name, *x, *y, FeedbackOutcome::Aligned)),
            )
            .await
            .unwrap();
            assert_eq!(status, StatusCode::CREATED);
            last = Some(printer);
        }

        let printer = last.unwrap();
        let n = samples.len() as f64;
        let mean_x = samples.iter().map(|s| s.0).sum::<f64>() / n;
        let mean_y = samples.iter().map(|s| s.1).sum::<f64>() / n;
        assert_eq!(printer.name, "epson et-2800");
        assert_eq!(printer.sample_count, 4);
        assert!((printer.avg_offset_x - mean_x).abs() < 1e-9);
        assert!((printer.avg_offset_y - mean_y).abs() < 1e-9);

        let ApiJson(list) = list_printers(State(state.db.clone()), user.clone())
            .await
            .unwrap();
        assert_eq!(list.printers.len(), 1);

        let ApiJson(fetched) = get_printer(
            State(state.db.clone()),
            user.clone(),
            ApiPath("EPSON ET-2800".into()),
        )
        .await
        .unwrap();
        assert_eq!(fetched, printer);

        let err = get_printer(State(state.db.clone()), user, ApiPath("unknown".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn print_without_credits_is_forbidden_and_not_logged() {
        let state = test_state();
        let user = insert_user(&state.db, "broke@shop.test", Role::User, 0);

        let err = log_print(
            State(state.db.clone()),
            user,
            ApiJson(PrintRequest::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(print_activity_count(&state.db), 0);
    }

    #[tokio::test]
    async fn print_consumes_credit_and_suggests_offsets() {
        let state = test_state();
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 2);
        state
            .db
            .run(db::users::update_calibration(
                &user.user_id,
                Some(Some("sawgrass sg500")),
                0.5,
                0.25,
            ))
            .unwrap();

        let ApiJson(first) = log_print(
            State(state.db.clone()),
            user.clone(),
            ApiJson(PrintRequest::default()),
        )
        .await
        .unwrap();
        assert_eq!(first.remaining_credits, 1);
        assert_eq!(first.offset_source, OffsetSource::User);
        assert_eq!(
            (first.suggested_offset_x, first.suggested_offset_y),
            (0.5, 0.25)
        );

        submit_feedback(
            State(state.db.clone()),
            user.clone(),
            ApiJson(feedback("Sawgrass SG500", 2.0, -1.0, FeedbackOutcome::Shifted)),
        )
        .await
        .unwrap();

        let ApiJson(second) = log_print(
            State(state.db.clone()),
            user.clone(),
            ApiJson(PrintRequest::default()),
        )
        .await
        .unwrap();
        assert_eq!(second.remaining_credits, 0);
        assert_eq!(second.offset_source, OffsetSource::Community);
        assert_eq!(
            (second.suggested_offset_x, second.suggested_offset_y),
            (2.0, -1.0)
        );
        assert_eq!(print_activity_count(&state.db), 2);

        let err = log_print(State(state.db.clone()), user, ApiJson(PrintRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(print_activity_count(&state.db), 2);
    }

    #[tokio::test]
    async fn admins_print_for_free() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        let ApiJson(resp) = log_print(
            State(state.db.clone()),
            admin,
            ApiJson(PrintRequest::default()),
        )
        .await
        .unwrap();
        assert_eq!(resp.remaining_credits, 0);
        assert_eq!(print_activity_count(&state.db), 1);
    }

    #[tokio::test]
    async fn print_for_foreign_project_is_not_found() {
        let state = test_state();
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 5);
        let err = log_print(
            State(state.db.clone()),
            user,
            ApiJson(PrintRequest {
                project_id: Some("someone-elses".into()),
                printer_model: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analytics_counts_outcomes() {
        let state = test_state();
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 0);
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        for outcome in [
            FeedbackOutcome::Aligned,
            FeedbackOutcome::Aligned,
            FeedbackOutcome::Aligned,
            FeedbackOutcome::Failed,
        ] {
            submit_feedback(
                State(state.db.clone()),
                user.clone(),
                ApiJson(feedback("Epson ET-2800", 1.0, 1.0, outcome)),
            )
            .await
            .unwrap();
        }

        let ApiJson(report) = printer_analytics(State(state.db.clone()), AdminUser(admin))
            .await
            .unwrap();
        assert_eq!(report.printers.len(), 1);
        let row = &report.printers[0];
        assert_eq!((row.aligned, row.shifted, row.failed), (3, 0, 1));
        assert_eq!(row.sample_count, 4);
        assert!((row.success_rate - 0.75).abs() < 1e-9);
    }
}
