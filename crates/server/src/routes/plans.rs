use axum::{extract::State, http::StatusCode};

use sublimate_api::{
    CreatePlanRequest, OkResponse, PlanListResponse, PlanResponse, UpdatePlanRequest, db, service,
};

use crate::error::ApiErr;
use crate::extract::{ApiJson, ApiPath};
use crate::routes::auth::AdminUser;
use crate::storage::{Db, plan_from_row};

fn load_plan(db: &Db, id: &str) -> Result<PlanResponse, ApiErr> {
    db.get_one(db::plans::get_by_id(id), plan_from_row)
        .map_err(ApiErr::from_db("load plan"))?
        .ok_or_else(|| ApiErr::not_found("plan not found"))
}

/// GET /api/plans: active plans, cheapest first. No auth required.
pub async fn list_plans(State(db): State<Db>) -> Result<ApiJson<PlanListResponse>, ApiErr> {
    let plans = db
        .get_all(db::plans::list_active(), plan_from_row)
        .map_err(ApiErr::from_db("list plans"))?;
    Ok(ApiJson(PlanListResponse { plans }))
}

/// POST /api/admin/plans
pub async fn create_plan(
    State(db): State<Db>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<CreatePlanRequest>,
) -> Result<(StatusCode, ApiJson<PlanResponse>), ApiErr> {
    let id = service::validate_plan_id(&req.id)?;
    let name = service::validate_name(&req.name)?;
    service::validate_non_negative(req.price_cents, "price_cents")?;
    service::validate_non_negative(req.credits, "credits")?;

    let exists: bool = db
        .get_one(db::plans::exists(&id), |row| row.get(0))
        .map_err(ApiErr::from_db("check plan"))?
        .unwrap_or(false);
    if exists {
        return Err(ApiErr::bad_request("plan already exists"));
    }

    db.run(db::plans::insert(
        &id,
        &name,
        req.price_cents,
        req.credits,
        req.description.as_deref(),
        req.is_active.unwrap_or(true),
    ))
    .map_err(ApiErr::from_db("insert plan"))?;

    tracing::info!(admin = %admin.user_id, plan = %id, "created plan");
    Ok((StatusCode::CREATED, ApiJson(load_plan(&db, &id)?)))
}

/// PUT /api/admin/plans/{id}
pub async fn update_plan(
    State(db): State<Db>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdatePlanRequest>,
) -> Result<ApiJson<PlanResponse>, ApiErr> {
    let current = load_plan(&db, &id)?;

    let name = req.name.as_deref().map(service::validate_name).transpose()?;
    if let Some(price) = req.price_cents {
        service::validate_non_negative(price, "price_cents")?;
    }
    if let Some(credits) = req.credits {
        service::validate_non_negative(credits, "credits")?;
    }

    let params = db::plans::UpdateParams {
        name: name.as_deref(),
        price_cents: req.price_cents,
        credits: req.credits,
        description: req.description.as_deref(),
        is_active: req.is_active,
    };
    let Some(built) = db::plans::update(&id, &params) else {
        return Ok(ApiJson(current));
    };
    db.run(built).map_err(ApiErr::from_db("update plan"))?;

    tracing::info!(admin = %admin.user_id, plan = %id, "updated plan");
    load_plan(&db, &id).map(ApiJson)
}

/// DELETE /api/admin/plans/{id}: subscribers keep their credits.
pub async fn delete_plan(
    State(db): State<Db>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiJson<OkResponse>, ApiErr> {
    let default_plan: Option<String> = db
        .get_one(db::settings::get(db::settings::DEFAULT_PLAN), |row| row.get(0))
        .map_err(ApiErr::from_db("read default plan"))?;
    if default_plan.as_deref() == Some(id.as_str()) {
        return Err(ApiErr::bad_request(
            "cannot delete the default plan; change default_plan first",
        ));
    }

    let affected = db
        .run(db::plans::delete(&id))
        .map_err(ApiErr::from_db("delete plan"))?;
    if affected == 0 {
        return Err(ApiErr::not_found("plan not found"));
    }

    tracing::info!(admin = %admin.user_id, plan = %id, "deleted plan");
    Ok(ApiJson(OkResponse { ok: true }))
}
