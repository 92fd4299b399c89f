use axum::{extract::State, http::StatusCode};
use rusqlite::Row;
use uuid::Uuid;

use sublimate_api::{
    CreateProjectRequest, OkResponse, ProjectDetail, ProjectListResponse, UpdateProjectRequest,
    db, service,
};

use crate::error::ApiErr;
use crate::extract::{ApiJson, ApiPath};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, profile_from_row, project_summary_from_row};

/// Summary columns followed by `canvas_json`, parsed back into JSON.
fn project_detail_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectDetail> {
    let project = project_summary_from_row(row)?;
    let raw: String = row.get(db::projects::SUMMARY_COLUMN_COUNT)?;
    let canvas = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            db::projects::SUMMARY_COLUMN_COUNT,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;
    Ok(ProjectDetail { project, canvas })
}

fn load_project(db: &Db, id: &str, user_id: &str) -> Result<ProjectDetail, ApiErr> {
    db.get_one(
        db::projects::get_for_user(id, user_id),
        project_detail_from_row,
    )
    .map_err(ApiErr::from_db("load project"))?
    .ok_or_else(|| ApiErr::not_found("project not found"))
}

fn canvas_to_json(canvas: &serde_json::Value) -> Result<String, ApiErr> {
    if !canvas.is_object() {
        return Err(ApiErr::bad_request("canvas must be a JSON object"));
    }
    serde_json::to_string(canvas).map_err(ApiErr::from_db("serialize canvas"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// GET /api/projects: caller's projects, most recently updated first.
pub async fn list_projects(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<ApiJson<ProjectListResponse>, ApiErr> {
    let projects = db
        .get_all(
            db::projects::list_for_user(&user.user_id),
            project_summary_from_row,
        )
        .map_err(ApiErr::from_db("list projects"))?;
    Ok(ApiJson(ProjectListResponse { projects }))
}

/// POST /api/projects
pub async fn create_project(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateProjectRequest>,
) -> Result<(StatusCode, ApiJson<ProjectDetail>), ApiErr> {
    let name = service::validate_project_name(&req.name)?;
    service::validate_dimensions(req.width_mm, req.height_mm)?;
    let canvas_json = canvas_to_json(&req.canvas)?;

    let (offset_x, offset_y) = match (req.offset_x, req.offset_y) {
        (Some(x), Some(y)) => (x, y),
        (x, y) => {
            let profile = db
                .get_one(db::users::get_profile(&user.user_id), profile_from_row)
                .map_err(ApiErr::from_db("load calibration defaults"))?
                .ok_or_else(|| ApiErr::unauthorized("account no longer exists"))?;
            (
                x.unwrap_or(profile.default_offset_x),
                y.unwrap_or(profile.default_offset_y),
            )
        }
    };
    service::validate_offset(offset_x, offset_y)?;

    let template_id = non_empty(req.template_id.as_deref());
    if let Some(template_id) = template_id {
        let owned = db
            .get_one(
                db::templates::get_for_user(template_id, &user.user_id),
                |_| Ok(()),
            )
            .map_err(ApiErr::from_db("check template"))?
            .is_some();
        if !owned {
            return Err(ApiErr::bad_request("unknown template"));
        }
    }

    let id = Uuid::new_v4().to_string();
    db.run(db::projects::insert(&db::projects::InsertParams {
        id: &id,
        user_id: &user.user_id,
        name: &name,
        canvas_json: &canvas_json,
        template_id,
        width_mm: req.width_mm,
        height_mm: req.height_mm,
        offset_x,
        offset_y,
        thumbnail: non_empty(req.thumbnail.as_deref()),
    }))
    .map_err(ApiErr::from_db("insert project"))?;

    let project = load_project(&db, &id, &user.user_id)?;
    Ok((StatusCode::CREATED, ApiJson(project)))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(db): State<Db>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiJson<ProjectDetail>, ApiErr> {
    load_project(&db, &id, &user.user_id).map(ApiJson)
}

/// PUT /api/projects/{id}: partial update.
pub async fn update_project(
    State(db): State<Db>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateProjectRequest>,
) -> Result<ApiJson<ProjectDetail>, ApiErr> {
    let current = load_project(&db, &id, &user.user_id)?.project;

    let name = req
        .name
        .as_deref()
        .map(service::validate_project_name)
        .transpose()?;
    service::validate_dimensions(
        req.width_mm.unwrap_or(current.width_mm),
        req.height_mm.unwrap_or(current.height_mm),
    )?;
    service::validate_offset(
        req.offset_x.unwrap_or(current.offset_x),
        req.offset_y.unwrap_or(current.offset_y),
    )?;
    let canvas_json = req.canvas.as_ref().map(canvas_to_json).transpose()?;

    let affected = db
        .run(db::projects::update(
            &id,
            &user.user_id,
            &db::projects::UpdateParams {
                name: name.as_deref(),
                canvas_json: canvas_json.as_deref(),
                width_mm: req.width_mm,
                height_mm: req.height_mm,
                offset_x: req.offset_x,
                offset_y: req.offset_y,
                thumbnail: req.thumbnail.as_deref(),
            },
        ))
        .map_err(ApiErr::from_db("update project"))?;
    if affected == 0 {
        return Err(ApiErr::not_found("project not found"));
    }

    load_project(&db, &id, &user.user_id).map(ApiJson)
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(db): State<Db>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiJson<OkResponse>, ApiErr> {
    let affected = db
        .run(db::projects::delete_for_user(&id, &user.user_id))
        .map_err(ApiErr::from_db("delete project"))?;
    if affected == 0 {
        return Err(ApiErr::not_found("project not found"));
    }
    Ok(ApiJson(OkResponse { ok: true }))
}
