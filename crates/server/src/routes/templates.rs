use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use sublimate_api::{
    CreateTemplateRequest, OkResponse, TemplateListResponse, TemplateResponse,
    UpdateTemplateRequest, db, service,
};

use crate::error::ApiErr;
use crate::extract::{ApiJson, ApiPath};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, template_from_row};

fn load_template(db: &Db, id: &str, user_id: &str) -> Result<TemplateResponse, ApiErr> {
    db.get_one(db::templates::get_for_user(id, user_id), template_from_row)
        .map_err(ApiErr::from_db("load template"))?
        .ok_or_else(|| ApiErr::not_found("template not found"))
}

/// GET /api/templates
pub async fn list_templates(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<ApiJson<TemplateListResponse>, ApiErr> {
    let templates = db
        .get_all(db::templates::list_for_user(&user.user_id), template_from_row)
        .map_err(ApiErr::from_db("list templates"))?;
    Ok(ApiJson(TemplateListResponse { templates }))
}

/// POST /api/templates
pub async fn create_template(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTemplateRequest>,
) -> Result<(StatusCode, ApiJson<TemplateResponse>), ApiErr> {
    let name = service::validate_project_name(&req.name)?;
    service::validate_dimensions(req.width_mm, req.height_mm)?;
    let category = req
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let id = Uuid::new_v4().to_string();
    db.run(db::templates::insert(
        &id,
        &user.user_id,
        &name,
        category,
        req.width_mm,
        req.height_mm,
    ))
    .map_err(ApiErr::from_db("insert template"))?;

    let template = load_template(&db, &id, &user.user_id)?;
    Ok((StatusCode::CREATED, ApiJson(template)))
}

/// PUT /api/templates/{id}
pub async fn update_template(
    State(db): State<Db>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateTemplateRequest>,
) -> Result<ApiJson<TemplateResponse>, ApiErr> {
    let current = load_template(&db, &id, &user.user_id)?;

    let name = req
        .name
        .as_deref()
        .map(service::validate_project_name)
        .transpose()?;
    service::validate_dimensions(
        req.width_mm.unwrap_or(current.width_mm),
        req.height_mm.unwrap_or(current.height_mm),
    )?;

    let Some(built) = db::templates::update(
        &id,
        &user.user_id,
        name.as_deref(),
        req.category.as_deref().map(str::trim),
        req.width_mm,
        req.height_mm,
    ) else {
        return Ok(ApiJson(current));
    };
    db.run(built).map_err(ApiErr::from_db("update template"))?;

    load_template(&db, &id, &user.user_id).map(ApiJson)
}

/// DELETE /api/templates/{id}: projects made from it keep their own dimensions.
pub async fn delete_template(
    State(db): State<Db>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiJson<OkResponse>, ApiErr> {
    let affected = db
        .run(db::templates::delete_for_user(&id, &user.user_id))
        .map_err(ApiErr::from_db("delete template"))?;
    if affected == 0 {
        return Err(ApiErr::not_found("template not found"));
    }
    Ok(ApiJson(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, test_state};
    use sublimate_api::Role;

    fn mousepad() -> CreateTemplateRequest {
        CreateTemplateRequest {
            name: "Mousepad".into(),
            category: Some(" desk ".into()),
            width_mm: 240.0,
            height_mm: 200.0,
        }
    }

    #[tokio::test]
    async fn crud_is_scoped_to_owner() {
        let state = test_state();
        let owner = insert_user(&state.db, "owner@shop.test", Role::User, 0);
        let other = insert_user(&state.db, "other@shop.test", Role::User, 0);

        let (status, ApiJson(created)) =
            create_template(State(state.db.clone()), owner.clone(), ApiJson(mousepad()))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.category.as_deref(), Some("desk"));

        let err = update_template(
            State(state.db.clone()),
            other.clone(),
            ApiPath(created.id.clone()),
            ApiJson(UpdateTemplateRequest {
                name: Some("Mine now".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let ApiJson(others) = list_templates(State(state.db.clone()), other.clone())
            .await
            .unwrap();
        assert!(others.templates.is_empty());

        let ApiJson(updated) = update_template(
            State(state.db.clone()),
            owner.clone(),
            ApiPath(created.id.clone()),
            ApiJson(UpdateTemplateRequest {
                height_mm: Some(180.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.height_mm, 180.0);
        assert_eq!(updated.name, "Mousepad");

        let err = delete_template(State(state.db.clone()), other, ApiPath(created.id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        delete_template(State(state.db.clone()), owner.clone(), ApiPath(created.id))
            .await
            .unwrap();
        let ApiJson(mine) = list_templates(State(state.db.clone()), owner).await.unwrap();
        assert!(mine.templates.is_empty());
    }

    #[tokio::test]
    async fn rejects_oversized_dimensions() {
        let state = test_state();
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 0);
        let mut req = mousepad();
        req.width_mm = 5000.0;
        let err = create_template(State(state.db.clone()), user, ApiJson(req))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
