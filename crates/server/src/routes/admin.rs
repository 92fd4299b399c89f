use std::collections::BTreeMap;

use axum::extract::State;

use sublimate_api::{
    ActivityAction, ActivityListResponse, ActivityQuery, AdminUpdateUserRequest,
    AdminUserListQuery, AdminUserListResponse, OkResponse, Role, SettingsPayload, StatsResponse,
    UserProfile, db, service,
};

use crate::error::ApiErr;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::auth::AdminUser;
use crate::storage::{Db, activity_from_row, profile_from_row, sq_execute, sq_query_opt};

const MAX_ACTIVITY_LIMIT: u32 = 500;
const MAX_SETTING_KEY_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// GET /api/admin/users?page&per_page&search
pub async fn list_users(
    State(db): State<Db>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<AdminUserListQuery>,
) -> Result<ApiJson<AdminUserListResponse>, ApiErr> {
    let (page, per_page) = query.normalized();
    let built = db::users::list(query.search.as_deref(), page, per_page);

    let total: i64 = db
        .get_one(built.count_query, |row| row.get(0))
        .map_err(ApiErr::from_db("count users"))?
        .unwrap_or(0);
    let users = db
        .get_all(built.select_query, profile_from_row)
        .map_err(ApiErr::from_db("list users"))?;

    Ok(ApiJson(AdminUserListResponse {
        users,
        total,
        page: built.page,
        per_page: built.per_page,
    }))
}

/// PUT /api/admin/users/{id}: change role, plan or credit balance.
pub async fn update_user(
    State(db): State<Db>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<AdminUpdateUserRequest>,
) -> Result<ApiJson<UserProfile>, ApiErr> {
    if id == admin.user_id && req.role.is_some_and(|r| r != Role::Admin) {
        return Err(ApiErr::bad_request("admins cannot demote themselves"));
    }
    if let Some(credits) = req.credits {
        service::validate_non_negative(credits, "credits")?;
    }

    let profile = db.transaction(|tx| {
        if let Some(plan_id) = req.plan_id.as_deref() {
            let known: bool = sq_query_opt(tx, db::plans::exists(plan_id), |row| row.get(0))
                .map_err(ApiErr::from_db("check plan"))?
                .unwrap_or(false);
            if !known {
                return Err(ApiErr::bad_request("unknown plan"));
            }
        }

        if let Some(built) =
            db::users::admin_update(&id, req.role, req.plan_id.as_deref(), req.credits)
        {
            sq_execute(tx, built).map_err(ApiErr::from_db("update user"))?;
        }

        sq_query_opt(tx, db::users::get_profile(&id), profile_from_row)
            .map_err(ApiErr::from_db("load user"))?
            .ok_or_else(|| ApiErr::not_found("user not found"))
    })?;

    tracing::info!(
        admin = %admin.user_id,
        user = %profile.id,
        role = %profile.role,
        credits = profile.credits,
        "admin updated user"
    );
    Ok(ApiJson(profile))
}

/// DELETE /api/admin/users/{id}: projects, templates and activity cascade.
pub async fn delete_user(
    State(db): State<Db>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiJson<OkResponse>, ApiErr> {
    if id == admin.user_id {
        return Err(ApiErr::bad_request("admins cannot delete themselves"));
    }
    let affected = db
        .run(db::users::delete(&id))
        .map_err(ApiErr::from_db("delete user"))?;
    if affected == 0 {
        return Err(ApiErr::not_found("user not found"));
    }
    tracing::info!(admin = %admin.user_id, user = %id, "admin deleted user");
    Ok(ApiJson(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn read_settings(db: &Db) -> Result<SettingsPayload, ApiErr> {
    let settings = db
        .get_all(db::settings::list_all(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(ApiErr::from_db("list settings"))?
        .into_iter()
        .collect::<BTreeMap<_, _>>();
    Ok(SettingsPayload { settings })
}

/// GET /api/admin/settings
pub async fn get_settings(
    State(db): State<Db>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiJson<SettingsPayload>, ApiErr> {
    read_settings(&db).map(ApiJson)
}

/// PUT /api/admin/settings: upsert every pair; all or nothing.
pub async fn update_settings(
    State(db): State<Db>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<SettingsPayload>,
) -> Result<ApiJson<SettingsPayload>, ApiErr> {
    for key in payload.settings.keys() {
        if key.trim().is_empty() || key.len() > MAX_SETTING_KEY_LEN {
            return Err(ApiErr::bad_request(format!(
                "setting keys must be 1-{MAX_SETTING_KEY_LEN} characters"
            )));
        }
    }

    db.transaction(|tx| {
        for (key, value) in &payload.settings {
            if key == db::settings::DEFAULT_PLAN {
                let known: bool = sq_query_opt(tx, db::plans::exists(value), |row| row.get(0))
                    .map_err(ApiErr::from_db("check plan"))?
                    .unwrap_or(false);
                if !known {
                    return Err(ApiErr::bad_request("default_plan must name an existing plan"));
                }
            }
            sq_execute(tx, db::settings::upsert(key, value))
                .map_err(ApiErr::from_db("upsert setting"))?;
        }
        Ok(())
    })?;

    tracing::info!(
        admin = %admin.user_id,
        keys = ?payload.settings.keys().collect::<Vec<_>>(),
        "admin updated settings"
    );
    read_settings(&db).map(ApiJson)
}

// ---------------------------------------------------------------------------
// Activity + stats
// ---------------------------------------------------------------------------

/// GET /api/admin/activity?limit
pub async fn list_activity(
    State(db): State<Db>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> Result<ApiJson<ActivityListResponse>, ApiErr> {
    let limit = query.limit.clamp(1, MAX_ACTIVITY_LIMIT);
    let activity = db
        .get_all(db::activity::recent(limit), activity_from_row)
        .map_err(ApiErr::from_db("list activity"))?;
    Ok(ApiJson(ActivityListResponse { activity }))
}

/// GET /api/admin/stats
pub async fn stats(
    State(db): State<Db>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiJson<StatsResponse>, ApiErr> {
    let count = |built| -> Result<i64, ApiErr> {
        Ok(db
            .get_one(built, |row| row.get(0))
            .map_err(ApiErr::from_db("count rows"))?
            .unwrap_or(0))
    };
    Ok(ApiJson(StatsResponse {
        users: count(db::users::count_all())?,
        projects: count(db::projects::count_all())?,
        templates: count(db::templates::count_all())?,
        prints: count(db::activity::count_by_action(ActivityAction::Print))?,
        feedback: count(db::printers::count_feedback())?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn list_users_paginates_and_searches() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        for i in 0..3 {
            insert_user(&state.db, &format!("maker{i}@shop.test"), Role::User, 0);
        }

        let ApiJson(page) = list_users(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiQuery(AdminUserListQuery {
                page: 1,
                per_page: 2,
                search: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.users.len(), 2);

        let ApiJson(found) = list_users(
            State(state.db.clone()),
            AdminUser(admin),
            ApiQuery(AdminUserListQuery {
                page: 0,
                per_page: 500,
                search: Some("MAKER1".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.users[0].email, "maker1@shop.test");
        assert_eq!((found.page, found.per_page), (1, 100));
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        insert_user(&state.db, "a_b@shop.test", Role::User, 0);
        insert_user(&state.db, "axb@shop.test", Role::User, 0);

        let search = |term: &str| {
            list_users(
                State(state.db.clone()),
                AdminUser(admin.clone()),
                ApiQuery(AdminUserListQuery {
                    page: 1,
                    per_page: 20,
                    search: Some(term.into()),
                }),
            )
        };

        let ApiJson(found) = search("a_b").await.unwrap();
        let emails: Vec<&str> = found.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["a_b@shop.test"]);
        assert_eq!(found.total, 1);

        let ApiJson(none) = search("100%").await.unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn update_user_guards_self_demotion_and_unknown_plans() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 0);

        let err = update_user(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiPath(admin.user_id.clone()),
            ApiJson(AdminUpdateUserRequest {
                role: Some(Role::User),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = update_user(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiPath(user.user_id.clone()),
            ApiJson(AdminUpdateUserRequest {
                plan_id: Some("platinum".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let ApiJson(updated) = update_user(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiPath(user.user_id.clone()),
            ApiJson(AdminUpdateUserRequest {
                role: Some(Role::Admin),
                plan_id: Some("pro".into()),
                credits: Some(42),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.plan_id.as_deref(), Some("pro"));
        assert_eq!(updated.credits, 42);

        let err = update_user(
            State(state.db.clone()),
            AdminUser(admin),
            ApiPath("missing".into()),
            ApiJson(AdminUpdateUserRequest {
                credits: Some(1),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_user_refuses_self() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        let user = insert_user(&state.db, "maker@shop.test", Role::User, 0);

        let err = delete_user(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiPath(admin.user_id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        delete_user(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiPath(user.user_id.clone()),
        )
        .await
        .unwrap();
        let ApiJson(stats) = stats(State(state.db.clone()), AdminUser(admin))
            .await
            .unwrap();
        assert_eq!(stats.users, 1);
    }

    #[tokio::test]
    async fn settings_update_is_atomic() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);

        let mut settings = BTreeMap::new();
        settings.insert("registration_enabled".to_string(), "false".to_string());
        settings.insert("default_plan".to_string(), "nope".to_string());
        let err = update_settings(
            State(state.db.clone()),
            AdminUser(admin.clone()),
            ApiJson(SettingsPayload { settings }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let ApiJson(current) = get_settings(State(state.db.clone()), AdminUser(admin.clone()))
            .await
            .unwrap();
        assert_eq!(current.settings["registration_enabled"], "true");

        let mut settings = BTreeMap::new();
        settings.insert("default_plan".to_string(), "pro".to_string());
        settings.insert("support_email".to_string(), "help@shop.test".to_string());
        let ApiJson(saved) = update_settings(
            State(state.db.clone()),
            AdminUser(admin),
            ApiJson(SettingsPayload { settings }),
        )
        .await
        .unwrap();
        assert_eq!(saved.settings["default_plan"], "pro");
        assert_eq!(saved.settings["support_email"], "help@shop.test");
    }

    #[tokio::test]
    async fn activity_is_newest_first_with_email() {
        let state = test_state();
        let admin = insert_user(&state.db, "boss@shop.test", Role::Admin, 0);
        state
            .db
            .run(db::activity::insert(&admin.user_id, ActivityAction::Login, None))
            .unwrap();
        state
            .db
            .run(db::activity::insert(
                &admin.user_id,
                ActivityAction::Print,
                Some("project=p1"),
            ))
            .unwrap();

        let ApiJson(list) = list_activity(
            State(state.db.clone()),
            AdminUser(admin),
            ApiQuery(ActivityQuery { limit: 0 }),
        )
        .await
        .unwrap();
        assert_eq!(list.activity.len(), 1);
        assert_eq!(list.activity[0].action, "print");
        assert_eq!(list.activity[0].email.as_deref(), Some("boss@shop.test"));
    }
}
