use axum::{
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
};
use uuid::Uuid;

use sublimate_api::{
    ActivityAction, AuthResponse, ChangePasswordRequest, LoginRequest, OkResponse,
    RegisterRequest, Role, UpdateCalibrationRequest, UserProfile, crypto, db, service,
};

use crate::AppConfig;
use crate::error::ApiErr;
use crate::extract::ApiJson;
use crate::routes::now_unix;
use crate::storage::{Db, plan_from_row, profile_from_row, sq_execute, sq_query_opt};

// ---------------------------------------------------------------------------
// Auth extractors
// ---------------------------------------------------------------------------

/// Authenticated user extracted from the `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = service::resolve_bearer(header)?;

        let config = AppConfig::from_ref(state);
        let user_id = crypto::verify_jwt(token, &config.jwt_secret, now_unix())?;

        let db = Db::from_ref(state);
        let profile = db
            .get_one(db::users::get_profile(&user_id), profile_from_row)
            .map_err(ApiErr::from_db("auth lookup"))?
            .ok_or_else(|| ApiErr::unauthorized("account no longer exists"))?;

        Ok(AuthUser {
            user_id: profile.id,
            email: profile.email,
            role: profile.role,
        })
    }
}

/// An [`AuthUser`] whose role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiErr::forbidden("admin only"));
        }
        Ok(AdminUser(user))
    }
}

fn load_profile(db: &Db, user_id: &str) -> Result<UserProfile, ApiErr> {
    db.get_one(db::users::get_profile(user_id), profile_from_row)
        .map_err(ApiErr::from_db("load profile"))?
        .ok_or_else(|| ApiErr::not_found("user not found"))
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

/// POST /api/auth/register: create an account and return a JWT.
pub async fn register(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, ApiJson<AuthResponse>), ApiErr> {
    let email = service::validate_email(&req.email)?;
    service::validate_password(&req.password)?;
    let name = service::validate_name(&req.name)?;

    let plan = {
        let conn = db.conn();

        let enabled: Option<String> = sq_query_opt(
            &conn,
            db::settings::get(db::settings::REGISTRATION_ENABLED),
            |row| row.get(0),
        )
        .map_err(ApiErr::from_db("read registration setting"))?;
        if !service::parse_bool_flag(enabled.as_deref(), true) {
            return Err(ApiErr::forbidden("registration is currently closed"));
        }

        let exists: bool = sq_query_opt(&conn, db::users::email_exists(&email), |row| row.get(0))
            .map_err(ApiErr::from_db("check email"))?
            .unwrap_or(false);
        if exists {
            return Err(ApiErr::bad_request("email already registered"));
        }

        let default_plan: Option<String> = sq_query_opt(
            &conn,
            db::settings::get(db::settings::DEFAULT_PLAN),
            |row| row.get(0),
        )
        .map_err(ApiErr::from_db("read default plan"))?;
        match default_plan {
            Some(plan_id) => {
                sq_query_opt(&conn, db::plans::get_by_id(&plan_id), plan_from_row)
                    .map_err(ApiErr::from_db("load default plan"))?
            }
            None => None,
        }
    };

    let password = req.password;
    let (password_hash, password_salt) =
        tokio::task::spawn_blocking(move || crypto::hash_password(&password))
            .await
            .map_err(ApiErr::from_db("password hashing task"))??;

    let user_id = Uuid::new_v4().to_string();
    let role = if config.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };

    let profile = db.transaction(|tx| {
        let inserted = sq_execute(
            tx,
            db::users::insert(&db::users::InsertParams {
                id: &user_id,
                email: &email,
                name: &name,
                password_hash: &password_hash,
                password_salt: &password_salt,
                role,
                plan_id: plan.as_ref().map(|p| p.id.as_str()),
                credits: plan.as_ref().map_or(0, |p| p.credits),
            }),
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ApiErr::bad_request("email already registered"));
            }
            Err(e) => return Err(ApiErr::from_db("insert user")(e)),
        }

        sq_execute(
            tx,
            db::activity::insert(&user_id, ActivityAction::Register, None),
        )
        .map_err(ApiErr::from_db("record register activity"))?;

        sq_query_opt(tx, db::users::get_profile(&user_id), profile_from_row)
            .map_err(ApiErr::from_db("load new profile"))?
            .ok_or_else(|| ApiErr::internal("failed to create account"))
    })?;

    tracing::info!(user_id = %profile.id, role = %profile.role, "registered new account");

    let resp = service::issue_token(&config.jwt_secret, profile, now_unix())?;
    Ok((StatusCode::CREATED, ApiJson(resp)))
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// POST /api/auth/login: verify credentials and return a JWT.
pub async fn login(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiJson<AuthResponse>, ApiErr> {
    let email = req.email.trim().to_lowercase();

    let found = db
        .get_one(db::users::get_by_email_for_login(&email), |row| {
            let hash_idx = db::users::PROFILE_COLUMN_COUNT;
            Ok((
                profile_from_row(row)?,
                row.get::<_, String>(hash_idx)?,
                row.get::<_, String>(hash_idx + 1)?,
            ))
        })
        .map_err(ApiErr::from_db("login lookup"))?;

    let Some((profile, hash, salt)) = found else {
        return Err(ApiErr::unauthorized("invalid email or password"));
    };

    let password = req.password;
    let valid =
        tokio::task::spawn_blocking(move || crypto::verify_password(&password, &hash, &salt))
            .await
            .map_err(ApiErr::from_db("password verify task"))?;
    if !valid {
        return Err(ApiErr::unauthorized("invalid email or password"));
    }

    let profile = db.transaction(|tx| {
        sq_execute(tx, db::users::touch_last_login(&profile.id))
            .map_err(ApiErr::from_db("touch last login"))?;
        sq_execute(
            tx,
            db::activity::insert(&profile.id, ActivityAction::Login, None),
        )
        .map_err(ApiErr::from_db("record login activity"))?;
        sq_query_opt(tx, db::users::get_profile(&profile.id), profile_from_row)
            .map_err(ApiErr::from_db("reload profile"))?
            .ok_or_else(|| ApiErr::unauthorized("account no longer exists"))
    })?;

    tracing::info!(user_id = %profile.id, "login");

    Ok(ApiJson(service::issue_token(
        &config.jwt_secret,
        profile,
        now_unix(),
    )?))
}

// ---------------------------------------------------------------------------
// Current user
// ---------------------------------------------------------------------------

/// GET /api/auth/me: the caller's profile.
pub async fn me(State(db): State<Db>, user: AuthUser) -> Result<ApiJson<UserProfile>, ApiErr> {
    load_profile(&db, &user.user_id).map(ApiJson)
}

/// PUT /api/auth/password: change password after verifying the current one.
pub async fn change_password(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<ApiJson<OkResponse>, ApiErr> {
    service::validate_password(&req.new_password)?;

    let (hash, salt): (String, String) = db
        .get_one(db::users::get_password_fields(&user.user_id), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .map_err(ApiErr::from_db("load password"))?
        .ok_or_else(|| ApiErr::not_found("user not found"))?;

    let ChangePasswordRequest {
        current_password,
        new_password,
    } = req;
    let (new_hash, new_salt) = tokio::task::spawn_blocking(move || {
        if !crypto::verify_password(&current_password, &hash, &salt) {
            return Err(sublimate_api::ServiceError::Unauthorized(
                "current password is incorrect".into(),
            ));
        }
        crypto::hash_password(&new_password)
    })
    .await
    .map_err(ApiErr::from_db("password change task"))??;

    db.run(db::users::update_password(
        &user.user_id,
        &new_hash,
        &new_salt,
    ))
    .map_err(ApiErr::from_db("update password"))?;

    Ok(ApiJson(OkResponse { ok: true }))
}

/// PUT /api/auth/calibration: store the caller's printer and default offsets.
pub async fn update_calibration(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<UpdateCalibrationRequest>,
) -> Result<ApiJson<UserProfile>, ApiErr> {
    service::validate_offset(req.default_offset_x, req.default_offset_y)?;
    // Absent keeps the stored model, blank clears it.
    let printer_model = match req.printer_model.as_deref().map(str::trim) {
        None => None,
        Some("") => Some(None),
        Some(model) => Some(Some(service::normalize_printer_model(model)?)),
    };

    db.run(db::users::update_calibration(
        &user.user_id,
        printer_model.as_ref().map(Option::as_deref),
        req.default_offset_x,
        req.default_offset_y,
    ))
    .map_err(ApiErr::from_db("update calibration"))?;
    tracing::info!(user = %user.email, printer = ?printer_model, "calibration defaults updated");

    load_profile(&db, &user.user_id).map(ApiJson)
}
