//! Shared API types, crypto, calibration math and SQL builders for the
//! sublimate backend.
//!
//! This crate is the **single source of truth** for all API request/response types.
//! TypeScript types are generated via `ts-rs` and consumed by the canvas editor.
//!
//! To regenerate TypeScript types:
//!   cargo test -p sublimate-api --features ts -- export_typescript --nocapture

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;
#[cfg(feature = "backend")]
pub mod service;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Account role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Parse a stored role. Unknown values fall back to `User`.
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a physical print lined up with the artwork.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum FeedbackOutcome {
    Aligned,
    Shifted,
    Failed,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aligned => "aligned",
            Self::Shifted => "shifted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit trail event kinds recorded in `user_activity`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum ActivityAction {
    Register,
    Login,
    Print,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Print => "print",
        }
    }
}

/// Where a suggested print offset came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum OffsetSource {
    /// Averaged from community feedback for the printer model.
    Community,
    /// The user's own calibration defaults.
    User,
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Email + password registration.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Email + password login.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned on successful login / register.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: UserProfile,
}

/// Change password request.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Update the caller's printer calibration defaults.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UpdateCalibrationRequest {
    #[serde(default)]
    pub printer_model: Option<String>,
    pub default_offset_x: f64,
    pub default_offset_y: f64,
}

/// Full user profile returned by `GET /api/auth/me` and admin listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub plan_id: Option<String>,
    pub credits: i64,
    pub printer_model: Option<String>,
    pub default_offset_x: f64,
    pub default_offset_y: f64,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

/// Generic success response for operations that don't return data.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct OkResponse {
    pub ok: bool,
}

// ─── Projects ────────────────────────────────────────────────────────────────

/// Request body for `POST /api/projects`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct CreateProjectRequest {
    pub name: String,
    /// Serialized canvas document produced by the editor.
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub canvas: serde_json::Value,
    #[serde(default)]
    pub template_id: Option<String>,
    pub width_mm: f64,
    pub height_mm: f64,
    #[serde(default)]
    pub offset_x: Option<f64>,
    #[serde(default)]
    pub offset_y: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Request body for `PUT /api/projects/:id`. Absent fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub canvas: Option<serde_json::Value>,
    #[serde(default)]
    pub width_mm: Option<f64>,
    #[serde(default)]
    pub height_mm: Option<f64>,
    #[serde(default)]
    pub offset_x: Option<f64>,
    #[serde(default)]
    pub offset_y: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Project metadata without the canvas document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub template_id: Option<String>,
    pub width_mm: f64,
    pub height_mm: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub thumbnail: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Project with its canvas document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: ProjectSummary,
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub canvas: serde_json::Value,
}

/// Returned by `GET /api/projects`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectSummary>,
}

// ─── Templates ───────────────────────────────────────────────────────────────

/// Request body for `POST /api/templates`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Request body for `PUT /api/templates/:id`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub width_mm: Option<f64>,
    #[serde(default)]
    pub height_mm: Option<f64>,
}

/// A user-defined canvas size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct TemplateResponse {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub width_mm: f64,
    pub height_mm: f64,
    pub created_at: String,
}

/// Returned by `GET /api/templates`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateResponse>,
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// A pricing tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub credits: i64,
    pub description: Option<String>,
    pub is_active: bool,
}

/// Request body for `POST /api/admin/plans`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct CreatePlanRequest {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub credits: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Request body for `PUT /api/admin/plans/:id`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UpdatePlanRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub credits: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Returned by `GET /api/plans`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PlanListResponse {
    pub plans: Vec<PlanResponse>,
}

// ─── Admin ───────────────────────────────────────────────────────────────────

/// Query parameters for `GET /api/admin/users`.
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AdminUserListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub search: Option<String>,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    20
}

impl AdminUserListQuery {
    /// Clamp pagination to `page >= 1` and `1 <= per_page <= 100`.
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.per_page.clamp(1, 100))
    }
}

/// Paginated user listing for the admin dashboard.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AdminUserListResponse {
    pub users: Vec<UserProfile>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Request body for `PUT /api/admin/users/:id`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AdminUpdateUserRequest {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub credits: Option<i64>,
}

/// Key/value configuration (read and write shape).
#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SettingsPayload {
    pub settings: BTreeMap<String, String>,
}

/// Query parameters for `GET /api/admin/activity`.
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ActivityQuery {
    #[serde(default = "default_activity_limit")]
    pub limit: u32,
}

fn default_activity_limit() -> u32 {
    50
}

/// One audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: String,
    pub email: Option<String>,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: String,
}

/// Returned by `GET /api/admin/activity`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ActivityListResponse {
    pub activity: Vec<ActivityEntry>,
}

/// Row counts for the admin dashboard.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct StatsResponse {
    pub users: i64,
    pub projects: i64,
    pub templates: i64,
    pub prints: i64,
    pub feedback: i64,
}

// ─── Printing & calibration ──────────────────────────────────────────────────

/// Request body for `POST /api/prints`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PrintRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub printer_model: Option<String>,
}

/// Returned by `POST /api/prints`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PrintResponse {
    pub remaining_credits: i64,
    pub suggested_offset_x: f64,
    pub suggested_offset_y: f64,
    pub offset_source: OffsetSource,
}

/// Request body for `POST /api/printers/feedback`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct FeedbackRequest {
    pub printer_model: String,
    pub offset_x: f64,
    pub offset_y: f64,
    pub outcome: FeedbackOutcome,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Community-averaged calibration for one printer model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PrinterModelResponse {
    pub name: String,
    pub avg_offset_x: f64,
    pub avg_offset_y: f64,
    pub sample_count: i64,
    pub updated_at: String,
}

/// Returned by `GET /api/printers`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PrinterListResponse {
    pub printers: Vec<PrinterModelResponse>,
}

/// Per-model feedback aggregate for the admin analytics view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PrinterAnalytics {
    pub name: String,
    pub avg_offset_x: f64,
    pub avg_offset_y: f64,
    pub sample_count: i64,
    pub aligned: i64,
    pub shifted: i64,
    pub failed: i64,
    pub success_rate: f64,
}

/// Returned by `GET /api/admin/printers/analytics`.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PrinterAnalyticsResponse {
    pub printers: Vec<PrinterAnalytics>,
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code. The server converts this into
/// its own response type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

/// JSON error shape `{ "error": "..." }` returned by all error responses.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ApiError {
    pub error: String,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.message().to_string(),
        }
    }
}

// ─── TypeScript generation ───────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_db_text() {
        assert_eq!(Role::from_db(Role::Admin.as_str()), Role::Admin);
        assert_eq!(Role::from_db("user"), Role::User);
        assert_eq!(Role::from_db("superuser"), Role::User);
    }

    #[test]
    fn project_detail_flattens_summary_fields() {
        let detail = ProjectDetail {
            project: ProjectSummary {
                id: "p1".into(),
                name: "Mug wrap".into(),
                template_id: None,
                width_mm: 200.0,
                height_mm: 90.0,
                offset_x: 1.5,
                offset_y: -0.5,
                thumbnail: None,
                created_at: "2026-01-01 00:00:00".into(),
                updated_at: "2026-01-01 00:00:00".into(),
            },
            canvas: serde_json::json!({"objects": []}),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["id"], "p1");
        assert_eq!(value["width_mm"], 200.0);
        assert_eq!(value["canvas"]["objects"], serde_json::json!([]));
    }

    #[test]
    fn admin_user_query_clamps_pagination() {
        let q = AdminUserListQuery {
            page: 0,
            per_page: 1000,
            search: None,
        };
        assert_eq!(q.normalized(), (1, 100));
    }

    #[test]
    fn feedback_outcome_uses_snake_case_on_the_wire() {
        let outcome: FeedbackOutcome = serde_json::from_str("\"shifted\"").unwrap();
        assert_eq!(outcome, FeedbackOutcome::Shifted);
        assert_eq!(outcome.to_string(), "shifted");
    }

    #[test]
    fn service_error_maps_to_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(ServiceError::Forbidden("x".into()).status_code(), 403);
        let api: ApiError = (&ServiceError::NotFound("project not found".into())).into();
        assert_eq!(api.error, "project not found");
    }
}
