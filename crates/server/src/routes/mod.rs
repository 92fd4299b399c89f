pub mod admin;
pub mod auth;
pub mod health;
pub mod plans;
pub mod prints;
pub mod projects;
pub mod templates;

/// Current time as unix seconds, for JWT issue/verify.
pub(crate) fn now_unix() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
