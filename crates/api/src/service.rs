//! Shared business logic: framework-agnostic pure functions.
//!
//! Route handlers stay thin adapters around these: validation, token
//! issuance and the printer calibration arithmetic live here.

use crate::{AuthResponse, OffsetSource, ServiceError, UserProfile};

/// Largest accepted canvas edge in millimetres.
pub const MAX_DIMENSION_MM: f64 = 2000.0;

/// Largest accepted print offset magnitude in millimetres.
pub const MAX_OFFSET_MM: f64 = 50.0;

// ─── Validation ─────────────────────────────────────────────────────────────

/// Validate and normalize an email address. Returns the lowercased, trimmed email.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || email.len() > 254 {
        return Err(ServiceError::BadRequest("invalid email address".into()));
    }
    Ok(email)
}

/// Validate a password (8-128 characters).
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    let len = password.chars().count();
    if len < 8 {
        return Err(ServiceError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if len > 128 {
        return Err(ServiceError::BadRequest(
            "password must be at most 128 characters".into(),
        ));
    }
    Ok(())
}

/// Validate and normalize a display name. Returns the trimmed name.
pub fn validate_name(name: &str) -> Result<String, ServiceError> {
    trimmed_len_between(name, 64, "name must be 1-64 characters")
}

/// Validate and normalize a project or template name.
pub fn validate_project_name(name: &str) -> Result<String, ServiceError> {
    trimmed_len_between(name, 120, "name must be 1-120 characters")
}

/// Validate and normalize a plan id slug (`[a-z0-9_-]`, 1-32 chars).
pub fn validate_plan_id(id: &str) -> Result<String, ServiceError> {
    let id = id.trim().to_lowercase();
    let valid = !id.is_empty()
        && id.len() <= 32
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ServiceError::BadRequest(
            "plan id must be 1-32 characters of a-z, 0-9, '-' or '_'".into(),
        ));
    }
    Ok(id)
}

/// Canvas width/height must be finite and within `(0, MAX_DIMENSION_MM]`.
pub fn validate_dimensions(width_mm: f64, height_mm: f64) -> Result<(), ServiceError> {
    let ok = |v: f64| v.is_finite() && v > 0.0 && v <= MAX_DIMENSION_MM;
    if !ok(width_mm) || !ok(height_mm) {
        return Err(ServiceError::BadRequest(format!(
            "dimensions must be between 0 and {MAX_DIMENSION_MM} mm"
        )));
    }
    Ok(())
}

/// Offsets must be finite and no larger than `MAX_OFFSET_MM` either way.
pub fn validate_offset(offset_x: f64, offset_y: f64) -> Result<(), ServiceError> {
    let ok = |v: f64| v.is_finite() && v.abs() <= MAX_OFFSET_MM;
    if !ok(offset_x) || !ok(offset_y) {
        return Err(ServiceError::BadRequest(format!(
            "offsets must be within ±{MAX_OFFSET_MM} mm"
        )));
    }
    Ok(())
}

/// Credits and prices can never be negative.
pub fn validate_non_negative(value: i64, field: &str) -> Result<(), ServiceError> {
    if value < 0 {
        return Err(ServiceError::BadRequest(format!(
            "{field} must not be negative"
        )));
    }
    Ok(())
}

fn trimmed_len_between(raw: &str, max: usize, msg: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim().to_string();
    let len = trimmed.chars().count();
    if len == 0 || len > max {
        return Err(ServiceError::BadRequest(msg.into()));
    }
    Ok(trimmed)
}

/// Parse a human-friendly boolean setting value (`1`, `true`, `yes`, `on`).
pub fn parse_bool_flag(raw: Option<&str>, default: bool) -> bool {
    raw.map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
    .unwrap_or(default)
}

// ─── Printer calibration ────────────────────────────────────────────────────

/// Normalize a printer model name so "Epson  ET-2800 " and "epson et-2800"
/// share one community average.
pub fn normalize_printer_model(name: &str) -> Result<String, ServiceError> {
    let normalized = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if normalized.is_empty() || normalized.chars().count() > 120 {
        return Err(ServiceError::BadRequest(
            "printer model must be 1-120 characters".into(),
        ));
    }
    Ok(normalized)
}

/// Running mean after adding one sample.
pub fn incremental_mean(old_avg: f64, old_count: i64, sample: f64) -> f64 {
    let old_count = old_count.max(0) as f64;
    (old_avg * old_count + sample) / (old_count + 1.0)
}

/// Averaged calibration state for a printer model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    pub avg_offset_x: f64,
    pub avg_offset_y: f64,
    pub sample_count: i64,
}

impl Calibration {
    /// Fold one `(offset_x, offset_y)` sample into the averages.
    pub fn apply_sample(self, offset_x: f64, offset_y: f64) -> Self {
        Self {
            avg_offset_x: incremental_mean(self.avg_offset_x, self.sample_count, offset_x),
            avg_offset_y: incremental_mean(self.avg_offset_y, self.sample_count, offset_y),
            sample_count: self.sample_count + 1,
        }
    }
}

/// Pick the offset to suggest for a print: the community average for the
/// printer model when it has samples, else the user's own defaults.
pub fn suggest_offset(
    community: Option<Calibration>,
    user_default: (f64, f64),
) -> (f64, f64, OffsetSource) {
    match community {
        Some(c) if c.sample_count > 0 => {
            (c.avg_offset_x, c.avg_offset_y, OffsetSource::Community)
        }
        _ => (user_default.0, user_default.1, OffsetSource::User),
    }
}

/// Fraction of feedback rows reporting an aligned print.
pub fn success_rate(aligned: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (aligned.max(0) as f64 / total as f64).clamp(0.0, 1.0)
}

// ─── Auth Tokens ────────────────────────────────────────────────────────────

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn resolve_bearer(header: Option<&str>) -> Result<&str, ServiceError> {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ServiceError::Unauthorized("missing or invalid Authorization header".into())
        })
}

/// Sign a JWT for `user` and wrap it in the login/register response.
pub fn issue_token(
    jwt_secret: &str,
    user: UserProfile,
    now_unix: u64,
) -> Result<AuthResponse, ServiceError> {
    if jwt_secret.is_empty() {
        return Err(ServiceError::Internal("JWT secret not configured".into()));
    }
    let token = crate::crypto::sign_jwt(&user.id, jwt_secret, now_unix);
    Ok(AuthResponse {
        token,
        expires_in: crate::crypto::JWT_EXPIRY_SECS,
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice").is_ok());
        assert_eq!(validate_name("  bob  ").unwrap(), "bob");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
        assert!(validate_name(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_email_normalizes() {
        assert_eq!(
            validate_email("  Jane@Example.COM ").unwrap(),
            "jane@example.com"
        );
        assert!(validate_email("no-at-sign").is_err());
    }

    #[test]
    fn test_validate_dimensions_and_offsets() {
        assert!(validate_dimensions(210.0, 297.0).is_ok());
        assert!(validate_dimensions(0.0, 10.0).is_err());
        assert!(validate_dimensions(10.0, MAX_DIMENSION_MM + 1.0).is_err());
        assert!(validate_dimensions(f64::NAN, 10.0).is_err());
        assert!(validate_offset(-3.5, 2.0).is_ok());
        assert!(validate_offset(0.0, -51.0).is_err());
    }

    #[test]
    fn test_validate_plan_id() {
        assert_eq!(validate_plan_id(" Pro ").unwrap(), "pro");
        assert!(validate_plan_id("team plan").is_err());
        assert!(validate_plan_id("").is_err());
    }

    #[test]
    fn test_normalize_printer_model() {
        assert_eq!(
            normalize_printer_model("  Epson   ET-2800 ").unwrap(),
            "epson et-2800"
        );
        assert!(normalize_printer_model("   ").is_err());
    }

    #[test]
    fn incremental_mean_matches_arithmetic_mean() {
        let samples = [1.0, -2.0, 4.5, 0.25, 3.0];
        let mut cal = Calibration::default();
        for s in samples {
            cal = cal.apply_sample(s, -s);
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert_eq!(cal.sample_count, 5);
        assert!((cal.avg_offset_x - mean).abs() < 1e-9);
        assert!((cal.avg_offset_y + mean).abs() < 1e-9);
    }

    #[test]
    fn first_sample_becomes_the_average() {
        assert_eq!(incremental_mean(0.0, 0, 2.5), 2.5);
        assert_eq!(incremental_mean(2.0, 1, 4.0), 3.0);
    }

    #[test]
    fn suggest_offset_prefers_community_average_with_samples() {
        let community = Calibration {
            avg_offset_x: 1.0,
            avg_offset_y: 2.0,
            sample_count: 3,
        };
        assert_eq!(
            suggest_offset(Some(community), (9.0, 9.0)),
            (1.0, 2.0, OffsetSource::Community)
        );
        assert_eq!(
            suggest_offset(Some(Calibration::default()), (0.5, -0.5)),
            (0.5, -0.5, OffsetSource::User)
        );
        assert_eq!(suggest_offset(None, (0.0, 0.0)).2, OffsetSource::User);
    }

    #[test]
    fn success_rate_handles_empty_feedback() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(3, 4), 0.75);
    }

    #[test]
    fn resolve_bearer_requires_prefix() {
        assert_eq!(resolve_bearer(Some("Bearer abc")).unwrap(), "abc");
        assert!(resolve_bearer(Some("Basic abc")).is_err());
        assert!(resolve_bearer(Some("Bearer  ")).is_err());
        assert!(resolve_bearer(None).is_err());
    }

    #[test]
    fn parses_bool_flags() {
        for value in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool_flag(Some(value), false));
        }
        for value in ["0", "false", "no", "off", ""] {
            assert!(!parse_bool_flag(Some(value), true));
        }
        assert!(parse_bool_flag(None, true));
    }
}
