use std::path::PathBuf;

use sublimate_api::{Role, db};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::routes::auth::AuthUser;
use crate::storage::{Db, init_db};
use crate::AppState;

pub const TEST_SECRET: &str = "test-jwt-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        base_url: "http://localhost:3000".into(),
        port: 3000,
        database_url: ":memory:".into(),
        jwt_secret: TEST_SECRET.into(),
        admin_emails: Vec::new(),
        web_dir: PathBuf::from("web/build"),
    }
}

pub fn test_state() -> AppState {
    AppState {
        db: init_db(":memory:").unwrap(),
        config: test_config(),
    }
}

/// Insert a user directly, skipping password hashing.
pub fn insert_user(db: &Db, email: &str, role: Role, credits: i64) -> AuthUser {
    let id = Uuid::new_v4().to_string();
    db.run(db::users::insert(&db::users::InsertParams {
        id: &id,
        email,
        name: "Test User",
        password_hash: "00",
        password_salt: "00",
        role,
        plan_id: Some("free"),
        credits,
    }))
    .unwrap();
    AuthUser {
        user_id: id,
        email: email.to_string(),
        role,
    }
}
