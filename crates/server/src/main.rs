mod config;
mod error;
mod extract;
mod routes;
mod storage;
#[cfg(test)]
mod test_support;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// All `/api` routes plus the SPA fallback.
fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/password", put(routes::auth::change_password))
        .route("/auth/calibration", put(routes::auth::update_calibration))
        // Projects
        .route(
            "/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/projects/{id}",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        // Templates
        .route(
            "/templates",
            get(routes::templates::list_templates).post(routes::templates::create_template),
        )
        .route(
            "/templates/{id}",
            put(routes::templates::update_template).delete(routes::templates::delete_template),
        )
        // Plans
        .route("/plans", get(routes::plans::list_plans))
        // Prints + calibration
        .route("/prints", post(routes::prints::log_print))
        .route("/printers", get(routes::prints::list_printers))
        .route("/printers/feedback", post(routes::prints::submit_feedback))
        .route("/printers/{name}", get(routes::prints::get_printer))
        // Admin
        .route("/admin/users", get(routes::admin::list_users))
        .route(
            "/admin/users/{id}",
            put(routes::admin::update_user).delete(routes::admin::delete_user),
        )
        .route("/admin/plans", post(routes::plans::create_plan))
        .route(
            "/admin/plans/{id}",
            put(routes::plans::update_plan).delete(routes::plans::delete_plan),
        )
        .route(
            "/admin/settings",
            get(routes::admin::get_settings).put(routes::admin::update_settings),
        )
        .route("/admin/activity", get(routes::admin::list_activity))
        .route("/admin/stats", get(routes::admin::stats))
        .route(
            "/admin/printers/analytics",
            get(routes::prints::printer_analytics),
        );

    let mut app = Router::new().nest("/api", api);

    // Serve the SPA build if present
    let web_dir = &state.config.web_dir;
    if web_dir.exists() {
        tracing::info!("serving static files from {}", web_dir.display());
        let index_html = web_dir.join("index.html");
        app = app.fallback_service(ServeDir::new(web_dir).fallback(ServeFile::new(index_html)));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sublimate_server=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    let db = storage::init_db(&config.database_url)?;
    tracing::info!("database initialized");

    if config.admin_emails.is_empty() {
        tracing::warn!("ADMIN_EMAILS not set; no account will be granted the admin role");
    }

    let port = config.port;
    let base_url = config.base_url.clone();
    let app = build_router(AppState { db, config });

    tracing::info!("starting server at {base_url}");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
