pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod err;
pub mod io;
pub mod models;
pub mod students;
pub mod validate;


use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;

use crate::auth::{Credentials, SessionKeys};
use crate::config::Config;
use crate::db::StudentRepository;
pub use crate::err::Error;

pub type Payload<T> = Result<Json<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(value))
}

/// Everything a handler needs, built once from [`Config`].
pub struct AppState {
    pub credentials: Credentials,
    pub keys: SessionKeys,
    pub students: StudentRepository,
}

impl AppState {
    pub fn new(config: &Config, students: StudentRepository) -> Result<Self, Error> {
        Ok(Self {
            credentials: Credentials::new(&config.username, &config.password)?,
            keys: SessionKeys::new(&config.jwt_secret),
            students,
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route(
            "/students/:id",
            get(students::read_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route("/analytics", get(analytics::read_analytics))
        .route_layer(middleware::from_fn(auth::require_session));

    Router::new()
        .route("/", get(root))
        .route("/auth/login", post(auth::login))
        .merge(protected)
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}

async fn root() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .init();
    config.warn_placeholders();

    io::prepare_data_dir(&config.db_file).await?;
    let pool = db::connect(&config.db_file).await?;
    let version = db::migrate(&pool).await?;
    log::info!(
        "Database {} ready at schema version {}",
        config.db_file.display(),
        version
    );

    let state = Arc::new(AppState::new(&config, StudentRepository::new(pool))?);
    let app = app(state).layer(ServiceBuilder::new().layer(config.cors_layer()?));

    let listener = io::bind_listener(config.port)?;
    log::info!(
        "Starting TeacherDash HTTP Server on http://{}",
        listener.local_addr()?
    );
    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
