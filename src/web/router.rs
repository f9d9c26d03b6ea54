use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    modules,
    web::{AppState, auth, dashboard, social},
};

const ROBOTS_TXT_BODY: &str = include_str!("../../robots.txt");

// Two 5 MiB uploads plus the JD text and multipart framing.
const MAX_REQUEST_BODY_BYTES: usize = 12 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(modules::evaluator::router())
        .route("/auth/:provider/login", get(social::login))
        .route("/auth/:provider/callback", get(social::callback))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/dashboard/login",
            get(auth::admin_login_page).post(auth::process_admin_login),
        )
        .route("/dashboard", get(dashboard::dashboard))
        .route("/healthz", get(healthz))
        .route("/robots.txt", get(robots_txt))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn robots_txt() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ROBOTS_TXT_BODY,
    )
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
