use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    extract::{Form, Query, State},
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::web::{AppState, templates};

pub const SESSION_COOKIE: &str = "session_token";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Resolved session identity: either an OAuth user or the dashboard admin.
#[derive(Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Clone, sqlx::FromRow)]
struct DbAdminAuth {
    id: Uuid,
    password_hash: Option<String>,
}

#[derive(Deserialize)]
pub struct AdminLoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Default, Deserialize)]
pub struct AdminLoginQuery {
    pub error: Option<String>,
}

pub async fn admin_login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AdminLoginQuery>,
) -> Result<Html<String>, Redirect> {
    if let Some(user) = current_user(&state, &jar).await {
        if user.is_admin {
            return Err(Redirect::to("/dashboard"));
        }
    }

    let error = params.error.as_deref().map(|_| "아이디 또는 비밀번호가 올바르지 않습니다.");
    Ok(Html(templates::render_admin_login_page(error)))
}

pub async fn process_admin_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<AdminLoginForm>,
) -> Result<(CookieJar, Redirect), Redirect> {
    let username = form.username.trim();
    let failed = || Redirect::to("/dashboard/login?error=invalid_credentials");

    let admin = match fetch_admin_by_username(state.pool_ref(), username).await {
        Ok(Some(admin)) => admin,
        Ok(None) => return Err(failed()),
        Err(err) => {
            error!(?err, "failed to fetch admin during login");
            return Err(failed());
        }
    };

    let Some(password_hash) = admin.password_hash.as_deref() else {
        return Err(failed());
    };
    if !verify_password(&form.password, password_hash) {
        return Err(failed());
    }

    match start_session(state.pool_ref(), admin.id).await {
        Ok(cookie) => Ok((jar.add(cookie), Redirect::to("/dashboard"))),
        Err(err) => {
            error!(?err, "failed to create admin session");
            Err(failed())
        }
    }
}

/// `POST /auth/logout`: drops the session row, clears the cookie, goes home.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let mut jar = jar;

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(token) = Uuid::parse_str(cookie.value()) {
            if let Err(err) = sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(token)
                .execute(state.pool_ref())
                .await
            {
                error!(?err, "failed to remove session during logout");
            }
        }
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    jar = jar.remove(removal);

    (jar, Redirect::to("/"))
}

/// Creates a session row and returns the cookie carrying its token. Shared by
/// the OAuth callback and the admin login.
pub async fn start_session(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Cookie<'static>> {
    let session_token = Uuid::new_v4();
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(session_token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;

    let mut cookie = Cookie::new(SESSION_COOKIE, session_token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));

    Ok(cookie)
}

/// Resolves the session cookie into a user. Errors are logged and treated as
/// an anonymous visitor so every page still renders.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Option<AuthUser> {
    let token_cookie = jar.get(SESSION_COOKIE)?;
    let token = Uuid::parse_str(token_cookie.value()).ok()?;

    match fetch_user_by_session(state.pool_ref(), token).await {
        Ok(user) => user,
        Err(err) => {
            error!(?err, "failed to resolve session");
            None
        }
    }
}

/// Access gate for the dashboard pages.
pub async fn require_admin(state: &AppState, jar: &CookieJar) -> Result<AuthUser, Redirect> {
    match current_user(state, jar).await {
        Some(user) if user.is_admin => Ok(user),
        _ => Err(Redirect::to("/dashboard/login")),
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

async fn fetch_admin_by_username(pool: &PgPool, username: &str) -> sqlx::Result<Option<DbAdminAuth>> {
    sqlx::query_as::<_, DbAdminAuth>(
        "SELECT id, password_hash FROM users WHERE username = $1 AND is_admin = TRUE",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_user_by_session(pool: &PgPool, token: Uuid) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>(
        "SELECT users.id, users.username, users.is_admin FROM sessions JOIN users ON users.id = sessions.user_id WHERE sessions.id = $1 AND sessions.expires_at > NOW()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("change-me").expect("hash");
        assert!(verify_password("change-me", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hashes() {
        assert!(!verify_password("change-me", "not-a-phc-string"));
    }
}
