use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    oauth::{self, OAuthProvider, SocialUserInfo},
    web::{AppState, auth},
};

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const STATE_COOKIE_TTL_MINUTES: i64 = 10;

#[derive(Default, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// `GET /auth/{provider}/login`: stash a state token in a short-lived cookie
/// and send the browser to the provider's authorize endpoint.
pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), StatusCode> {
    let Some(provider) = OAuthProvider::parse(&provider) else {
        return Err(StatusCode::NOT_FOUND);
    };
    if !state.oauth().is_configured(provider) {
        return Ok((jar, auth_error_redirect("provider_not_configured")));
    }

    let state_token = oauth::generate_state_token();
    let redirect_uri = state.config().callback_url(provider.as_str());

    let authorize_url = match state
        .oauth()
        .authorization_url(provider, &redirect_uri, &state_token)
    {
        Ok(url) => url,
        Err(err) => {
            error!(?err, %provider, "failed to build authorization url");
            return Ok((jar, auth_error_redirect("provider_error")));
        }
    };

    let mut cookie = Cookie::new(OAUTH_STATE_COOKIE, state_token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::minutes(STATE_COOKIE_TTL_MINUTES));

    Ok((jar.add(cookie), Redirect::to(&authorize_url)))
}

/// `GET /auth/{provider}/callback`: state check, code-for-token exchange,
/// profile fetch, then get-or-create of the local user. Every failure aborts
/// with an `auth_error` code before any session is written.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), StatusCode> {
    let Some(provider) = OAuthProvider::parse(&provider) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let stored_state = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let jar = remove_state_cookie(jar);

    if !oauth::state_matches(stored_state.as_deref(), params.state.as_deref()) {
        return Ok((jar, auth_error_redirect("invalid_state")));
    }

    if let Some(provider_error) = params.error.as_deref() {
        return Ok((jar, auth_error_redirect(provider_error)));
    }

    let Some(code) = params.code.as_deref() else {
        return Ok((jar, auth_error_redirect("no_code")));
    };

    let redirect_uri = state.config().callback_url(provider.as_str());
    let token = match state.oauth().exchange_code(provider, code, &redirect_uri).await {
        Ok(token) => token,
        Err(err) => {
            error!(?err, %provider, "token exchange failed");
            return Ok((jar, auth_error_redirect("token_exchange_failed")));
        }
    };

    let Some(access_token) = token.access_token.as_deref() else {
        return Ok((jar, auth_error_redirect("no_access_token")));
    };

    let user_info = match state.oauth().fetch_profile(provider, access_token).await {
        Ok(info) => info,
        Err(err) => {
            error!(?err, %provider, "profile fetch failed");
            return Ok((jar, auth_error_redirect("profile_fetch_failed")));
        }
    };

    let user_id = match upsert_social_user(state.pool_ref(), &user_info).await {
        Ok(user_id) => user_id,
        Err(err) => {
            error!(?err, %provider, "failed to persist social profile");
            return Ok((jar, auth_error_redirect("login_failed")));
        }
    };

    match auth::start_session(state.pool_ref(), user_id).await {
        Ok(cookie) => {
            info!(%provider, %user_id, "social login completed");
            Ok((jar.add(cookie), Redirect::to("/")))
        }
        Err(err) => {
            error!(?err, "failed to create session after social login");
            Ok((jar, auth_error_redirect("login_failed")))
        }
    }
}

/// Get-or-create of the (provider, provider_id) pair. First login creates one
/// user and one profile; later logins only refresh nickname and avatar.
async fn upsert_social_user(pool: &PgPool, info: &SocialUserInfo) -> Result<Uuid> {
    let mut transaction = pool.begin().await.context("failed to open transaction")?;

    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM social_profiles WHERE provider = $1 AND provider_id = $2",
    )
    .bind(info.provider.as_str())
    .bind(&info.provider_id)
    .fetch_optional(&mut *transaction)
    .await
    .context("failed to look up social profile")?;

    let user_id = if let Some(user_id) = existing {
        sqlx::query(
            "UPDATE social_profiles SET nickname = $1, profile_image_url = $2
             WHERE provider = $3 AND provider_id = $4",
        )
        .bind(&info.nickname)
        .bind(&info.profile_image_url)
        .bind(info.provider.as_str())
        .bind(&info.provider_id)
        .execute(&mut *transaction)
        .await
        .context("failed to refresh social profile")?;

        user_id
    } else {
        let username = format!("{}_{}", info.provider, info.provider_id);

        let user_id: Uuid = match sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
            .bind(&username)
            .fetch_optional(&mut *transaction)
            .await
            .context("failed to look up user")?
        {
            Some(user_id) => user_id,
            None => {
                let user_id = Uuid::new_v4();
                sqlx::query("INSERT INTO users (id, username, email) VALUES ($1, $2, $3)")
                    .bind(user_id)
                    .bind(&username)
                    .bind(info.email.as_deref())
                    .execute(&mut *transaction)
                    .await
                    .context("failed to create user")?;
                user_id
            }
        };

        sqlx::query(
            "INSERT INTO social_profiles (id, user_id, provider, provider_id, nickname, profile_image_url)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(info.provider.as_str())
        .bind(&info.provider_id)
        .bind(&info.nickname)
        .bind(&info.profile_image_url)
        .execute(&mut *transaction)
        .await
        .context("failed to create social profile")?;

        user_id
    };

    transaction.commit().await.context("failed to commit login")?;

    Ok(user_id)
}

fn auth_error_redirect(code: &str) -> Redirect {
    Redirect::to(&format!("/?auth_error={code}"))
}

fn remove_state_cookie(jar: CookieJar) -> CookieJar {
    let mut removal = Cookie::new(OAUTH_STATE_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    jar.remove(removal)
}
