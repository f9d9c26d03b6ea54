use axum::{
    extract::State,
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Local, Utc};
use sqlx::PgPool;
use tracing::error;

use crate::{
    history,
    web::{AppState, auth::require_admin, escape_html, templates},
};

const HISTORY_ROWS: i64 = 50;

#[derive(sqlx::FromRow)]
struct SocialProfileRow {
    provider: String,
    provider_id: String,
    nickname: String,
    username: String,
    connected_at: DateTime<Utc>,
}

/// Admin list views over the audit tables: recent evaluations, today's
/// request volume, and connected social profiles.
pub async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let admin = require_admin(&state, &jar).await?;

    let history = history::fetch_recent(state.pool_ref(), HISTORY_ROWS)
        .await
        .map_err(|err| {
            error!(?err, "failed to load analysis history");
            Redirect::to("/dashboard/login")
        })?;

    let profiles = fetch_social_profiles(state.pool_ref()).await.map_err(|err| {
        error!(?err, "failed to load social profiles");
        Redirect::to("/dashboard/login")
    })?;

    let today_requests = count_today_requests(state.pool_ref()).await.map_err(|err| {
        error!(?err, "failed to count today's requests");
        Redirect::to("/dashboard/login")
    })?;

    let mut history_rows = String::new();
    if history.is_empty() {
        history_rows.push_str(r#"<tr><td colspan="5">아직 분석 이력이 없습니다.</td></tr>"#);
    } else {
        for row in &history {
            let who = row.username.as_deref().unwrap_or(&row.ip_address);
            history_rows.push_str(&format!(
                "<tr><td>{requested_at}</td><td>{provider}</td><td>{who}</td><td>{ip}</td><td>{filename}</td></tr>",
                requested_at = row.requested_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                provider = escape_html(&row.provider),
                who = escape_html(who),
                ip = escape_html(&row.ip_address),
                filename = escape_html(&row.resume_filename),
            ));
        }
    }

    let mut profile_rows = String::new();
    if profiles.is_empty() {
        profile_rows.push_str(r#"<tr><td colspan="5">연결된 소셜 계정이 없습니다.</td></tr>"#);
    } else {
        for profile in &profiles {
            profile_rows.push_str(&format!(
                "<tr><td>{provider}</td><td>{provider_id}</td><td>{nickname}</td><td>{username}</td><td>{connected_at}</td></tr>",
                provider = escape_html(&profile.provider),
                provider_id = escape_html(&profile.provider_id),
                nickname = escape_html(&profile.nickname),
                username = escape_html(&profile.username),
                connected_at = profile
                    .connected_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M"),
            ));
        }
    }

    let sections = format!(
        r#"<section class="panel">
            <h2>오늘의 요청</h2>
            <p>오늘 접수된 분석 요청: <strong>{today_requests}</strong>건</p>
        </section>
        <section class="panel">
            <h2>분석 이력 (최근 {history_limit}건)</h2>
            <table>
                <thead><tr><th>요청 일시</th><th>AI 모델</th><th>사용자</th><th>IP</th><th>이력서 파일명</th></tr></thead>
                <tbody>{history_rows}</tbody>
            </table>
        </section>
        <section class="panel">
            <h2>소셜 프로필</h2>
            <table>
                <thead><tr><th>Provider</th><th>Provider ID</th><th>닉네임</th><th>계정</th><th>연결 일시</th></tr></thead>
                <tbody>{profile_rows}</tbody>
            </table>
        </section>"#,
        today_requests = today_requests,
        history_limit = HISTORY_ROWS,
        history_rows = history_rows,
        profile_rows = profile_rows,
    );

    Ok(Html(templates::render_dashboard_shell(
        &admin.username,
        &sections,
    )))
}

async fn fetch_social_profiles(pool: &PgPool) -> sqlx::Result<Vec<SocialProfileRow>> {
    sqlx::query_as::<_, SocialProfileRow>(
        "SELECT p.provider, p.provider_id, p.nickname, u.username, p.connected_at
         FROM social_profiles p
         JOIN users u ON u.id = p.user_id
         ORDER BY p.connected_at DESC",
    )
    .fetch_all(pool)
    .await
}

async fn count_today_requests(pool: &PgPool) -> sqlx::Result<i64> {
    let day_start = crate::quota::local_day_start(Local::now());
    sqlx::query_scalar("SELECT COUNT(*) FROM request_logs WHERE requested_at >= $1")
        .bind(day_start)
        .fetch_one(pool)
        .await
}
