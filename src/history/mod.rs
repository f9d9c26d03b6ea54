use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const DASHBOARD_LIMIT: i64 = 50;

/// One completed evaluation, as listed on the admin dashboard.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisHistoryRow {
    pub ip_address: String,
    pub username: Option<String>,
    pub provider: String,
    pub resume_filename: String,
    pub requested_at: DateTime<Utc>,
}

/// Appends one audit row for a completed evaluation. Rows are write-only for
/// the application; only the dashboard reads them back.
pub async fn record_analysis(
    pool: &PgPool,
    ip_address: &str,
    user_id: Option<Uuid>,
    provider: &str,
    resume_filename: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO analysis_history (id, ip_address, user_id, provider, resume_filename, requested_at)
         VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(ip_address)
    .bind(user_id)
    .bind(provider)
    .bind(resume_filename)
    .execute(pool)
    .await
    .context("failed to insert analysis history")?;

    Ok(())
}

pub async fn fetch_recent(pool: &PgPool, limit: i64) -> Result<Vec<AnalysisHistoryRow>> {
    let limit = limit.clamp(1, DASHBOARD_LIMIT);

    sqlx::query_as::<_, AnalysisHistoryRow>(
        "SELECT h.ip_address, u.username, h.provider, h.resume_filename, h.requested_at
         FROM analysis_history h
         LEFT JOIN users u ON u.id = h.user_id
         ORDER BY h.requested_at DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to load analysis history")
}
