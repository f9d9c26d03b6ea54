use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

pub const ANONYMOUS_DAILY_LIMIT: i64 = 1;
pub const USER_DAILY_LIMIT: i64 = 3;

/// Counters backing the remaining-quota display on the form page.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaSnapshot {
    pub used: i64,
    pub limit: i64,
}

impl QuotaSnapshot {
    pub fn remaining(&self) -> i64 {
        (self.limit - self.used).max(0)
    }
}

#[derive(Debug)]
pub enum QuotaError {
    Exceeded { limit: i64 },
    Backend,
}

impl QuotaError {
    pub fn message(&self) -> String {
        match self {
            QuotaError::Exceeded { limit } => format!(
                "오늘의 분석 요청 한도({limit}회)를 초과했습니다. 내일 다시 이용해주세요."
            ),
            QuotaError::Backend => "요청 한도 확인에 실패했습니다. 잠시 후 다시 시도해주세요.".to_string(),
        }
    }
}

/// Daily ceiling per identity: logged-in users get a higher allowance.
pub fn daily_limit(user_id: Option<Uuid>) -> i64 {
    if user_id.is_some() {
        USER_DAILY_LIMIT
    } else {
        ANONYMOUS_DAILY_LIMIT
    }
}

/// Start of the calendar day containing `now`, in server-local time. Counting
/// against this boundary makes quotas reset at local midnight rather than on
/// a rolling 24 h window.
pub fn local_day_start(now: DateTime<Local>) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    match Local.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(start) | chrono::LocalResult::Ambiguous(start, _) => {
            start.with_timezone(&Utc)
        }
        // DST gap at midnight: fall back to the UTC reading of the same date.
        chrono::LocalResult::None => Utc.from_utc_datetime(&midnight),
    }
}

/// Counts today's accepted requests for this identity: scoped to the user
/// when authenticated, otherwise to the client IP.
pub async fn today_count(pool: &PgPool, ip_address: &str, user_id: Option<Uuid>) -> Result<i64> {
    let day_start = local_day_start(Local::now());

    let count: i64 = match user_id {
        Some(user_id) => sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_logs WHERE user_id = $1 AND requested_at >= $2",
        )
        .bind(user_id)
        .bind(day_start)
        .fetch_one(pool)
        .await
        .context("failed to count user requests")?,
        None => sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_logs WHERE ip_address = $1 AND requested_at >= $2",
        )
        .bind(ip_address)
        .bind(day_start)
        .fetch_one(pool)
        .await
        .context("failed to count ip requests")?,
    };

    Ok(count)
}

/// Permits the request or reports a quota-exceeded condition. No locking:
/// concurrent requests from one identity can all pass before any of them
/// logs, allowing transient over-quota by the degree of concurrency.
pub async fn ensure_within_limit(
    pool: &PgPool,
    ip_address: &str,
    user_id: Option<Uuid>,
) -> Result<QuotaSnapshot, QuotaError> {
    let limit = daily_limit(user_id);
    let used = match today_count(pool, ip_address, user_id).await {
        Ok(used) => used,
        Err(err) => {
            error!(?err, "failed to load request count");
            return Err(QuotaError::Backend);
        }
    };

    if used >= limit {
        return Err(QuotaError::Exceeded { limit });
    }

    Ok(QuotaSnapshot { used, limit })
}

/// Appends one request-log row for an accepted evaluation.
pub async fn record_request(pool: &PgPool, ip_address: &str, user_id: Option<Uuid>) -> Result<()> {
    sqlx::query(
        "INSERT INTO request_logs (id, ip_address, user_id, requested_at) VALUES ($1, $2, $3, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(ip_address)
    .bind(user_id)
    .execute(pool)
    .await
    .context("failed to insert request log")?;

    Ok(())
}

/// Remaining requests for display. Backend failures degrade to zero so the
/// page still renders.
pub async fn remaining_requests(pool: &PgPool, ip_address: &str, user_id: Option<Uuid>) -> i64 {
    let limit = daily_limit(user_id);
    match today_count(pool, ip_address, user_id).await {
        Ok(used) => QuotaSnapshot { used, limit }.remaining(),
        Err(err) => {
            error!(?err, "failed to compute remaining requests");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn limits_differ_by_identity() {
        assert_eq!(daily_limit(None), 1);
        assert_eq!(daily_limit(Some(Uuid::new_v4())), 3);
    }

    #[test]
    fn remaining_clamps_at_zero() {
        let over = QuotaSnapshot { used: 5, limit: 3 };
        assert_eq!(over.remaining(), 0);

        let under = QuotaSnapshot { used: 1, limit: 3 };
        assert_eq!(under.remaining(), 2);
    }

    #[test]
    fn same_local_day_shares_a_window_start() {
        let morning = Local.with_ymd_and_hms(2024, 5, 20, 0, 30, 0).unwrap();
        let night = Local.with_ymd_and_hms(2024, 5, 20, 23, 45, 0).unwrap();
        assert_eq!(local_day_start(morning), local_day_start(night));
    }

    #[test]
    fn window_start_advances_when_the_day_changes() {
        let today = Local.with_ymd_and_hms(2024, 5, 20, 23, 59, 0).unwrap();
        let tomorrow = today + Duration::minutes(2);
        let delta = local_day_start(tomorrow) - local_day_start(today);
        assert_eq!(delta, Duration::days(1));
    }

    #[test]
    fn window_start_is_not_a_rolling_window() {
        let now = Local.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap();
        let start = local_day_start(now);
        // 10:00 local is 10 hours past the window start, not 24.
        assert_eq!(now.with_timezone(&Utc) - start, Duration::hours(10));
    }

    #[test]
    fn exceeded_message_names_the_limit() {
        let err = QuotaError::Exceeded { limit: 3 };
        assert!(err.message().contains("3회"));
    }
}
