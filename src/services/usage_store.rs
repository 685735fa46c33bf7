//! Append-only Usage Record log, plus the filtered read queries the
//! dashboards consume (§4.5). The append path is a single insert; the
//! read side follows the teacher's `log_service::list_logs`
//! dynamic-WHERE-clause pattern.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::usage_record::{KeyUsageSummary, NewUsageRecord, UsageBucket};

/// §4.3/§3 — write one Usage Record. At most one call per upstream
/// response; `request_id` is the primary key so a duplicate call is
/// itself a bug, not something this layer papers over.
pub async fn append(db: &PgPool, record: NewUsageRecord) -> Result<(), AppError> {
    sqlx::query(
        r#"INSERT INTO requests
           (id, key_id, model_alias, snapshot_date, input_tokens, cached_input_tokens,
            output_tokens, was_estimated, request_time)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())"#,
    )
    .bind(&record.request_id)
    .bind(record.key_id)
    .bind(&record.model_alias)
    .bind(&record.snapshot_date)
    .bind(record.input_tokens)
    .bind(record.cached_input_tokens)
    .bind(record.output_tokens)
    .bind(record.was_estimated)
    .execute(db)
    .await?;

    Ok(())
}

/// Dashboard filter names, mapped to a bucketing granularity and a SQL
/// time-range predicate (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardFilter {
    Last24Hours,
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
}

impl DashboardFilter {
    fn granularity(self) -> &'static str {
        match self {
            DashboardFilter::Last24Hours => "hour",
            DashboardFilter::Last7Days
            | DashboardFilter::Last30Days
            | DashboardFilter::ThisMonth
            | DashboardFilter::LastMonth => "day",
            DashboardFilter::ThisYear | DashboardFilter::LastYear => "month",
        }
    }

    /// A SQL boolean expression over `request_time`, safe to splice
    /// because it is chosen from this fixed enum, never from user input.
    fn time_predicate(self) -> &'static str {
        match self {
            DashboardFilter::Last24Hours => "request_time >= NOW() - INTERVAL '24 hours'",
            DashboardFilter::Last7Days => "request_time >= NOW() - INTERVAL '7 days'",
            DashboardFilter::Last30Days => "request_time >= NOW() - INTERVAL '30 days'",
            DashboardFilter::ThisMonth => {
                "request_time >= date_trunc('month', NOW()) AND request_time < date_trunc('month', NOW()) + INTERVAL '1 month'"
            }
            DashboardFilter::LastMonth => {
                "request_time >= date_trunc('month', NOW()) - INTERVAL '1 month' AND request_time < date_trunc('month', NOW())"
            }
            DashboardFilter::ThisYear => {
                "request_time >= date_trunc('year', NOW()) AND request_time < date_trunc('year', NOW()) + INTERVAL '1 year'"
            }
            DashboardFilter::LastYear => {
                "request_time >= date_trunc('year', NOW()) - INTERVAL '1 year' AND request_time < date_trunc('year', NOW())"
            }
        }
    }
}

pub enum Subject {
    User(Uuid),
    ApiKey(Uuid),
}

fn subject_predicate(subject: &Subject) -> &'static str {
    match subject {
        Subject::User(_) => "r.key_id IN (SELECT id FROM api_keys WHERE owner_id = $1)",
        Subject::ApiKey(_) => "r.key_id = $1",
    }
}

fn subject_id(subject: &Subject) -> Uuid {
    match subject {
        Subject::User(id) | Subject::ApiKey(id) => *id,
    }
}

/// §4.5 — per-key summary for owner `O`: sum tokens grouped by key-id.
pub async fn per_key_summary(db: &PgPool, owner: Uuid) -> Result<Vec<KeyUsageSummary>, AppError> {
    let rows = sqlx::query_as::<_, KeyUsageSummary>(
        r#"SELECT r.key_id as key_id,
                  COALESCE(SUM(r.input_tokens), 0) as input_tokens,
                  COALESCE(SUM(r.cached_input_tokens), 0) as cached_input_tokens,
                  COALESCE(SUM(r.output_tokens), 0) as output_tokens
           FROM requests r
           JOIN api_keys k ON k.id = r.key_id
           WHERE k.owner_id = $1
           GROUP BY r.key_id"#,
    )
    .bind(owner)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

/// §4.5 — time-bucketed series for a subject over filter `F`, grouped
/// also by model.
pub async fn time_series(
    db: &PgPool,
    subject: Subject,
    filter: DashboardFilter,
) -> Result<Vec<UsageBucket>, AppError> {
    let query = format!(
        r#"SELECT date_trunc('{granularity}', r.request_time) as bucket,
                  r.model_alias as model_alias,
                  COALESCE(SUM(r.input_tokens), 0) as input_tokens,
                  COALESCE(SUM(r.cached_input_tokens), 0) as cached_input_tokens,
                  COALESCE(SUM(r.output_tokens), 0) as output_tokens
           FROM requests r
           WHERE {subject_pred} AND {time_pred}
           GROUP BY bucket, r.model_alias
           ORDER BY bucket ASC"#,
        granularity = filter.granularity(),
        subject_pred = subject_predicate(&subject),
        time_pred = filter.time_predicate(),
    );

    let rows = sqlx::query_as::<_, UsageBucket>(&query)
        .bind(subject_id(&subject))
        .fetch_all(db)
        .await?;

    Ok(rows)
}

/// §4.5/§4.6 — plain count of matching rows, no time filter, consulted
/// by the Graph Cache's freshness check.
pub async fn count_matching(db: &PgPool, subject: Subject) -> Result<i64, AppError> {
    let query = format!(
        "SELECT COUNT(*) FROM requests r WHERE {}",
        subject_predicate(&subject)
    );

    let count: i64 = sqlx::query_scalar(&query)
        .bind(subject_id(&subject))
        .fetch_one(db)
        .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_mapping_matches_spec_table() {
        assert_eq!(DashboardFilter::Last24Hours.granularity(), "hour");
        assert_eq!(DashboardFilter::Last7Days.granularity(), "day");
        assert_eq!(DashboardFilter::ThisMonth.granularity(), "day");
        assert_eq!(DashboardFilter::ThisYear.granularity(), "month");
    }
}
