//! PostgreSQL store implementation.
//!
//! The conditional-transaction contract maps onto a compare-and-swap over
//! versioned rows: `UpdateWork` becomes a single conditional `UPDATE` whose
//! `WHERE` clause carries every assertion, all inside one SQL transaction.
//! Zero affected rows means an assertion failed, and the whole transaction
//! rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gantry_core::{
    AttemptEntry, NotifStatus, Notification, ResourceId, TestResult, TestStatus, TriggerConfig,
    Vcs, WorkItem, WorkResult, WorkStatus, WorkerKind, WorkerRecord,
};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::ops::{Op, WorkAssert};
use crate::{Store, StoreError, StoreResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct WorkRow {
    id: Uuid,
    import_path: String,
    revision: String,
    revision_date: DateTime<Utc>,
    subpackages: bool,
    vcs: String,
    status: String,
    rev: i64,
    attempt_log: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl WorkRow {
    fn into_item(self) -> StoreResult<WorkItem> {
        let attempt_log: Vec<AttemptEntry> = serde_json::from_value(self.attempt_log)?;
        Ok(WorkItem {
            id: ResourceId::from_uuid(self.id),
            import_path: self.import_path,
            revision: self.revision,
            revision_date: self.revision_date,
            subpackages: self.subpackages,
            vcs: parse_vcs(&self.vcs)?,
            status: parse_work_status(&self.status)?,
            rev: self.rev,
            attempt_log,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkResultRow {
    id: Uuid,
    work_id: Uuid,
    success: bool,
    revision: String,
    revision_date: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
    error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct TestResultRow {
    id: Uuid,
    work_result_id: Uuid,
    import_path: String,
    revision: String,
    revision_date: Option<DateTime<Utc>>,
    recorded_at: DateTime<Utc>,
    output: String,
    status: String,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    test_id: Uuid,
    config: serde_json::Value,
    status: String,
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    id: Uuid,
    kind: String,
    url: String,
    last_seen: DateTime<Utc>,
}

fn parse_work_status(s: &str) -> StoreResult<WorkStatus> {
    match s {
        "queued" => Ok(WorkStatus::Queued),
        "processing" => Ok(WorkStatus::Processing),
        "completed" => Ok(WorkStatus::Completed),
        other => Err(StoreError::Backend(format!("bad work status: {other}"))),
    }
}

fn parse_test_status(s: &str) -> StoreResult<TestStatus> {
    match s {
        "pass" => Ok(TestStatus::Pass),
        "fail" => Ok(TestStatus::Fail),
        "wontbuild" => Ok(TestStatus::WontBuild),
        "error" => Ok(TestStatus::Error),
        other => Err(StoreError::Backend(format!("bad test status: {other}"))),
    }
}

fn parse_notif_status(s: &str) -> StoreResult<NotifStatus> {
    match s {
        "waiting" => Ok(NotifStatus::Waiting),
        "sent" => Ok(NotifStatus::Sent),
        "failed" => Ok(NotifStatus::Failed),
        other => Err(StoreError::Backend(format!("bad notification status: {other}"))),
    }
}

fn parse_vcs(s: &str) -> StoreResult<Vcs> {
    match s {
        "git" => Ok(Vcs::Git),
        "mercurial" => Ok(Vcs::Mercurial),
        other => Err(StoreError::Backend(format!("bad vcs: {other}"))),
    }
}

fn vcs_str(vcs: Vcs) -> &'static str {
    match vcs {
        Vcs::Git => "git",
        Vcs::Mercurial => "mercurial",
    }
}

/// Map a unique-key violation to an abort; everything else passes through.
fn insert_error(e: sqlx::Error) -> StoreError {
    if e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
    {
        StoreError::Aborted
    } else {
        StoreError::Sqlx(e)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn run(&self, ops: Vec<Op>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for op in ops {
            match op {
                Op::UpdateWork {
                    id,
                    assert:
                        WorkAssert {
                            status,
                            attempt_head,
                            rev,
                        },
                    set_status,
                    push_attempt,
                } => {
                    // The prepended entries, or an empty array when the log
                    // stays as it is.
                    let prefix = match &push_attempt {
                        Some(attempt) => serde_json::to_value(vec![attempt])?,
                        None => serde_json::Value::Array(Vec::new()),
                    };
                    let head = attempt_head.map(|h| h.as_uuid().to_string());
                    let affected = sqlx::query(
                        r#"
                        UPDATE work
                        SET status = $2, rev = rev + 1, attempt_log = $3::jsonb || attempt_log
                        WHERE id = $1
                          AND status = $4
                          AND rev = $5
                          AND ($6::text IS NULL OR attempt_log->0->>'id' = $6)
                        "#,
                    )
                    .bind(id.as_uuid())
                    .bind(set_status.as_str())
                    .bind(prefix)
                    .bind(status.as_str())
                    .bind(rev)
                    .bind(head)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    if affected == 0 {
                        debug!(work = %id, "conditional update matched no row, rolling back");
                        tx.rollback().await?;
                        return Err(StoreError::Aborted);
                    }
                }
                Op::InsertWork(item) => {
                    let attempt_log = serde_json::to_value(&item.attempt_log)?;
                    sqlx::query(
                        r#"
                        INSERT INTO work
                            (id, import_path, revision, revision_date, subpackages,
                             vcs, status, rev, attempt_log, created_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                        "#,
                    )
                    .bind(item.id.as_uuid())
                    .bind(&item.import_path)
                    .bind(&item.revision)
                    .bind(item.revision_date)
                    .bind(item.subpackages)
                    .bind(vcs_str(item.vcs))
                    .bind(item.status.as_str())
                    .bind(item.rev)
                    .bind(attempt_log)
                    .bind(item.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(insert_error)?;
                }
                Op::InsertWorkResult(result) => {
                    sqlx::query(
                        r#"
                        INSERT INTO work_result
                            (id, work_id, success, revision, revision_date, completed_at, error)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        "#,
                    )
                    .bind(result.id.as_uuid())
                    .bind(result.work_id.as_uuid())
                    .bind(result.success)
                    .bind(&result.revision)
                    .bind(result.revision_date)
                    .bind(result.completed_at)
                    .bind(&result.error)
                    .execute(&mut *tx)
                    .await
                    .map_err(insert_error)?;
                }
                Op::InsertTestResult(test) => {
                    sqlx::query(
                        r#"
                        INSERT INTO test_result
                            (id, work_result_id, import_path, revision, revision_date,
                             recorded_at, output, status)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(test.id.as_uuid())
                    .bind(test.work_result_id.as_uuid())
                    .bind(&test.import_path)
                    .bind(&test.revision)
                    .bind(test.revision_date)
                    .bind(test.recorded_at)
                    .bind(&test.output)
                    .bind(test.status.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(insert_error)?;
                }
                Op::InsertNotification(not) => {
                    let config = serde_json::to_value(&not.config)?;
                    sqlx::query(
                        "INSERT INTO notification (id, test_id, config, status) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(not.id.as_uuid())
                    .bind(not.test_id.as_uuid())
                    .bind(config)
                    .bind(not.status.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(insert_error)?;
                }
                Op::SetNotificationStatus { id, status } => {
                    let affected =
                        sqlx::query("UPDATE notification SET status = $2 WHERE id = $1")
                            .bind(id.as_uuid())
                            .bind(status.as_str())
                            .execute(&mut *tx)
                            .await?
                            .rows_affected();
                    if affected == 0 {
                        debug!(notification = %id, "unknown notification, rolling back");
                        tx.rollback().await?;
                        return Err(StoreError::Aborted);
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn work_item(&self, id: ResourceId) -> StoreResult<Option<WorkItem>> {
        let row = sqlx::query_as::<_, WorkRow>("SELECT * FROM work WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkRow::into_item).transpose()
    }

    async fn leasable_work(
        &self,
        now: DateTime<Utc>,
        attempt_timeout: Duration,
    ) -> StoreResult<Vec<WorkItem>> {
        let cutoff = now - attempt_timeout;
        let rows = sqlx::query_as::<_, WorkRow>(
            r#"
            SELECT * FROM work
            WHERE status = 'queued'
               OR (status = 'processing'
                   AND (attempt_log->0->>'created_at')::timestamptz < $1)
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkRow::into_item).collect()
    }

    async fn work_results(&self, work_id: ResourceId) -> StoreResult<Vec<WorkResult>> {
        let rows = sqlx::query_as::<_, WorkResultRow>(
            "SELECT * FROM work_result WHERE work_id = $1 ORDER BY completed_at",
        )
        .bind(work_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| WorkResult {
                id: ResourceId::from_uuid(r.id),
                work_id: ResourceId::from_uuid(r.work_id),
                success: r.success,
                revision: r.revision,
                revision_date: r.revision_date,
                completed_at: r.completed_at,
                error: r.error,
            })
            .collect())
    }

    async fn test_results(&self, work_result_id: ResourceId) -> StoreResult<Vec<TestResult>> {
        let rows = sqlx::query_as::<_, TestResultRow>(
            "SELECT * FROM test_result WHERE work_result_id = $1 ORDER BY recorded_at",
        )
        .bind(work_result_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(TestResult {
                    id: ResourceId::from_uuid(r.id),
                    work_result_id: ResourceId::from_uuid(r.work_result_id),
                    import_path: r.import_path,
                    revision: r.revision,
                    revision_date: r.revision_date,
                    recorded_at: r.recorded_at,
                    output: r.output,
                    status: parse_test_status(&r.status)?,
                })
            })
            .collect()
    }

    async fn waiting_notifications(&self) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notification WHERE status = 'waiting'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                let config: TriggerConfig = serde_json::from_value(r.config)?;
                Ok(Notification {
                    id: ResourceId::from_uuid(r.id),
                    test_id: ResourceId::from_uuid(r.test_id),
                    config,
                    status: parse_notif_status(&r.status)?,
                })
            })
            .collect()
    }

    async fn upsert_worker(&self, worker: WorkerRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO worker (id, kind, url, last_seen)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET kind = EXCLUDED.kind, url = EXCLUDED.url, last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(worker.id.as_uuid())
        .bind(worker.kind.as_str())
        .bind(&worker.url)
        .bind(worker.last_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_worker(&self, id: ResourceId) -> StoreResult<()> {
        sqlx::query("DELETE FROM worker WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping_worker(&self, id: ResourceId, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE worker SET last_seen = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn workers(&self, kind: WorkerKind) -> StoreResult<Vec<WorkerRecord>> {
        let rows =
            sqlx::query_as::<_, WorkerRow>("SELECT * FROM worker WHERE kind = $1 ORDER BY id")
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|r| {
                let kind = match r.kind.as_str() {
                    "builder" => WorkerKind::Builder,
                    "runner" => WorkerKind::Runner,
                    other => {
                        return Err(StoreError::Backend(format!("bad worker kind: {other}")));
                    }
                };
                Ok(WorkerRecord {
                    id: ResourceId::from_uuid(r.id),
                    kind,
                    url: r.url,
                    last_seen: r.last_seen,
                })
            })
            .collect()
    }
}
