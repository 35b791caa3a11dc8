use std::path::Path;

use backlog_protocol::{
    params_fingerprint, BacklogError, BacklogResult, DownstreamJobId, JobId, JobKey, JobRecord,
    JobStatus, ServiceApi,
};
use rusqlite::{params, Connection, Row};
use time::OffsetDateTime;

use super::codec;
use super::{CasOutcome, CreateOutcome, JobRecordStore, NewJobRecord, StatusPatch};

const SELECT_COLUMNS: &str = "service_api, job_id, params, params_fingerprint, status, \
     downstream_job_id, created_at, updated_at, retry_count, last_error";

/// SQLite-backed [`JobRecordStore`]. Every mutation runs inside a transaction
/// so the read-compare-write of a conditional update is atomic.
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    pub fn open(path: impl AsRef<Path>) -> BacklogResult<Self> {
        let conn = Connection::open(path).map_err(persistence)?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    pub fn in_memory() -> BacklogResult<Self> {
        let conn = Connection::open_in_memory().map_err(persistence)?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> BacklogResult<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS backlog_jobs (
                    service_api TEXT NOT NULL,
                    job_id TEXT NOT NULL,
                    params TEXT NOT NULL,
                    params_fingerprint TEXT NOT NULL,
                    status TEXT NOT NULL,
                    downstream_job_id TEXT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT NULL,
                    PRIMARY KEY (service_api, job_id)
                );
                CREATE INDEX IF NOT EXISTS idx_backlog_jobs_status
                    ON backlog_jobs(service_api, status);
                CREATE INDEX IF NOT EXISTS idx_backlog_jobs_queued_order
                    ON backlog_jobs(service_api, status, created_at);
                ",
            )
            .map_err(persistence)
    }

    fn fetch(conn: &Connection, key: &JobKey) -> BacklogResult<Option<JobRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM backlog_jobs WHERE service_api = ?1 AND job_id = ?2"
            ))
            .map_err(persistence)?;

        let mut rows = stmt
            .query_map(params![key.service_api.as_str(), key.id.as_str()], map_row)
            .map_err(persistence)?;

        match rows.next() {
            None => Ok(None),
            Some(row) => {
                let record = row.map_err(persistence)??;
                Ok(Some(record))
            }
        }
    }
}

impl JobRecordStore for SqliteJobStore {
    fn create_if_absent(&mut self, new: NewJobRecord) -> BacklogResult<CreateOutcome> {
        let fingerprint = params_fingerprint(&new.params);
        let tx = self.conn.transaction().map_err(persistence)?;

        if let Some(existing) = Self::fetch(&tx, &new.key)? {
            if existing.params_fingerprint != fingerprint {
                return Err(BacklogError::CreationConflict {
                    service_api: new.key.service_api,
                    id: new.key.id,
                });
            }
            return Ok(CreateOutcome::Existing(existing));
        }

        let now = now_unix();
        tx.execute(
            "
            INSERT INTO backlog_jobs (
                service_api, job_id, params, params_fingerprint, status,
                downstream_job_id, created_at, updated_at, retry_count, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6, 0, NULL)
            ",
            params![
                new.key.service_api.as_str(),
                new.key.id.as_str(),
                codec::params_to_db(&new.params),
                codec::fingerprint_to_db(fingerprint),
                codec::status_to_db(JobStatus::Queued),
                now,
            ],
        )
        .map_err(persistence)?;

        let created = Self::fetch(&tx, &new.key)?.ok_or_else(|| {
            BacklogError::Persistence("inserted job record not readable in transaction".to_owned())
        })?;
        tx.commit().map_err(persistence)?;
        Ok(CreateOutcome::Created(created))
    }

    fn compare_and_swap_status(
        &mut self,
        key: &JobKey,
        expected: JobStatus,
        next: JobStatus,
        patch: StatusPatch,
    ) -> BacklogResult<CasOutcome> {
        let tx = self.conn.transaction().map_err(persistence)?;

        let Some(current) = Self::fetch(&tx, key)? else {
            return Err(BacklogError::JobNotFound {
                service_api: key.service_api.clone(),
                id: key.id.clone(),
            });
        };
        if current.status != expected {
            return Ok(CasOutcome::Mismatch(current));
        }

        let downstream = patch
            .downstream_job_id
            .map(|id| id.as_str().to_owned());
        let bump: i64 = if patch.bump_retry_count { 1 } else { 0 };
        tx.execute(
            "
            UPDATE backlog_jobs
            SET status = ?1,
                updated_at = ?2,
                downstream_job_id = COALESCE(?3, downstream_job_id),
                last_error = COALESCE(?4, last_error),
                retry_count = retry_count + ?5
            WHERE service_api = ?6 AND job_id = ?7 AND status = ?8
            ",
            params![
                codec::status_to_db(next),
                now_unix(),
                downstream,
                patch.last_error,
                bump,
                key.service_api.as_str(),
                key.id.as_str(),
                codec::status_to_db(expected),
            ],
        )
        .map_err(persistence)?;

        let updated = Self::fetch(&tx, key)?.ok_or_else(|| {
            BacklogError::Persistence("updated job record not readable in transaction".to_owned())
        })?;
        tx.commit().map_err(persistence)?;
        Ok(CasOutcome::Updated(updated))
    }

    fn get(&self, key: &JobKey) -> BacklogResult<Option<JobRecord>> {
        Self::fetch(&self.conn, key)
    }

    fn list_queued(&self, service_api: &ServiceApi) -> BacklogResult<Vec<JobRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "
                SELECT {SELECT_COLUMNS} FROM backlog_jobs
                WHERE service_api = ?1 AND status = ?2
                ORDER BY created_at ASC, job_id ASC
                "
            ))
            .map_err(persistence)?;

        let rows = stmt
            .query_map(
                params![
                    service_api.as_str(),
                    codec::status_to_db(JobStatus::Queued)
                ],
                map_row,
            )
            .map_err(persistence)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(persistence)??);
        }
        Ok(records)
    }

    fn count_with_status(
        &self,
        service_api: &ServiceApi,
        status: JobStatus,
    ) -> BacklogResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM backlog_jobs WHERE service_api = ?1 AND status = ?2",
                params![service_api.as_str(), codec::status_to_db(status)],
                |row| row.get(0),
            )
            .map_err(persistence)?;

        usize::try_from(count).map_err(|_| {
            BacklogError::Persistence(format!("job count '{count}' cannot be represented as usize"))
        })
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<BacklogResult<JobRecord>> {
    let service_api: String = row.get(0)?;
    let job_id: String = row.get(1)?;
    let params_raw: String = row.get(2)?;
    let fingerprint_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let downstream: Option<String> = row.get(5)?;
    let created_at: i64 = row.get(6)?;
    let updated_at: i64 = row.get(7)?;
    let retry_count: u32 = row.get(8)?;
    let last_error: Option<String> = row.get(9)?;

    Ok(decode_record(
        service_api,
        job_id,
        params_raw,
        fingerprint_raw,
        status_raw,
        downstream,
        created_at,
        updated_at,
        retry_count,
        last_error,
    ))
}

#[allow(clippy::too_many_arguments)]
fn decode_record(
    service_api: String,
    job_id: String,
    params_raw: String,
    fingerprint_raw: String,
    status_raw: String,
    downstream: Option<String>,
    created_at: i64,
    updated_at: i64,
    retry_count: u32,
    last_error: Option<String>,
) -> BacklogResult<JobRecord> {
    Ok(JobRecord {
        id: JobId::new(job_id),
        service_api: ServiceApi::new(service_api),
        params: codec::params_from_db(&params_raw)?,
        params_fingerprint: codec::fingerprint_from_db(&fingerprint_raw)?,
        status: codec::status_from_db(&status_raw)?,
        downstream_job_id: downstream.map(DownstreamJobId::new),
        created_at,
        updated_at,
        retry_count,
        last_error,
    })
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn persistence(err: impl std::fmt::Display) -> BacklogError {
    BacklogError::Persistence(err.to_string())
}
