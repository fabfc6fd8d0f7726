use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{KioskStore, StoreError, StoreResult};
use crate::models::{
    ArchiveDay, ArchiveDaySummary, ArchivedRecord, Class, LiveRecord, NewSignOut, SignOutRecord,
    Student, StudentSnapshot,
};

const RECORD_COLUMNS: &str = "id, student_id, signer_name, signature_data, signature_url, \
                              signed_out_at, signed_back_in_at";

pub struct PgStore {
    pg: PgPool,
}

impl PgStore {
    pub fn new(pg: PgPool) -> Self {
        Self { pg }
    }
}

#[derive(sqlx::FromRow)]
struct JoinedRecordRow {
    id: Uuid,
    student_id: Uuid,
    signer_name: String,
    signature_data: Option<String>,
    signature_url: Option<String>,
    signed_out_at: DateTime<Utc>,
    signed_back_in_at: Option<DateTime<Utc>>,
    first_name: Option<String>,
    last_name: Option<String>,
    class_name: Option<String>,
}

impl From<JoinedRecordRow> for LiveRecord {
    fn from(row: JoinedRecordRow) -> Self {
        let student = match (row.first_name, row.last_name) {
            (Some(first_name), Some(last_name)) => Some(StudentSnapshot {
                first_name,
                last_name,
                class_name: row.class_name,
            }),
            _ => None,
        };
        LiveRecord {
            record: SignOutRecord {
                id: row.id,
                student_id: row.student_id,
                signer_name: row.signer_name,
                signature_data: row.signature_data,
                signature_url: row.signature_url,
                signed_out_at: row.signed_out_at,
                signed_back_in_at: row.signed_back_in_at,
            },
            student,
        }
    }
}

#[async_trait]
impl KioskStore for PgStore {
    async fn run_reset_procedure(&self, day: NaiveDate) -> StoreResult<usize> {
        let moved = sqlx::query_scalar::<_, i32>("SELECT reset_day_archive($1)")
            .bind(day)
            .fetch_one(&self.pg)
            .await?;
        Ok(moved.max(0) as usize)
    }

    async fn archive_for_day(&self, day: NaiveDate) -> StoreResult<Option<ArchiveDay>> {
        let archive = sqlx::query_as::<_, ArchiveDay>(
            "SELECT day, data, created_at FROM sign_out_archives WHERE day = $1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(day)
        .fetch_optional(&self.pg)
        .await?;
        Ok(archive)
    }

    async fn list_archive_days(&self) -> StoreResult<Vec<ArchiveDaySummary>> {
        let days = sqlx::query_as::<_, ArchiveDaySummary>(
            "SELECT day, created_at FROM sign_out_archives ORDER BY day DESC",
        )
        .fetch_all(&self.pg)
        .await?;
        Ok(days)
    }

    async fn live_records_joined(&self) -> StoreResult<Vec<LiveRecord>> {
        let rows = sqlx::query_as::<_, JoinedRecordRow>(
            "SELECT r.id, r.student_id, r.signer_name, r.signature_data, r.signature_url, \
                    r.signed_out_at, r.signed_back_in_at, \
                    s.first_name, s.last_name, c.name AS class_name \
             FROM sign_out_records r \
             LEFT JOIN students s ON s.id = r.student_id \
             LEFT JOIN classes c ON c.id = s.class_id \
             ORDER BY r.signed_out_at",
        )
        .fetch_all(&self.pg)
        .await?;
        Ok(rows.into_iter().map(LiveRecord::from).collect())
    }

    async fn live_records(&self) -> StoreResult<Vec<SignOutRecord>> {
        let records = sqlx::query_as::<_, SignOutRecord>(&format!(
            "SELECT {} FROM sign_out_records ORDER BY signed_out_at",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pg)
        .await?;
        Ok(records)
    }

    async fn records_signed_out_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<SignOutRecord>> {
        let records = sqlx::query_as::<_, SignOutRecord>(&format!(
            "SELECT {} FROM sign_out_records \
             WHERE signed_out_at >= $1 AND signed_out_at < $2 \
             ORDER BY signed_out_at DESC",
            RECORD_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pg)
        .await?;
        Ok(records)
    }

    async fn students_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT id, first_name, last_name, class_id FROM students WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pg)
        .await?;
        Ok(students)
    }

    async fn classes_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Class>> {
        let classes =
            sqlx::query_as::<_, Class>("SELECT id, name FROM classes WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pg)
                .await?;
        Ok(classes)
    }

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        let classes = sqlx::query_as::<_, Class>("SELECT id, name FROM classes ORDER BY name")
            .fetch_all(&self.pg)
            .await?;
        Ok(classes)
    }

    async fn available_students(&self, class_id: Uuid) -> StoreResult<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT s.id, s.first_name, s.last_name, s.class_id FROM students s \
             WHERE s.class_id = $1 \
               AND NOT EXISTS (SELECT 1 FROM sign_out_records r \
                               WHERE r.student_id = s.id AND r.signed_back_in_at IS NULL) \
             ORDER BY s.first_name",
        )
        .bind(class_id)
        .fetch_all(&self.pg)
        .await?;
        Ok(students)
    }

    async fn upsert_archive(&self, day: NaiveDate, data: &Value) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sign_out_archives (day, data) VALUES ($1, $2) \
             ON CONFLICT (day) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(day)
        .bind(data)
        .execute(&self.pg)
        .await?;
        Ok(())
    }

    async fn replace_archive(&self, day: NaiveDate, data: &Value) -> StoreResult<()> {
        let mut tx = self.pg.begin().await?;
        sqlx::query("DELETE FROM sign_out_archives WHERE day = $1")
            .bind(day)
            .execute(&mut tx)
            .await?;
        sqlx::query("INSERT INTO sign_out_archives (day, data) VALUES ($1, $2)")
            .bind(day)
            .bind(data)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_archive_legacy(
        &self,
        day: NaiveDate,
        data: &Value,
        representative: &ArchivedRecord,
    ) -> StoreResult<()> {
        let mut tx = self.pg.begin().await?;
        sqlx::query("DELETE FROM sign_out_archives WHERE day = $1")
            .bind(day)
            .execute(&mut tx)
            .await?;
        sqlx::query(
            "INSERT INTO sign_out_archives \
             (day, data, record_id, student_id, signer_name, signature_data, \
              signed_out_at, signed_back_in_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(day)
        .bind(data)
        .bind(representative.id)
        .bind(representative.student_id)
        .bind(&representative.signer_name)
        .bind(
            representative
                .signature_data
                .as_ref()
                .or(representative.signature_url.as_ref()),
        )
        .bind(representative.signed_out_at)
        .bind(representative.signed_back_in_at)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_live_records(&self, ids: &[Uuid]) -> StoreResult<u64> {
        let affected = sqlx::query("DELETE FROM sign_out_records WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pg)
            .await?;
        Ok(affected.rows_affected())
    }

    async fn create_sign_out(&self, new: NewSignOut) -> StoreResult<SignOutRecord> {
        let open = sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM sign_out_records \
             WHERE student_id = $1 AND signed_back_in_at IS NULL LIMIT 1",
        )
        .bind(new.student_id)
        .fetch_optional(&self.pg)
        .await?;
        if open.is_some() {
            return Err(StoreError::UniqueViolation(format!(
                "student {} already has an open sign-out record",
                new.student_id
            )));
        }

        // The partial unique index on open records catches a concurrent insert.
        let record = sqlx::query_as::<_, SignOutRecord>(&format!(
            "INSERT INTO sign_out_records \
             (id, student_id, signer_name, signature_data, signature_url, signed_out_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.student_id)
        .bind(&new.signer_name)
        .bind(&new.signature_data)
        .bind(&new.signature_url)
        .bind(Utc::now())
        .fetch_one(&self.pg)
        .await?;
        Ok(record)
    }

    async fn sign_back_in(&self, record_id: Uuid) -> StoreResult<Option<SignOutRecord>> {
        let record = sqlx::query_as::<_, SignOutRecord>(&format!(
            "UPDATE sign_out_records SET signed_back_in_at = $2 \
             WHERE id = $1 AND signed_back_in_at IS NULL RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(record_id)
        .bind(Utc::now())
        .fetch_optional(&self.pg)
        .await?;
        Ok(record)
    }
}
