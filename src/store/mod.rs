//! Storage seam between the HTTP handlers / archival service and the database.
//!
//! `PgStore` talks to Postgres; `MemoryStore` keeps everything in process and
//! can simulate the schema variants and failures older deployments show.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ArchiveDay, ArchiveDaySummary, ArchivedRecord, Class, LiveRecord, NewSignOut, SignOutRecord,
    Student,
};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Table, function or schema is not there; the database needs migrating.
    #[error("{0}")]
    MissingRelation(String),

    /// `ON CONFLICT` has no unique constraint to target.
    #[error("upsert unsupported: {0}")]
    NoConflictTarget(String),

    #[error("not-null violation: {0}")]
    NotNullViolation(String),

    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("database error: {0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Maps a Postgres SQLSTATE to the failure classes the archive fallbacks act on.
pub fn classify(code: Option<&str>, message: &str) -> StoreError {
    let message = message.to_string();
    match code {
        Some("42P01") | Some("42883") | Some("3F000") => StoreError::MissingRelation(message),
        Some("42P10") => StoreError::NoConflictTarget(message),
        Some("23502") => StoreError::NotNullViolation(message),
        Some("23505") => StoreError::UniqueViolation(message),
        Some("42501") => StoreError::PermissionDenied(message),
        Some(code) => StoreError::Other(format!("{} ({})", message, code)),
        None => StoreError::Other(message),
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => classify(db.code().as_deref(), db.message()),
            _ => StoreError::Other(err.to_string()),
        }
    }
}

#[async_trait]
pub trait KioskStore: Send + Sync {
    /// Runs the database-side `reset_day_archive(day)` procedure and returns
    /// how many records it moved.
    async fn run_reset_procedure(&self, day: NaiveDate) -> StoreResult<usize>;

    async fn archive_for_day(&self, day: NaiveDate) -> StoreResult<Option<ArchiveDay>>;

    async fn list_archive_days(&self) -> StoreResult<Vec<ArchiveDaySummary>>;

    /// Every live record joined with its student and class, oldest first.
    async fn live_records_joined(&self) -> StoreResult<Vec<LiveRecord>>;

    /// Every live record without reference data, oldest first.
    async fn live_records(&self) -> StoreResult<Vec<SignOutRecord>>;

    async fn records_signed_out_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<SignOutRecord>>;

    async fn students_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Student>>;

    async fn classes_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Class>>;

    /// Every class, by name.
    async fn list_classes(&self) -> StoreResult<Vec<Class>>;

    /// Students of `class_id` without an open sign-out record, by first name.
    async fn available_students(&self, class_id: Uuid) -> StoreResult<Vec<Student>>;

    /// Inserts or replaces the archive row for `day`.
    async fn upsert_archive(&self, day: NaiveDate, data: &Value) -> StoreResult<()>;

    /// Deletes any archive row for `day` and inserts a fresh one, atomically.
    async fn replace_archive(&self, day: NaiveDate, data: &Value) -> StoreResult<()>;

    /// Like `replace_archive`, also filling the per-record columns the first
    /// archive schema declared `NOT NULL` from `representative`.
    async fn replace_archive_legacy(
        &self,
        day: NaiveDate,
        data: &Value,
        representative: &ArchivedRecord,
    ) -> StoreResult<()>;

    /// Returns how many rows were removed.
    async fn delete_live_records(&self, ids: &[Uuid]) -> StoreResult<u64>;

    /// Fails with `UniqueViolation` when the student already has an open record.
    async fn create_sign_out(&self, new: NewSignOut) -> StoreResult<SignOutRecord>;

    async fn sign_back_in(&self, record_id: Uuid) -> StoreResult<Option<SignOutRecord>>;
}
