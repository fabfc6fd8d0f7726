//! Reset day: move the live sign-out records into the per-day archive and
//! clear them.
//!
//! The database procedure `reset_day_archive()` does the whole job in one
//! transaction and is tried first. When it is missing or fails, the records are
//! archived from here: read, write the archive row, and only then delete the
//! records that were written. A failed delete leaves the archive in place and
//! is reported as a warning. A failed write deletes nothing.
//!
//! The procedure only archives records signed out today; the fallback archives
//! every live record so nothing is dropped on a day the procedure is missing.

use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, TypedHeader};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{archived_count, merge_archive, ArchivedRecord, LiveRecord};
use crate::roster::attach_students;
use crate::store::{KioskStore, StoreError};
use crate::{proceeds, AppState, Payload};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// The schema is incomplete. Never retried.
    #[error("{0}")]
    MissingTable(String),

    #[error("{0}")]
    Failed(String),
}

impl From<StoreError> for ArchiveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingRelation(cause) => ArchiveError::MissingTable(cause),
            other => ArchiveError::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivePath {
    Procedure,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub archived: usize,
    #[serde(skip)]
    pub path: ArchivePath,
    /// False when the archive was written but the live records could not be removed.
    #[serde(skip)]
    pub live_cleared: bool,
}

/// Archives and clears the live records for `today`.
///
/// Not safe to run twice at once: two overlapping fallback runs can both read
/// the same records before either deletes them.
pub async fn reset_day(
    store: &dyn KioskStore,
    today: NaiveDate,
) -> Result<ResetSummary, ArchiveError> {
    match archive_with_procedure(store, today).await {
        Ok(archived) => {
            log::info!(
                "reset_day_archive() archived {} record(s) for {}",
                archived,
                today
            );
            return Ok(ResetSummary {
                archived,
                path: ArchivePath::Procedure,
                live_cleared: true,
            });
        }
        Err(err) => log::warn!(
            "reset_day_archive() unavailable ({}), archiving from the application",
            err
        ),
    }
    archive_with_fallback(store, today).await
}

/// Returns the number of records this run moved, not the size of the day's row.
async fn archive_with_procedure(
    store: &dyn KioskStore,
    today: NaiveDate,
) -> Result<usize, StoreError> {
    let moved = store.run_reset_procedure(today).await?;
    if moved > 0 {
        match store.archive_for_day(today).await {
            Ok(Some(archive)) => log::debug!(
                "archive for {} now holds {} record(s)",
                today,
                archived_count(&archive.data)
            ),
            Ok(None) => log::warn!(
                "reset_day_archive() moved {} record(s) but no archive row exists for {}",
                moved,
                today
            ),
            Err(err) => log::warn!("could not read back the archive for {}: {}", today, err),
        }
    }
    Ok(moved)
}

async fn archive_with_fallback(
    store: &dyn KioskStore,
    today: NaiveDate,
) -> Result<ResetSummary, ArchiveError> {
    let live = load_live_records(store).await?;
    if live.is_empty() {
        log::info!("no live sign-out records to archive for {}", today);
        return Ok(ResetSummary {
            archived: 0,
            path: ArchivePath::Fallback,
            live_cleared: true,
        });
    }

    let records: Vec<ArchivedRecord> = live.iter().map(ArchivedRecord::from).collect();
    let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
    let existing = store.archive_for_day(today).await?.map(|a| a.data);
    let payload = merge_archive(today, existing.as_ref(), &records)
        .map_err(|e| ArchiveError::Failed(format!("could not build archive payload: {}", e)))?;

    write_archive(store, today, &payload, &records).await?;

    let live_cleared = match store.delete_live_records(&ids).await {
        Ok(deleted) => {
            if deleted < ids.len() as u64 {
                log::warn!(
                    "archived {} record(s) for {} but only {} were still live",
                    ids.len(),
                    today,
                    deleted
                );
            }
            true
        }
        Err(err) => {
            log::warn!(
                "archived {} record(s) for {} but could not clear them from sign_out_records: {}",
                ids.len(),
                today,
                err
            );
            false
        }
    };

    Ok(ResetSummary {
        archived: records.len(),
        path: ArchivePath::Fallback,
        live_cleared,
    })
}

async fn load_live_records(store: &dyn KioskStore) -> Result<Vec<LiveRecord>, ArchiveError> {
    match store.live_records_joined().await {
        Ok(records) => Ok(records),
        Err(StoreError::MissingRelation(cause)) => Err(ArchiveError::MissingTable(cause)),
        Err(err) => {
            log::warn!(
                "joined read of live records failed ({}), resolving students separately",
                err
            );
            let records = store.live_records().await?;
            Ok(attach_students(store, records).await?)
        }
    }
}

async fn write_archive(
    store: &dyn KioskStore,
    day: NaiveDate,
    payload: &Value,
    records: &[ArchivedRecord],
) -> Result<(), ArchiveError> {
    let err = match store.upsert_archive(day, payload).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    let err = match err {
        StoreError::NoConflictTarget(cause) => {
            log::warn!(
                "archive upsert unsupported ({}), replacing the row for {}",
                cause,
                day
            );
            match store.replace_archive(day, payload).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            }
        }
        other => other,
    };

    match err {
        StoreError::NotNullViolation(cause) => {
            log::warn!(
                "archive table has legacy per-record columns ({}), filling them from the earliest record",
                cause
            );
            let representative = records
                .iter()
                .min_by_key(|r| r.signed_out_at)
                .ok_or_else(|| {
                    ArchiveError::Failed("no record to fill legacy columns".to_string())
                })?;
            store
                .replace_archive_legacy(day, payload, representative)
                .await
                .map_err(ArchiveError::from)
        }
        other => Err(ArchiveError::from(other)),
    }
}

/// `POST /api/reset-day`. Clients should keep the control disabled while a
/// request is pending; concurrent resets are not serialised here.
pub async fn reset_day_handler(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<ResetSummary> {
    state.gate.require(bearer).await?;
    let today = Local::now().date_naive();
    let summary = reset_day(state.store.as_ref(), today).await.map_err(|err| {
        log::error!("reset day failed: {}", err);
        err
    })?;
    proceeds(summary)
}
