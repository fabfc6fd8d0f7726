use axum::extract::Path;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, TypedHeader};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::err::MIGRATION_HINT;
use crate::models::{ArchiveDaySummary, ArchivePayload};
use crate::store::StoreError;
use crate::{breaks, proceeds, AppState, Error, Payload};

pub async fn list_days(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<ArchiveDays> {
    state.gate.require(bearer).await?;
    match state.store.list_archive_days().await {
        Ok(days) => proceeds(ArchiveDays { days, note: None }),
        Err(StoreError::MissingRelation(cause)) => {
            log::warn!("archive history unavailable: {}", cause);
            proceeds(ArchiveDays {
                days: Vec::new(),
                note: Some(format!("Archive table missing. {}", MIGRATION_HINT)),
            })
        }
        Err(err) => breaks(err.into()),
    }
}

pub async fn archive_day(
    Path(day): Path<String>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<ArchiveDayView> {
    state.gate.require(bearer).await?;
    let day = match NaiveDate::parse_from_str(&day, "%Y-%m-%d") {
        Ok(day) => day,
        Err(_) => {
            return breaks(Error::invalid(format!(
                "`{}` is not a calendar day (expected YYYY-MM-DD)",
                day
            )))
        }
    };

    let archive = match state.store.archive_for_day(day).await? {
        Some(archive) => archive,
        None => {
            return breaks(Error::NotFound {
                message: format!("No archive for {}", day),
            })
        }
    };
    let data = ArchivePayload::from_stored(day, &archive.data).map_err(|err| {
        Error::InternalError {
            source: "ArchiveFormat",
            message: format!("archive for {} is malformed: {}", day, err),
        }
    })?;
    proceeds(ArchiveDayView {
        archive: NormalizedArchive {
            day: archive.day,
            created_at: archive.created_at,
            data,
        },
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveDays {
    pub days: Vec<ArchiveDaySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveDayView {
    pub archive: NormalizedArchive,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizedArchive {
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub data: ArchivePayload,
}
