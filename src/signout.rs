use axum::extract::Path;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{LiveRecord, NewSignOut, SignOutRecord};
use crate::roster::attach_students;
use crate::store::StoreError;
use crate::{breaks, proceeds, AppState, Error, Payload};

pub async fn sign_out(
    Extension(state): Extension<AppState>,
    Json(body): Json<SignOutRequest>,
) -> Payload<SignedOut> {
    let signer_name = body.signer_name.trim();
    if signer_name.is_empty() {
        return breaks(Error::invalid("Student ID and signer name are required"));
    }
    if body.signature_data.is_some() && body.signature_url.is_some() {
        return breaks(Error::invalid(
            "Send either `signature_data` or `signature_url`, not both",
        ));
    }

    let new = NewSignOut {
        student_id: body.student_id,
        signer_name: signer_name.to_string(),
        signature_data: body.signature_data,
        signature_url: body.signature_url,
    };
    match state.store.create_sign_out(new).await {
        Ok(record) => {
            log::info!("student {} signed out by {}", record.student_id, record.signer_name);
            proceeds(SignedOut { record })
        }
        Err(StoreError::UniqueViolation(_)) => breaks(Error::AlreadySignedOut {
            message: "Student is already signed out".to_string(),
        }),
        Err(err) => breaks(err.into()),
    }
}

pub async fn sign_back_in(
    Path(record_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<SignedOut> {
    match state.store.sign_back_in(record_id).await? {
        Some(record) => proceeds(SignedOut { record }),
        None => breaks(Error::NotFound {
            message: format!("No open sign-out record with id `{}`", record_id),
        }),
    }
}

/// Records signed out during today's local-day window, newest first.
pub async fn todays_records(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<TodaysRecords> {
    state.gate.require(bearer).await?;
    let (start, end) = local_day_bounds(Local::now().date_naive());
    let records = state.store.records_signed_out_between(start, end).await?;
    let records = attach_students(state.store.as_ref(), records).await?;
    proceeds(TodaysRecords { records })
}

/// UTC instants covering `day` in the server's time zone.
pub fn local_day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_of = |d: NaiveDate| {
        let midnight = d.and_time(NaiveTime::MIN);
        Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    };
    (start_of(day), start_of(day + Duration::days(1)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignOutRequest {
    pub student_id: Uuid,
    pub signer_name: String,
    #[serde(default)]
    pub signature_data: Option<String>,
    #[serde(default)]
    pub signature_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedOut {
    pub record: SignOutRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodaysRecords {
    pub records: Vec<LiveRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_bounds_span_one_local_day() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let (start, end) = local_day_bounds(day);
        assert!(start < end);
        assert_eq!(start.with_timezone(&Local).date_naive(), day);
        assert!(end - start >= Duration::hours(23) && end - start <= Duration::hours(25));
    }
}
