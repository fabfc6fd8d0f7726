use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Class {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub class_id: Option<Uuid>,
}

/// A live sign-out row. `signed_back_in_at == None` means the student is out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignOutRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub signer_name: String,
    pub signature_data: Option<String>,
    pub signature_url: Option<String>,
    pub signed_out_at: DateTime<Utc>,
    pub signed_back_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSignOut {
    pub student_id: Uuid,
    pub signer_name: String,
    pub signature_data: Option<String>,
    pub signature_url: Option<String>,
}

/// Names copied into an archive so it stays legible after the student is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveRecord {
    #[serde(flatten)]
    pub record: SignOutRecord,
    pub student: Option<StudentSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub signer_name: String,
    #[serde(default)]
    pub signature_data: Option<String>,
    #[serde(default)]
    pub signature_url: Option<String>,
    pub signed_out_at: DateTime<Utc>,
    #[serde(default)]
    pub signed_back_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub student: Option<StudentSnapshot>,
}

impl From<&LiveRecord> for ArchivedRecord {
    fn from(live: &LiveRecord) -> Self {
        let record = &live.record;
        Self {
            id: record.id,
            student_id: record.student_id,
            signer_name: record.signer_name.clone(),
            signature_data: record.signature_data.clone(),
            signature_url: record.signature_url.clone(),
            signed_out_at: record.signed_out_at,
            signed_back_in_at: record.signed_back_in_at,
            student: live.student.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArchiveDay {
    pub day: NaiveDate,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArchiveDaySummary {
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// The normalised `{ day, records }` form of an archive payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivePayload {
    pub day: NaiveDate,
    pub records: Vec<ArchivedRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPayload {
    Bare(Vec<ArchivedRecord>),
    Wrapped {
        #[serde(default)]
        day: Option<NaiveDate>,
        #[serde(default)]
        records: Vec<ArchivedRecord>,
    },
}

impl ArchivePayload {
    /// Reads either stored shape; `day` fills in when the payload has none.
    pub fn from_stored(day: NaiveDate, data: &Value) -> Result<Self, serde_json::Error> {
        Ok(match StoredPayload::deserialize(data)? {
            StoredPayload::Bare(records) => Self { day, records },
            StoredPayload::Wrapped {
                day: stored_day,
                records,
            } => Self {
                day: stored_day.unwrap_or(day),
                records,
            },
        })
    }
}

/// Records held by a stored payload, whether it is a bare array or `{records: [...]}`.
pub fn archive_records(data: &Value) -> &[Value] {
    match data {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("records")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

pub fn archived_count(data: &Value) -> usize {
    archive_records(data).len()
}

/// Builds the `{ day, records }` payload for `day`, keeping records already
/// archived that day unless a fresh record carries the same id.
pub fn merge_archive(
    day: NaiveDate,
    existing: Option<&Value>,
    fresh: &[ArchivedRecord],
) -> Result<Value, serde_json::Error> {
    let fresh_ids: HashSet<String> = fresh.iter().map(|r| r.id.to_string()).collect();
    let mut records: Vec<Value> = existing
        .map(archive_records)
        .unwrap_or(&[])
        .iter()
        .filter(|r| {
            r.get("id")
                .and_then(Value::as_str)
                .map_or(true, |id| !fresh_ids.contains(id))
        })
        .cloned()
        .collect();
    for record in fresh {
        records.push(serde_json::to_value(record)?);
    }
    Ok(json!({ "day": day, "records": records }))
}
