use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{KioskStore, StoreError, StoreResult};
use crate::models::{
    merge_archive, ArchiveDay, ArchiveDaySummary, ArchivedRecord, Class, LiveRecord, NewSignOut,
    SignOutRecord, Student, StudentSnapshot,
};

/// Which archive table layout the store pretends to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveSchema {
    /// `day` is unique, `data` is the only payload column.
    #[default]
    Current,
    /// No uniqueness on `day`, so `ON CONFLICT` has nothing to target.
    NoUniqueDay,
    /// The first layout: per-record columns are `NOT NULL`.
    LegacyColumns,
    /// The first layout before `day` was made unique.
    LegacyNoUniqueDay,
}

#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub tables_missing: bool,
    pub procedure_missing: bool,
    pub join_unavailable: bool,
    pub archive_writes_fail: bool,
    pub live_delete_fails: bool,
    pub schema: ArchiveSchema,
}

#[derive(Debug, Clone)]
pub struct StoredArchive {
    pub day: NaiveDate,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    /// Signer copied into the legacy per-record columns, if that path wrote the row.
    pub legacy_signer_name: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    classes: HashMap<Uuid, Class>,
    students: HashMap<Uuid, Student>,
    records: Vec<SignOutRecord>,
    archives: Vec<StoredArchive>,
}

impl MemoryState {
    fn snapshot(&self, student_id: Uuid) -> Option<StudentSnapshot> {
        self.students.get(&student_id).map(|s| StudentSnapshot {
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            class_name: s
                .class_id
                .and_then(|id| self.classes.get(&id))
                .map(|c| c.name.clone()),
        })
    }

    fn live_sorted(&self) -> Vec<SignOutRecord> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.signed_out_at);
        records
    }

    fn write_archive(&mut self, day: NaiveDate, data: &Value, legacy_signer_name: Option<String>) {
        match self.archives.iter_mut().find(|a| a.day == day) {
            Some(existing) => {
                existing.data = data.clone();
                existing.legacy_signer_name = legacy_signer_name;
            }
            None => self.archives.push(StoredArchive {
                day,
                data: data.clone(),
                created_at: Utc::now(),
                legacy_signer_name,
            }),
        }
    }
}

/// In-process store used for demo mode and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    faults: Faults,
}

impl MemoryStore {
    pub fn with_faults(faults: Faults) -> Self {
        Self {
            state: Mutex::default(),
            faults,
        }
    }

    pub async fn add_class(&self, name: &str) -> Class {
        let class = Class {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.state
            .lock()
            .await
            .classes
            .insert(class.id, class.clone());
        class
    }

    pub async fn add_student(&self, first_name: &str, last_name: &str, class_id: Uuid) -> Student {
        let student = Student {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            class_id: Some(class_id),
        };
        self.state
            .lock()
            .await
            .students
            .insert(student.id, student.clone());
        student
    }

    /// Drops the student but leaves their sign-out records in place.
    pub async fn remove_student(&self, student_id: Uuid) {
        self.state.lock().await.students.remove(&student_id);
    }

    /// Inserts a live record as-is, bypassing the open-record check.
    pub async fn insert_record(&self, record: SignOutRecord) {
        self.state.lock().await.records.push(record);
    }

    /// Stores a payload in whatever shape it is given.
    pub async fn insert_raw_archive(&self, day: NaiveDate, data: Value) {
        self.state.lock().await.write_archive(day, &data, None);
    }

    pub async fn live_count(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn archive_rows(&self) -> Vec<StoredArchive> {
        self.state.lock().await.archives.clone()
    }

    fn check_tables(&self) -> StoreResult<()> {
        if self.faults.tables_missing {
            return Err(StoreError::MissingRelation(
                "relation \"sign_out_archives\" does not exist".to_string(),
            ));
        }
        Ok(())
    }

    fn check_archive_write(&self) -> StoreResult<()> {
        self.check_tables()?;
        if self.faults.archive_writes_fail {
            return Err(StoreError::Other(
                "could not extend file for sign_out_archives".to_string(),
            ));
        }
        Ok(())
    }
}

fn legacy_not_null() -> StoreError {
    StoreError::NotNullViolation(
        "null value in column \"signer_name\" of relation \"sign_out_archives\"".to_string(),
    )
}

#[async_trait]
impl KioskStore for MemoryStore {
    async fn run_reset_procedure(&self, day: NaiveDate) -> StoreResult<usize> {
        self.check_tables()?;
        if self.faults.procedure_missing {
            return Err(StoreError::MissingRelation(
                "function reset_day_archive() does not exist".to_string(),
            ));
        }
        self.check_archive_write()?;

        let mut state = self.state.lock().await;
        let todays: Vec<ArchivedRecord> = state
            .live_sorted()
            .into_iter()
            .filter(|r| r.signed_out_at.with_timezone(&Local).date_naive() == day)
            .map(|record| {
                let student = state.snapshot(record.student_id);
                ArchivedRecord::from(&LiveRecord { record, student })
            })
            .collect();
        if todays.is_empty() {
            return Ok(0);
        }

        let existing = state
            .archives
            .iter()
            .find(|a| a.day == day)
            .map(|a| a.data.clone());
        let data = merge_archive(day, existing.as_ref(), &todays)
            .map_err(|e| StoreError::Other(e.to_string()))?;
        state.write_archive(day, &data, None);

        let archived: HashSet<Uuid> = todays.iter().map(|r| r.id).collect();
        state.records.retain(|r| !archived.contains(&r.id));
        Ok(todays.len())
    }

    async fn archive_for_day(&self, day: NaiveDate) -> StoreResult<Option<ArchiveDay>> {
        self.check_tables()?;
        let state = self.state.lock().await;
        Ok(state
            .archives
            .iter()
            .rev()
            .find(|a| a.day == day)
            .map(|a| ArchiveDay {
                day: a.day,
                data: a.data.clone(),
                created_at: a.created_at,
            }))
    }

    async fn list_archive_days(&self) -> StoreResult<Vec<ArchiveDaySummary>> {
        self.check_tables()?;
        let state = self.state.lock().await;
        let mut days: Vec<ArchiveDaySummary> = state
            .archives
            .iter()
            .map(|a| ArchiveDaySummary {
                day: a.day,
                created_at: a.created_at,
            })
            .collect();
        days.sort_by(|a, b| b.day.cmp(&a.day));
        Ok(days)
    }

    async fn live_records_joined(&self) -> StoreResult<Vec<LiveRecord>> {
        self.check_tables()?;
        if self.faults.join_unavailable {
            return Err(StoreError::Other(
                "could not find a relationship between 'sign_out_records' and 'students'"
                    .to_string(),
            ));
        }
        let state = self.state.lock().await;
        Ok(state
            .live_sorted()
            .into_iter()
            .map(|record| {
                let student = state.snapshot(record.student_id);
                LiveRecord { record, student }
            })
            .collect())
    }

    async fn live_records(&self) -> StoreResult<Vec<SignOutRecord>> {
        self.check_tables()?;
        Ok(self.state.lock().await.live_sorted())
    }

    async fn records_signed_out_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<SignOutRecord>> {
        self.check_tables()?;
        let mut records: Vec<SignOutRecord> = self
            .state
            .lock()
            .await
            .live_sorted()
            .into_iter()
            .filter(|r| r.signed_out_at >= start && r.signed_out_at < end)
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn students_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Student>> {
        self.check_tables()?;
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.students.get(id).cloned())
            .collect())
    }

    async fn classes_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Class>> {
        self.check_tables()?;
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.classes.get(id).cloned())
            .collect())
    }

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        self.check_tables()?;
        let state = self.state.lock().await;
        let mut classes: Vec<Class> = state.classes.values().cloned().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    async fn available_students(&self, class_id: Uuid) -> StoreResult<Vec<Student>> {
        self.check_tables()?;
        let state = self.state.lock().await;
        let out: HashSet<Uuid> = state
            .records
            .iter()
            .filter(|r| r.signed_back_in_at.is_none())
            .map(|r| r.student_id)
            .collect();
        let mut students: Vec<Student> = state
            .students
            .values()
            .filter(|s| s.class_id == Some(class_id) && !out.contains(&s.id))
            .cloned()
            .collect();
        students.sort_by(|a, b| a.first_name.cmp(&b.first_name));
        Ok(students)
    }

    async fn upsert_archive(&self, day: NaiveDate, data: &Value) -> StoreResult<()> {
        self.check_archive_write()?;
        match self.faults.schema {
            ArchiveSchema::Current => {
                self.state.lock().await.write_archive(day, data, None);
                Ok(())
            }
            ArchiveSchema::NoUniqueDay | ArchiveSchema::LegacyNoUniqueDay => {
                Err(StoreError::NoConflictTarget(
                    "there is no unique or exclusion constraint matching the ON CONFLICT \
                     specification"
                        .to_string(),
                ))
            }
            ArchiveSchema::LegacyColumns => Err(legacy_not_null()),
        }
    }

    async fn replace_archive(&self, day: NaiveDate, data: &Value) -> StoreResult<()> {
        self.check_archive_write()?;
        if matches!(
            self.faults.schema,
            ArchiveSchema::LegacyColumns | ArchiveSchema::LegacyNoUniqueDay
        ) {
            return Err(legacy_not_null());
        }
        let mut state = self.state.lock().await;
        state.archives.retain(|a| a.day != day);
        state.write_archive(day, data, None);
        Ok(())
    }

    async fn replace_archive_legacy(
        &self,
        day: NaiveDate,
        data: &Value,
        representative: &ArchivedRecord,
    ) -> StoreResult<()> {
        self.check_archive_write()?;
        let mut state = self.state.lock().await;
        state.archives.retain(|a| a.day != day);
        state.write_archive(day, data, Some(representative.signer_name.clone()));
        Ok(())
    }

    async fn delete_live_records(&self, ids: &[Uuid]) -> StoreResult<u64> {
        self.check_tables()?;
        if self.faults.live_delete_fails {
            return Err(StoreError::PermissionDenied(
                "permission denied for table sign_out_records".to_string(),
            ));
        }
        let doomed: HashSet<&Uuid> = ids.iter().collect();
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|r| !doomed.contains(&r.id));
        Ok((before - state.records.len()) as u64)
    }

    async fn create_sign_out(&self, new: NewSignOut) -> StoreResult<SignOutRecord> {
        self.check_tables()?;
        let mut state = self.state.lock().await;
        if state
            .records
            .iter()
            .any(|r| r.student_id == new.student_id && r.signed_back_in_at.is_none())
        {
            return Err(StoreError::UniqueViolation(format!(
                "student {} already has an open sign-out record",
                new.student_id
            )));
        }
        let record = SignOutRecord {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            signer_name: new.signer_name,
            signature_data: new.signature_data,
            signature_url: new.signature_url,
            signed_out_at: Utc::now(),
            signed_back_in_at: None,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn sign_back_in(&self, record_id: Uuid) -> StoreResult<Option<SignOutRecord>> {
        self.check_tables()?;
        let mut state = self.state.lock().await;
        Ok(state
            .records
            .iter_mut()
            .find(|r| r.id == record_id && r.signed_back_in_at.is_none())
            .map(|r| {
                r.signed_back_in_at = Some(Utc::now());
                r.clone()
            }))
    }
}
