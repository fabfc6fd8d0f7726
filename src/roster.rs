use std::collections::{BTreeSet, HashMap};

use axum::extract::Path;
use axum::Extension;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Class, LiveRecord, SignOutRecord, Student, StudentSnapshot};
use crate::store::{KioskStore, StoreResult};
use crate::{breaks, proceeds, AppState, Error, Payload};

/// `GET /api/classes`: the first kiosk screen.
pub async fn list_classes(Extension(state): Extension<AppState>) -> Payload<Classes> {
    let classes = state.store.list_classes().await?;
    proceeds(Classes { classes })
}

/// `GET /api/students/:class_id`: students of the class who can still be signed out.
pub async fn class_students(
    Path(class_id): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<Students> {
    let class_id = match Uuid::parse_str(&class_id) {
        Ok(id) => id,
        Err(_) => return breaks(Error::invalid(format!("`{}` is not a class id", class_id))),
    };
    let students = state.store.available_students(class_id).await?;
    proceeds(Students { students })
}

#[derive(Debug, Clone, Serialize)]
pub struct Classes {
    pub classes: Vec<Class>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Students {
    pub students: Vec<Student>,
}

/// Resolves student names and class labels for `records` with two batched
/// lookups. A failed class lookup only drops the class label.
pub async fn attach_students(
    store: &dyn KioskStore,
    records: Vec<SignOutRecord>,
) -> StoreResult<Vec<LiveRecord>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let student_ids: Vec<Uuid> = records
        .iter()
        .map(|r| r.student_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let students = store.students_by_ids(&student_ids).await?;

    let class_ids: Vec<Uuid> = students
        .iter()
        .filter_map(|s| s.class_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let class_names: HashMap<Uuid, String> = if class_ids.is_empty() {
        HashMap::new()
    } else {
        match store.classes_by_ids(&class_ids).await {
            Ok(classes) => classes.into_iter().map(|c| (c.id, c.name)).collect(),
            Err(err) => {
                log::warn!("class lookup failed, continuing without class labels: {}", err);
                HashMap::new()
            }
        }
    };

    let snapshots: HashMap<Uuid, StudentSnapshot> = students
        .into_iter()
        .map(|s| {
            let class_name = s.class_id.and_then(|id| class_names.get(&id).cloned());
            (
                s.id,
                StudentSnapshot {
                    first_name: s.first_name,
                    last_name: s.last_name,
                    class_name,
                },
            )
        })
        .collect();

    Ok(records
        .into_iter()
        .map(|record| {
            let student = snapshots.get(&record.student_id).cloned();
            LiveRecord { record, student }
        })
        .collect())
}
