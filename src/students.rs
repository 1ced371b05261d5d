use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::{Collection, Student};
use crate::rules;
use crate::session::Sessions;
use crate::sync::SyncStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentForm {
    #[serde(default)]
    pub id: Option<String>,
    pub class_name: String,
    pub initials: String,
    pub birthday: String,
}

/// Registers a student, or edits one when `form.id` is set.
pub fn save_student(
    store: &mut SyncStore,
    sessions: &Sessions,
    form: &StudentForm,
) -> Result<Student> {
    sessions.require_teacher()?;
    rules::validate_student_fields(&form.class_name, &form.initials, &form.birthday)?;

    let class_name = form.class_name.trim();
    let initials = rules::normalize_initials(&form.initials);
    let id = form.id.as_deref().filter(|s| !s.trim().is_empty());
    if let Some(id) = id {
        if store.student(id).is_none() {
            return Err(Error::not_found(Collection::Students, id));
        }
    }
    if rules::duplicate_check(store.students(), class_name, &initials, id).is_some() {
        return Err(Error::DuplicateStudent {
            class_name: class_name.to_string(),
            initials,
        });
    }

    let mut patch = json!({
        "className": class_name,
        "initials": initials,
        "birthday": form.birthday.trim(),
    });
    if let Some(id) = id {
        patch["id"] = json!(id);
    }
    store.upsert_student(patch)
}

/// Tickets keep their copy of the student's identity after deletion.
pub fn delete_student(store: &mut SyncStore, sessions: &Sessions, id: &str) -> Result<()> {
    sessions.require_teacher()?;
    if store.student(id).is_none() {
        return Err(Error::not_found(Collection::Students, id));
    }
    store.delete::<Student>(id)
}

pub fn sorted_students(store: &SyncStore) -> Vec<Student> {
    let mut out = store.students().to_vec();
    out.sort_by(|a, b| {
        a.class_name
            .cmp(&b.class_name)
            .then_with(|| a.initials.cmp(&b.initials))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use crate::sync::event_channel;

    fn teacher_store() -> (SyncStore, Sessions) {
        let (sink, _rx) = event_channel();
        let local = LocalStore::open_in_memory().expect("local store");
        let store = SyncStore::open(local, None, "1234", sink);
        let mut sessions = Sessions::new();
        sessions.login_teacher(&store, "1234").expect("teacher");
        (store, sessions)
    }

    fn form(id: Option<&str>, initials: &str, birthday: &str) -> StudentForm {
        StudentForm {
            id: id.map(str::to_string),
            class_name: "5S".into(),
            initials: initials.into(),
            birthday: birthday.into(),
        }
    }

    #[test]
    fn duplicate_is_checked_against_other_records_only() {
        let (mut store, sessions) = teacher_store();
        let s = save_student(&mut store, &sessions, &form(None, "cd", "0202")).expect("save");
        assert_eq!(s.initials, "CD");

        assert!(matches!(
            save_student(&mut store, &sessions, &form(None, "CD", "0909")),
            Err(Error::DuplicateStudent { .. })
        ));
        let edited = save_student(&mut store, &sessions, &form(Some(&s.id), "cd", "0303"))
            .expect("edit");
        assert_eq!(edited.birthday, "0303");
        assert_eq!(store.students().len(), 1);
    }

    #[test]
    fn invalid_fields_and_unknown_ids_are_rejected() {
        let (mut store, sessions) = teacher_store();
        assert!(matches!(
            save_student(&mut store, &sessions, &form(None, "cd", "22")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            save_student(&mut store, &sessions, &form(Some("nope"), "cd", "0202")),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            delete_student(&mut store, &sessions, "nope"),
            Err(Error::NotFound { .. })
        ));
        assert!(store.students().is_empty());
    }
}
