//! Per-process login state. One sidecar serves one UI window, so these live
//! exactly as long as that window's session and are never persisted.
//!
//! The teacher flag is the only gate on admin operations and is not bound to
//! the password once set; anyone driving this process after a teacher login
//! has teacher rights.

use serde::{Deserialize, Serialize};

use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::rules;
use crate::sync::SyncStore;

pub const PREFS_KEY: &str = "prefs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSession {
    pub id: String,
    pub class_name: String,
    pub initials: String,
}

/// Last used login fields; outlive sessions to speed up repeat logins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub last_class_name: String,
    pub last_initials: String,
}

pub fn load_preferences(local: &LocalStore) -> Preferences {
    local.load_json(PREFS_KEY).unwrap_or_default()
}

pub fn save_preferences(local: &LocalStore, prefs: &Preferences) -> Result<()> {
    local.save_json(PREFS_KEY, prefs)
}

/// Who is performing an operation open to both roles.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    Student(&'a StudentSession),
    Teacher,
}

#[derive(Debug, Default)]
pub struct Sessions {
    student: Option<StudentSession>,
    teacher: bool,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn student(&self) -> Option<&StudentSession> {
        self.student.as_ref()
    }

    pub fn is_teacher(&self) -> bool {
        self.teacher
    }

    pub fn login_student(
        &mut self,
        store: &SyncStore,
        class_name: &str,
        initials: &str,
        birthday: &str,
    ) -> Result<StudentSession> {
        let Some(student) =
            rules::find_student(store.students(), class_name.trim(), initials, birthday.trim())
        else {
            return Err(Error::LoginFailed);
        };
        let session = StudentSession {
            id: student.id.clone(),
            class_name: student.class_name.clone(),
            initials: student.initials.clone(),
        };
        let prefs = Preferences {
            last_class_name: session.class_name.clone(),
            last_initials: session.initials.clone(),
        };
        if let Err(e) = save_preferences(store.local(), &prefs) {
            log::warn!("Failed to save login preferences: {e}");
        }
        self.student = Some(session.clone());
        Ok(session)
    }

    pub fn logout_student(&mut self) {
        self.student = None;
    }

    pub fn login_teacher(&mut self, store: &SyncStore, password: &str) -> Result<()> {
        if password != store.teacher_password() {
            return Err(Error::LoginFailed);
        }
        self.teacher = true;
        Ok(())
    }

    pub fn logout_teacher(&mut self) {
        self.teacher = false;
    }

    pub fn require_student(&self) -> Result<&StudentSession> {
        self.student.as_ref().ok_or(Error::NotLoggedIn("student"))
    }

    pub fn require_teacher(&self) -> Result<()> {
        if self.teacher {
            Ok(())
        } else {
            Err(Error::NotLoggedIn("teacher"))
        }
    }

    /// Teacher takes precedence when both roles are logged in.
    pub fn actor(&self) -> Result<Actor<'_>> {
        if self.teacher {
            return Ok(Actor::Teacher);
        }
        match &self.student {
            Some(s) => Ok(Actor::Student(s)),
            None => Err(Error::NotLoggedIn("student or teacher")),
        }
    }
}

/// Replaces the shared teacher password; any logged-in teacher may do this.
pub fn change_teacher_password(
    store: &mut SyncStore,
    sessions: &Sessions,
    password: &str,
) -> Result<()> {
    sessions.require_teacher()?;
    let password = password.trim();
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".into()));
    }
    store.set_teacher_password(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::event_channel;
    use serde_json::json;

    fn local_store() -> SyncStore {
        let (sink, _rx) = event_channel();
        let local = LocalStore::open_in_memory().expect("local store");
        SyncStore::open(local, None, "1234", sink)
    }

    #[test]
    fn student_login_records_preferences() {
        let mut store = local_store();
        store
            .upsert_student(json!({"className": "4S", "initials": "ab", "birthday": "0101"}))
            .expect("register");

        let mut sessions = Sessions::new();
        assert!(matches!(
            sessions.login_student(&store, "4S", "AB", "0102"),
            Err(Error::LoginFailed)
        ));
        let s = sessions.login_student(&store, "4S", "Ab", "0101").expect("login");
        assert_eq!(s.initials, "AB");
        assert_eq!(
            load_preferences(store.local()),
            Preferences {
                last_class_name: "4S".into(),
                last_initials: "AB".into(),
            }
        );

        sessions.logout_student();
        assert!(sessions.require_student().is_err());
        // Preferences outlive the session.
        assert_eq!(load_preferences(store.local()).last_initials, "AB");
    }

    #[test]
    fn teacher_login_uses_current_password() {
        let mut store = local_store();
        let mut sessions = Sessions::new();
        assert!(sessions.login_teacher(&store, "nope").is_err());
        sessions.login_teacher(&store, "1234").expect("default password");
        assert!(matches!(sessions.actor(), Ok(Actor::Teacher)));

        change_teacher_password(&mut store, &sessions, "9876").expect("change password");
        sessions.logout_teacher();
        assert!(sessions.login_teacher(&store, "1234").is_err());
        sessions.login_teacher(&store, "9876").expect("new password");
    }
}
