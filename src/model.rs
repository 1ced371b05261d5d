use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Addressable data held by the store, both remotely and locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Tickets,
    Students,
    TeacherPassword,
}

impl Collection {
    /// Path on the remote store.
    pub fn path(self) -> &'static str {
        match self {
            Self::Tickets => "tickets",
            Self::Students => "students",
            Self::TeacherPassword => "settings/teacherPassword",
        }
    }

    /// Key in local persistence.
    pub fn local_key(self) -> &'static str {
        match self {
            Self::Tickets => "tickets",
            Self::Students => "students",
            Self::TeacherPassword => "teacherPassword",
        }
    }

    pub fn record_path(self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.local_key())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Japanese,
    Math,
    English,
    Science,
    Social,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    #[default]
    Question,
    Grading,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Submitted,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageSlot {
    Question,
    Answer,
    MyAnswer,
}

impl ImageSlot {
    pub fn field(self) -> &'static str {
        match self {
            Self::Question => "questionImages",
            Self::Answer => "answerImages",
            Self::MyAnswer => "myAnswerImages",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "question" | "questionImages" => Some(Self::Question),
            "answer" | "answerImages" => Some(Self::Answer),
            "myAnswer" | "myAnswerImages" => Some(Self::MyAnswer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub initials: String,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(default)]
    pub checked_materials: Vec<String>,
    #[serde(default)]
    pub question_reason: String,
    #[serde(default)]
    pub question_images: Vec<String>,
    #[serde(default)]
    pub answer_images: Vec<String>,
    #[serde(default)]
    pub my_answer_images: Vec<String>,
    #[serde(default)]
    pub teacher_memo: String,
    // Older records answered with separate fields; kept as read so they survive rewrites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teacher_images: Vec<String>,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<i64>,
    #[serde(default)]
    pub completed_by_student: bool,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Submitted
    }

    pub fn images(&self, slot: ImageSlot) -> &Vec<String> {
        match slot {
            ImageSlot::Question => &self.question_images,
            ImageSlot::Answer => &self.answer_images,
            ImageSlot::MyAnswer => &self.my_answer_images,
        }
    }

    /// Teacher response text, falling back to the answer/hint pair of older records.
    pub fn effective_memo(&self) -> String {
        if !self.teacher_memo.trim().is_empty() {
            return self.teacher_memo.clone();
        }
        let parts: Vec<&str> = [self.teacher_answer.as_deref(), self.teacher_hint.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        parts.join("\n")
    }

    /// Answer images, falling back to the image list of older records.
    pub fn effective_answer_images(&self) -> &[String] {
        if self.answer_images.is_empty() {
            &self.teacher_images
        } else {
            &self.answer_images
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_name: String,
    pub initials: String,
    pub birthday: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub tickets: Vec<Ticket>,
    pub students: Vec<Student>,
}

/// A record type living in one of the synced collections.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn created_at(&self) -> i64;
    fn slot(collections: &Collections) -> &Vec<Self>;
    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self>;

    /// Runs after the patch has been merged over `previous`.
    fn apply_merge_rules(&mut self, _previous: Option<&Self>, _now: i64) -> Result<()> {
        Ok(())
    }
}

impl Record for Ticket {
    const COLLECTION: Collection = Collection::Tickets;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.tickets
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.tickets
    }

    fn apply_merge_rules(&mut self, previous: Option<&Self>, now: i64) -> Result<()> {
        if let Some(prev) = previous {
            if prev.status == TicketStatus::Done {
                if self.status != TicketStatus::Done {
                    return Err(Error::InvalidTransition {
                        id: self.id.clone(),
                    });
                }
                // doneAt is written once.
                if prev.done_at.is_some() {
                    self.done_at = prev.done_at;
                }
            }
        }
        match self.status {
            TicketStatus::Done => {
                if self.done_at.is_none() {
                    self.done_at = Some(now);
                }
            }
            TicketStatus::Submitted => {
                self.done_at = None;
                self.completed_by_student = false;
            }
        }

        let mut seen = std::collections::HashSet::new();
        self.checked_materials
            .retain(|m| !m.trim().is_empty() && seen.insert(m.clone()));
        Ok(())
    }
}

impl Record for Student {
    const COLLECTION: Collection = Collection::Students;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.students
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.students
    }

    fn apply_merge_rules(&mut self, _previous: Option<&Self>, _now: i64) -> Result<()> {
        self.class_name = self.class_name.trim().to_string();
        self.initials = crate::rules::normalize_initials(&self.initials);
        self.birthday = self.birthday.trim().to_string();
        Ok(())
    }
}
