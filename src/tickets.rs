//! Ticket operations as the UI performs them. Every check runs before the
//! write path, so a rejected operation leaves the store untouched.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::model::{Collection, ImageSlot, Purpose, Subject, Ticket, TicketStatus};
use crate::rules;
use crate::session::{Actor, Sessions, StudentSession};
use crate::sync::SyncStore;

/// The student-editable part of a ticket.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TicketDraft {
    pub subject: Subject,
    pub purpose: Purpose,
    pub checked_materials: Vec<String>,
    pub question_reason: String,
    pub question_images: Vec<String>,
    pub my_answer_images: Vec<String>,
}

impl TicketDraft {
    fn validate(&self) -> Result<()> {
        rules::validate_ticket(self.purpose, &self.checked_materials, &self.question_reason)?;
        rules::validate_images(ImageSlot::Question.field(), &self.question_images)?;
        rules::validate_images(ImageSlot::MyAnswer.field(), &self.my_answer_images)
    }

    fn to_patch(&self) -> Map<String, Value> {
        let mut patch = Map::new();
        patch.insert("subject".into(), json!(self.subject));
        patch.insert("purpose".into(), json!(self.purpose));
        patch.insert("checkedMaterials".into(), json!(self.checked_materials));
        patch.insert("questionReason".into(), json!(self.question_reason.trim()));
        patch.insert("questionImages".into(), json!(self.question_images));
        patch.insert("myAnswerImages".into(), json!(self.my_answer_images));
        patch
    }
}

fn find<'a>(store: &'a SyncStore, id: &str) -> Result<&'a Ticket> {
    store
        .ticket(id)
        .ok_or_else(|| Error::not_found(Collection::Tickets, id))
}

fn ensure_owner(ticket: &Ticket, student: &StudentSession) -> Result<()> {
    if ticket.student_id != student.id {
        return Err(Error::Forbidden("ticket belongs to another student".into()));
    }
    Ok(())
}

fn ensure_open(ticket: &Ticket) -> Result<()> {
    if !ticket.is_open() {
        return Err(Error::InvalidTransition {
            id: ticket.id.clone(),
        });
    }
    Ok(())
}

pub fn submit_ticket(
    store: &mut SyncStore,
    sessions: &Sessions,
    draft: &TicketDraft,
    limit: usize,
) -> Result<Ticket> {
    let student = sessions.require_student()?;
    draft.validate()?;
    rules::check_open_limit(store.tickets(), &student.id, None, limit)?;

    let mut patch = draft.to_patch();
    patch.insert("studentId".into(), json!(student.id));
    patch.insert("className".into(), json!(student.class_name));
    patch.insert("initials".into(), json!(student.initials));
    patch.insert("status".into(), json!(TicketStatus::Submitted));
    patch.insert("teacherMemo".into(), json!(""));
    patch.insert("answerImages".into(), json!([]));
    patch.insert("completedByStudent".into(), json!(false));
    let ticket = store.upsert_ticket(Value::Object(patch))?;
    log::info!("Ticket {} submitted by {}", ticket.id, student.id);
    Ok(ticket)
}

/// Rewrites the draft fields of a student's own ticket while it is open.
pub fn edit_ticket(
    store: &mut SyncStore,
    sessions: &Sessions,
    id: &str,
    draft: &TicketDraft,
    limit: usize,
) -> Result<Ticket> {
    let student = sessions.require_student()?;
    let ticket = find(store, id)?;
    ensure_owner(ticket, student)?;
    ensure_open(ticket)?;
    draft.validate()?;
    rules::check_open_limit(store.tickets(), &student.id, Some(id), limit)?;

    let mut patch = draft.to_patch();
    patch.insert("id".into(), json!(id));
    store.upsert_ticket(Value::Object(patch))
}

pub fn answer_ticket(
    store: &mut SyncStore,
    sessions: &Sessions,
    id: &str,
    memo: &str,
    answer_images: Option<Vec<String>>,
) -> Result<Ticket> {
    sessions.require_teacher()?;
    find(store, id)?;
    let mut patch = Map::new();
    patch.insert("id".into(), json!(id));
    patch.insert("teacherMemo".into(), json!(memo));
    if let Some(images) = answer_images {
        rules::validate_images(ImageSlot::Answer.field(), &images)?;
        patch.insert(ImageSlot::Answer.field().into(), json!(images));
    }
    store.upsert_ticket(Value::Object(patch))
}

/// Closes a ticket. Students may close only their own.
pub fn complete_ticket(store: &mut SyncStore, sessions: &Sessions, id: &str) -> Result<Ticket> {
    let actor = sessions.actor()?;
    let ticket = find(store, id)?;
    if let Actor::Student(student) = actor {
        ensure_owner(ticket, student)?;
    }
    ensure_open(ticket)?;

    let by_student = matches!(actor, Actor::Student(_));
    let ticket = store.upsert_ticket(json!({
        "id": id,
        "status": TicketStatus::Done,
        "completedByStudent": by_student,
    }))?;
    log::info!(
        "Ticket {id} completed by {}",
        if by_student { "student" } else { "teacher" }
    );
    Ok(ticket)
}

/// Students edit question and own-answer images of their open tickets;
/// teachers edit answer images.
fn image_target<'a>(
    store: &'a SyncStore,
    sessions: &Sessions,
    id: &str,
    slot: ImageSlot,
) -> Result<&'a Ticket> {
    let ticket = find(store, id)?;
    match sessions.actor()? {
        Actor::Teacher => {
            if slot != ImageSlot::Answer {
                return Err(Error::Forbidden(format!(
                    "teachers may only change {}",
                    ImageSlot::Answer.field()
                )));
            }
        }
        Actor::Student(student) => {
            ensure_owner(ticket, student)?;
            ensure_open(ticket)?;
            if slot == ImageSlot::Answer {
                return Err(Error::Forbidden(format!(
                    "students may not change {}",
                    slot.field()
                )));
            }
        }
    }
    Ok(ticket)
}

pub fn add_image(
    store: &mut SyncStore,
    sessions: &Sessions,
    id: &str,
    slot: ImageSlot,
    data: &str,
) -> Result<Ticket> {
    let ticket = image_target(store, sessions, id, slot)?;
    if data.trim().is_empty() {
        return Err(Error::Validation("image data must not be empty".into()));
    }
    let mut images = ticket.images(slot).clone();
    images.push(data.to_string());
    store.upsert_ticket(json!({ "id": id, slot.field(): images }))
}

pub fn remove_image(
    store: &mut SyncStore,
    sessions: &Sessions,
    id: &str,
    slot: ImageSlot,
    index: usize,
) -> Result<Ticket> {
    let ticket = image_target(store, sessions, id, slot)?;
    let mut images = ticket.images(slot).clone();
    if index >= images.len() {
        return Err(Error::Validation(format!(
            "{} has no image at index {index}",
            slot.field()
        )));
    }
    images.remove(index);
    store.upsert_ticket(json!({ "id": id, slot.field(): images }))
}

/// Tickets the current actor may see, newest first.
pub fn visible_tickets(
    store: &SyncStore,
    sessions: &Sessions,
    status: Option<TicketStatus>,
) -> Result<Vec<Ticket>> {
    let actor = sessions.actor()?;
    let mut out: Vec<Ticket> = store
        .tickets()
        .iter()
        .filter(|t| match actor {
            Actor::Teacher => true,
            Actor::Student(s) => t.student_id == s.id,
        })
        .filter(|t| status.map_or(true, |st| t.status == st))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}

pub fn visible_ticket(store: &SyncStore, sessions: &Sessions, id: &str) -> Result<Ticket> {
    let ticket = find(store, id)?;
    if let Actor::Student(student) = sessions.actor()? {
        ensure_owner(ticket, student)?;
    }
    Ok(ticket.clone())
}

/// Bulk admin wipe. Tickets are never deleted any other way.
pub fn wipe_tickets(store: &mut SyncStore, sessions: &Sessions) -> Result<()> {
    sessions.require_teacher()?;
    store.clear::<Ticket>()?;
    log::warn!("All tickets wiped");
    Ok(())
}
