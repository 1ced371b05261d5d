use crate::error::{Error, Result};
use crate::model::{Purpose, Student, Ticket};

pub const DEFAULT_MAX_OPEN_TICKETS: usize = 3;

pub fn normalize_initials(initials: &str) -> String {
    initials.trim().to_uppercase()
}

fn same_initials(a: &str, b: &str) -> bool {
    normalize_initials(a) == normalize_initials(b)
}

/// Login lookup: exact class and birthday, case-insensitive initials.
/// Returns the first match; duplicates are prevented at registration only.
pub fn find_student<'a>(
    students: &'a [Student],
    class_name: &str,
    initials: &str,
    birthday: &str,
) -> Option<&'a Student> {
    students.iter().find(|s| {
        s.class_name == class_name && s.birthday == birthday && same_initials(&s.initials, initials)
    })
}

/// Another student already holding (class, initials), ignoring `exclude_id`.
pub fn duplicate_check<'a>(
    students: &'a [Student],
    class_name: &str,
    initials: &str,
    exclude_id: Option<&str>,
) -> Option<&'a Student> {
    students.iter().find(|s| {
        Some(s.id.as_str()) != exclude_id
            && s.class_name == class_name
            && same_initials(&s.initials, initials)
    })
}

pub fn count_open_tickets(tickets: &[Ticket], student_id: &str, exclude_id: Option<&str>) -> usize {
    tickets
        .iter()
        .filter(|t| t.student_id == student_id && t.is_open())
        .filter(|t| Some(t.id.as_str()) != exclude_id)
        .count()
}

pub fn check_open_limit(
    tickets: &[Ticket],
    student_id: &str,
    exclude_id: Option<&str>,
    limit: usize,
) -> Result<()> {
    if count_open_tickets(tickets, student_id, exclude_id) >= limit {
        return Err(Error::TicketLimit { limit });
    }
    Ok(())
}

pub fn validate_student_fields(class_name: &str, initials: &str, birthday: &str) -> Result<()> {
    if class_name.trim().is_empty() {
        return Err(Error::Validation("className must not be empty".into()));
    }
    if normalize_initials(initials).is_empty() {
        return Err(Error::Validation("initials must not be empty".into()));
    }
    let birthday = birthday.trim();
    if birthday.len() != 4 || !birthday.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Validation("birthday must be 4 digits (MMDD)".into()));
    }
    Ok(())
}

pub fn validate_images(field: &str, images: &[String]) -> Result<()> {
    if images.iter().any(|img| img.trim().is_empty()) {
        return Err(Error::Validation(format!("{field} contains an empty image")));
    }
    Ok(())
}

/// Field checks for a student's question/grading request before it is written.
pub fn validate_ticket(
    purpose: Purpose,
    checked_materials: &[String],
    question_reason: &str,
) -> Result<()> {
    if purpose == Purpose::Question {
        if checked_materials.iter().all(|m| m.trim().is_empty()) {
            return Err(Error::Validation(
                "select at least one material you checked".into(),
            ));
        }
        if question_reason.trim().is_empty() {
            return Err(Error::Validation("questionReason is required".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TicketStatus;

    fn student(id: &str, class_name: &str, initials: &str, birthday: &str) -> Student {
        Student {
            id: id.into(),
            class_name: class_name.into(),
            initials: initials.into(),
            birthday: birthday.into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn ticket(id: &str, student_id: &str, status: TicketStatus) -> Ticket {
        let mut t: Ticket = serde_json::from_value(serde_json::json!({
            "id": id,
            "studentId": student_id,
        }))
        .expect("ticket");
        t.status = status;
        t
    }

    #[test]
    fn find_student_is_caseless_on_initials_only() {
        let students = vec![student("s1", "4S", "AB", "0101")];
        assert!(find_student(&students, "4S", "ab", "0101").is_some());
        assert!(find_student(&students, "4s", "AB", "0101").is_none());
        assert!(find_student(&students, "4S", "AB", "0102").is_none());
        assert!(find_student(&students, "5S", "AB", "0101").is_none());
    }

    #[test]
    fn duplicate_check_skips_the_edited_record() {
        let students = vec![student("s1", "4S", "AB", "0101")];
        assert!(duplicate_check(&students, "4S", "ab", None).is_some());
        assert!(duplicate_check(&students, "4S", "ab", Some("s2")).is_some());
        assert!(duplicate_check(&students, "4S", "ab", Some("s1")).is_none());
        assert!(duplicate_check(&students, "5S", "AB", None).is_none());
    }

    #[test]
    fn open_count_ignores_done_and_excluded() {
        let tickets = vec![
            ticket("t1", "s1", TicketStatus::Submitted),
            ticket("t2", "s1", TicketStatus::Done),
            ticket("t3", "s1", TicketStatus::Submitted),
            ticket("t4", "s2", TicketStatus::Submitted),
        ];
        assert_eq!(count_open_tickets(&tickets, "s1", None), 2);
        assert_eq!(count_open_tickets(&tickets, "s1", Some("t3")), 1);
        assert!(check_open_limit(&tickets, "s1", None, 3).is_ok());
        assert!(matches!(
            check_open_limit(&tickets, "s1", None, 2),
            Err(Error::TicketLimit { limit: 2 })
        ));
        assert!(check_open_limit(&tickets, "s1", Some("t1"), 2).is_ok());
    }

    #[test]
    fn question_needs_materials_and_reason() {
        assert!(validate_ticket(Purpose::Grading, &[], "").is_ok());
        assert!(validate_ticket(Purpose::Question, &[], "why").is_err());
        assert!(validate_ticket(Purpose::Question, &["book".into()], "  ").is_err());
        assert!(validate_ticket(Purpose::Question, &["book".into()], "stuck on 3b").is_ok());
    }

    #[test]
    fn birthday_must_be_four_digits() {
        assert!(validate_student_fields("4S", "ab", "0101").is_ok());
        assert!(validate_student_fields("4S", "ab", "101").is_err());
        assert!(validate_student_fields("4S", "ab", "01a1").is_err());
        assert!(validate_student_fields("4S", " ", "0101").is_err());
        assert!(validate_student_fields("", "ab", "0101").is_err());
    }
}
