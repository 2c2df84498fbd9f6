//! Deletion with explicit dependency-ordered cleanup. The schema declares
//! foreign keys without ON DELETE CASCADE, so every dependent row has to be
//! removed or repaired here before its owner goes.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::model::Role;
use crate::store;
use crate::sync::{self, ResyncReport};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeletion {
    pub user_id: String,
    pub role: Option<Role>,
    pub messages: usize,
    pub attachments: usize,
    pub grades: usize,
    pub attendance: usize,
    pub homework: usize,
    pub announcements: usize,
    pub teacher_class_links: usize,
    pub parent_links_repaired: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDeletion {
    pub class_id: String,
    pub teacher_links: usize,
    pub subject_links: usize,
    pub homework_links: usize,
    pub announcement_links: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDeletion {
    pub subject_id: String,
    pub resynced_classes: Vec<ResyncReport>,
}

pub fn delete_user(conn: &Connection, user_id: &str) -> CoreResult<UserDeletion> {
    let tx = conn.unchecked_transaction()?;
    let out = delete_user_in(&tx, user_id)?;
    tx.commit()?;
    Ok(out)
}

pub fn delete_user_in(conn: &Connection, user_id: &str) -> CoreResult<UserDeletion> {
    let user = store::require_user(conn, user_id)?;
    let id = user.id.as_str();
    let mut out = UserDeletion {
        user_id: user.id.clone(),
        role: Some(user.role),
        ..UserDeletion::default()
    };

    out.attachments = conn.execute(
        "DELETE FROM message_attachments
         WHERE message_id IN (
           SELECT m.id FROM messages m WHERE m.sender_id = ?1 OR m.receiver_id = ?1
         )",
        [id],
    )?;
    out.messages = conn.execute(
        "DELETE FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
        [id],
    )?;
    log::info!("deleted {} messages for user {}", out.messages, id);

    match user.role {
        Role::Student => {
            out.grades = conn.execute("DELETE FROM grades WHERE student_id = ?", [id])?;
            out.attendance = conn.execute("DELETE FROM attendance WHERE student_id = ?", [id])?;
            out.parent_links_repaired =
                conn.execute("DELETE FROM parent_children WHERE student_id = ?", [id])?;
            log::info!(
                "deleted {} grades, {} attendance records for student {}; repaired {} parent links",
                out.grades,
                out.attendance,
                id,
                out.parent_links_repaired
            );
        }
        Role::Teacher => {
            conn.execute(
                "DELETE FROM homework_classes
                 WHERE homework_id IN (SELECT id FROM homework WHERE teacher_id = ?)",
                [id],
            )?;
            out.homework = conn.execute("DELETE FROM homework WHERE teacher_id = ?", [id])?;
            conn.execute(
                "DELETE FROM announcement_classes
                 WHERE announcement_id IN (SELECT id FROM announcements WHERE teacher_id = ?)",
                [id],
            )?;
            out.announcements =
                conn.execute("DELETE FROM announcements WHERE teacher_id = ?", [id])?;
            out.teacher_class_links =
                conn.execute("DELETE FROM teacher_classes WHERE teacher_id = ?", [id])?;
            log::info!(
                "deleted {} homework, {} announcements for teacher {}",
                out.homework,
                out.announcements,
                id
            );
        }
        Role::Parent => {
            // Children keep existing; their parentId becomes null.
            out.parent_links_repaired =
                conn.execute("DELETE FROM parent_children WHERE parent_id = ?", [id])?;
            log::info!(
                "cleared parent {} from {} children",
                id,
                out.parent_links_repaired
            );
        }
        Role::Admin => {}
    }

    conn.execute("DELETE FROM users WHERE id = ?", [id])?;
    log::info!("deleted user {} ({})", id, user.role);
    Ok(out)
}

pub fn delete_class(conn: &Connection, class_id: &str) -> CoreResult<ClassDeletion> {
    let tx = conn.unchecked_transaction()?;
    let out = delete_class_in(&tx, class_id)?;
    tx.commit()?;
    Ok(out)
}

pub fn delete_class_in(conn: &Connection, class_id: &str) -> CoreResult<ClassDeletion> {
    if !store::class_exists(conn, class_id)? {
        return Err(CoreError::not_found("class", class_id));
    }
    let students: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    if students > 0 {
        return Err(CoreError::Conflict(format!(
            "class {} still has {} students",
            class_id, students
        )));
    }

    let out = ClassDeletion {
        class_id: class_id.to_string(),
        teacher_links: conn.execute("DELETE FROM teacher_classes WHERE class_id = ?", [class_id])?,
        subject_links: conn.execute("DELETE FROM class_subjects WHERE class_id = ?", [class_id])?,
        homework_links: conn
            .execute("DELETE FROM homework_classes WHERE class_id = ?", [class_id])?,
        announcement_links: conn.execute(
            "DELETE FROM announcement_classes WHERE class_id = ?",
            [class_id],
        )?,
    };
    conn.execute("DELETE FROM classes WHERE id = ?", [class_id])?;
    log::info!("deleted class {}", class_id);
    Ok(out)
}

pub fn delete_subject(conn: &Connection, subject_id: &str) -> CoreResult<SubjectDeletion> {
    let tx = conn.unchecked_transaction()?;
    let out = delete_subject_in(&tx, subject_id)?;
    tx.commit()?;
    Ok(out)
}

pub fn delete_subject_in(conn: &Connection, subject_id: &str) -> CoreResult<SubjectDeletion> {
    if store::load_subject(conn, subject_id)?.is_none() {
        return Err(CoreError::not_found("subject", subject_id));
    }

    let mut resynced_classes = Vec::new();
    for class_id in store::classes_with_subject(conn, subject_id)? {
        let remaining: Vec<String> = store::class_subject_ids(conn, &class_id)?
            .into_iter()
            .filter(|id| id != subject_id)
            .collect();
        resynced_classes.push(sync::set_class_subjects_in(conn, &class_id, &remaining)?);
    }
    conn.execute("DELETE FROM subjects WHERE id = ?", [subject_id])?;
    log::info!(
        "deleted subject {} ({} classes resynced)",
        subject_id,
        resynced_classes.len()
    );

    Ok(SubjectDeletion {
        subject_id: subject_id.to_string(),
        resynced_classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::sync::fixtures::*;

    fn seed_school(conn: &Connection) {
        class(conn, "C1");
        subject(conn, "MATH", "Mathematics");
        link_subject(conn, "C1", "MATH");
        user(conn, "S001", "student", None);
        conn.execute("UPDATE users SET class_id = 'C1' WHERE id = 'S001'", [])
            .expect("class");
        user(conn, "P001", "parent", None);
        user(conn, "T100", "teacher", Some("Mathematics"));
        sync::assign_student_to_parent(conn, "S001", "P001").expect("assign");
        sync::sync_teacher_to_classes_by_subject(conn, "T100").expect("sync");

        conn.execute_batch(
            "INSERT INTO messages(id, sender_id, receiver_id, timestamp) VALUES('m1', 'T100', 'S001', 't');
             INSERT INTO messages(id, sender_id, receiver_id, timestamp) VALUES('m2', 'P001', 'T100', 't');
             INSERT INTO message_attachments(id, message_id, file_name, mime_type, size_bytes, url)
               VALUES('a1', 'm1', 'sheet.pdf', 'application/pdf', 10, 'uploads/sheet.pdf');
             INSERT INTO grades(id, student_id, subject, assignment, marks_obtained, max_marks, date)
               VALUES('g1', 'S001', 'Mathematics', 'Quiz 1', 8, 10, '2024-09-01');
             INSERT INTO attendance(id, student_id, date, status, created_at)
               VALUES('at1', 'S001', '2024-09-01', 'present', 'now');
             INSERT INTO homework(id, title, subject, due_date, assigned_date, teacher_id, created_at)
               VALUES('hw1', 'Fractions', 'Mathematics', '2024-09-08', '2024-09-01', 'T100', 'now');
             INSERT INTO homework_classes(homework_id, class_id) VALUES('hw1', 'C1');
             INSERT INTO announcements(id, title, content, date, teacher_id, created_at)
               VALUES('an1', 'Test', 'Friday', '2024-09-01', 'T100', 'now');
             INSERT INTO announcement_classes(announcement_id, class_id) VALUES('an1', 'C1');",
        )
        .expect("seed records");
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).expect("count")
    }

    #[test]
    fn deleting_a_student_removes_records_and_repairs_parent() {
        let conn = db::open_in_memory().expect("db");
        seed_school(&conn);

        let out = delete_user(&conn, "S001").expect("delete");
        assert_eq!(out.messages, 1);
        assert_eq!(out.attachments, 1);
        assert_eq!(out.grades, 1);
        assert_eq!(out.attendance, 1);
        assert_eq!(out.parent_links_repaired, 1);

        assert!(store::children_of(&conn, "P001").expect("children").is_empty());
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM grades"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM attendance"), 0);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM messages WHERE sender_id = 'S001' OR receiver_id = 'S001'"),
            0
        );
        assert!(matches!(
            delete_user(&conn, "S001"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn deleting_a_teacher_removes_owned_content() {
        let conn = db::open_in_memory().expect("db");
        seed_school(&conn);

        let out = delete_user(&conn, "T100").expect("delete");
        assert_eq!(out.messages, 2);
        assert_eq!(out.homework, 1);
        assert_eq!(out.announcements, 1);
        assert_eq!(out.teacher_class_links, 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM homework_classes"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM announcement_classes"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM grades"), 1);
    }

    #[test]
    fn deleting_a_parent_clears_children_parent_id() {
        let conn = db::open_in_memory().expect("db");
        seed_school(&conn);

        let out = delete_user(&conn, "P001").expect("delete");
        assert_eq!(out.parent_links_repaired, 1);
        let s = store::require_user(&conn, "S001").expect("student survives");
        assert!(s.parent_id.is_none());
    }

    #[test]
    fn class_with_students_cannot_be_deleted() {
        let conn = db::open_in_memory().expect("db");
        seed_school(&conn);

        assert!(matches!(delete_class(&conn, "C1"), Err(CoreError::Conflict(_))));
        delete_user(&conn, "S001").expect("remove student");

        let out = delete_class(&conn, "C1").expect("delete class");
        assert_eq!(out.teacher_links, 1);
        assert_eq!(out.subject_links, 1);
        assert_eq!(out.homework_links, 1);
        assert!(store::teacher_class_ids(&conn, "T100").expect("classes").is_empty());
        assert!(matches!(delete_class(&conn, "C1"), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn deleting_a_subject_drops_it_from_classes_and_teachers() {
        let conn = db::open_in_memory().expect("db");
        seed_school(&conn);

        let out = delete_subject(&conn, "MATH").expect("delete subject");
        assert_eq!(out.resynced_classes.len(), 1);
        assert_eq!(out.resynced_classes[0].removed, vec!["T100".to_string()]);
        assert!(store::class_subject_ids(&conn, "C1").expect("subjects").is_empty());
        assert!(store::teacher_class_ids(&conn, "T100").expect("classes").is_empty());
        let t = store::require_user(&conn, "T100").expect("teacher");
        assert_eq!(t.subject.as_deref(), Some("Mathematics"));
    }
}
