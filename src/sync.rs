//! Relationship synchronization for the User/Class/Subject graph.
//!
//! Each public operation runs in its own transaction. The `*_in` variants do
//! the same work against a connection the caller already holds a
//! transaction on, so handlers can compose several steps atomically.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::model::{Role, User};
use crate::store;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkChange {
    pub previous_parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSync {
    pub teacher_id: String,
    pub subject_id: Option<String>,
    /// False when the teacher has no subject; classIds were left alone.
    pub applied: bool,
    pub class_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncReport {
    pub class_id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLink {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLink {
    pub id: String,
    pub name: String,
    pub children_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationships {
    pub students: Vec<StudentLink>,
    pub parents: Vec<ParentLink>,
}

pub fn assign_student_to_parent(
    conn: &Connection,
    student_id: &str,
    parent_id: &str,
) -> CoreResult<LinkChange> {
    let tx = conn.unchecked_transaction()?;
    let change = assign_student_to_parent_in(&tx, student_id, parent_id)?;
    tx.commit()?;
    Ok(change)
}

pub fn assign_student_to_parent_in(
    conn: &Connection,
    student_id: &str,
    parent_id: &str,
) -> CoreResult<LinkChange> {
    let student = store::require_user_with_role(conn, student_id, Role::Student)?;
    let parent = store::require_user_with_role(conn, parent_id, Role::Parent)?;

    let previous_parent_id = store::parent_of(conn, &student.id)?;
    conn.execute(
        "INSERT INTO parent_children(student_id, parent_id) VALUES(?, ?)
         ON CONFLICT(student_id) DO UPDATE SET parent_id = excluded.parent_id",
        (&student.id, &parent.id),
    )?;

    match previous_parent_id.as_deref() {
        Some(prev) if prev != parent.id => log::info!(
            "moved student {} from parent {} to {}",
            student.id,
            prev,
            parent.id
        ),
        Some(_) => log::debug!("student {} already linked to {}", student.id, parent.id),
        None => log::info!("assigned student {} to parent {}", student.id, parent.id),
    }
    Ok(LinkChange { previous_parent_id })
}

pub fn unassign_student(conn: &Connection, student_id: &str) -> CoreResult<LinkChange> {
    let tx = conn.unchecked_transaction()?;
    let change = unassign_student_in(&tx, student_id)?;
    tx.commit()?;
    Ok(change)
}

pub fn unassign_student_in(conn: &Connection, student_id: &str) -> CoreResult<LinkChange> {
    let student = store::require_user_with_role(conn, student_id, Role::Student)?;
    let previous_parent_id = store::parent_of(conn, &student.id)?;
    if previous_parent_id.is_some() {
        conn.execute(
            "DELETE FROM parent_children WHERE student_id = ?",
            [&student.id],
        )?;
        log::info!("unassigned student {} from its parent", student.id);
    }
    Ok(LinkChange { previous_parent_id })
}

pub fn sync_teacher_to_classes_by_subject(
    conn: &Connection,
    teacher_id: &str,
) -> CoreResult<TeacherSync> {
    let tx = conn.unchecked_transaction()?;
    let out = sync_teacher_to_classes_by_subject_in(&tx, teacher_id)?;
    tx.commit()?;
    Ok(out)
}

pub fn sync_teacher_to_classes_by_subject_in(
    conn: &Connection,
    teacher_id: &str,
) -> CoreResult<TeacherSync> {
    let teacher = store::require_user_with_role(conn, teacher_id, Role::Teacher)?;
    let Some(subject_name) = teacher.subject.as_deref() else {
        return Ok(TeacherSync {
            teacher_id: teacher.id,
            subject_id: None,
            applied: false,
            class_ids: teacher.class_ids,
        });
    };

    let subject = store::find_subject_by_name(conn, subject_name)?;
    let class_ids = match &subject {
        Some(s) => store::classes_with_subject(conn, &s.id)?,
        None => Vec::new(),
    };
    replace_teacher_classes(conn, &teacher.id, &class_ids)?;
    log::info!(
        "teacher {} ({}) now assigned to {} classes",
        teacher.id,
        subject_name,
        class_ids.len()
    );

    Ok(TeacherSync {
        teacher_id: teacher.id,
        subject_id: subject.map(|s| s.id),
        applied: true,
        class_ids,
    })
}

pub fn set_teacher_classes_in(
    conn: &Connection,
    teacher_id: &str,
    class_ids: &[String],
) -> CoreResult<Vec<String>> {
    let teacher = store::require_user_with_role(conn, teacher_id, Role::Teacher)?;
    for class_id in class_ids {
        if !store::class_exists(conn, class_id)? {
            return Err(CoreError::not_found("class", class_id.as_str()));
        }
    }
    replace_teacher_classes(conn, &teacher.id, class_ids)?;
    store::teacher_class_ids(conn, &teacher.id)
}

fn replace_teacher_classes(conn: &Connection, teacher_id: &str, class_ids: &[String]) -> CoreResult<()> {
    conn.execute(
        "DELETE FROM teacher_classes WHERE teacher_id = ?",
        [teacher_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO teacher_classes(teacher_id, class_id) VALUES(?, ?)",
    )?;
    for class_id in class_ids {
        stmt.execute((teacher_id, class_id))?;
    }
    Ok(())
}

pub fn on_class_subjects_changed(
    conn: &Connection,
    class_id: &str,
    new_subject_ids: &[String],
) -> CoreResult<ResyncReport> {
    let tx = conn.unchecked_transaction()?;
    let report = on_class_subjects_changed_in(&tx, class_id, new_subject_ids)?;
    tx.commit()?;
    Ok(report)
}

/// Recomputes membership of `class_id` in every subject-bearing teacher's
/// classIds. A failure on one teacher is logged and recorded in the report;
/// the remaining teachers are still processed.
pub fn on_class_subjects_changed_in(
    conn: &Connection,
    class_id: &str,
    new_subject_ids: &[String],
) -> CoreResult<ResyncReport> {
    if !store::class_exists(conn, class_id)? {
        return Err(CoreError::not_found("class", class_id));
    }

    let mut report = ResyncReport {
        class_id: class_id.to_string(),
        ..ResyncReport::default()
    };
    for (teacher_id, subject_name) in store::teachers_with_subject(conn)? {
        match resync_teacher_for_class(conn, &teacher_id, &subject_name, class_id, new_subject_ids) {
            Ok(Some(true)) => report.added.push(teacher_id),
            Ok(Some(false)) => report.removed.push(teacher_id),
            Ok(None) => {}
            Err(e) => {
                log::warn!(
                    "failed to resync teacher {} for class {}: {}",
                    teacher_id,
                    class_id,
                    e
                );
                report.failed.push(teacher_id);
            }
        }
    }
    log::debug!(
        "class {} resync: +{} -{} failed {}",
        class_id,
        report.added.len(),
        report.removed.len(),
        report.failed.len()
    );
    Ok(report)
}

/// `Some(true)` when the class was added, `Some(false)` when removed,
/// `None` when membership was already correct.
fn resync_teacher_for_class(
    conn: &Connection,
    teacher_id: &str,
    subject_name: &str,
    class_id: &str,
    new_subject_ids: &[String],
) -> CoreResult<Option<bool>> {
    let qualifies = match store::find_subject_by_name(conn, subject_name)? {
        Some(subject) => new_subject_ids.iter().any(|id| *id == subject.id),
        None => false,
    };
    let has = store::row_exists(
        conn,
        "SELECT 1 FROM teacher_classes WHERE teacher_id = ? AND class_id = ?",
        (teacher_id, class_id),
    )?;

    match (qualifies, has) {
        (true, false) => {
            conn.execute(
                "INSERT INTO teacher_classes(teacher_id, class_id) VALUES(?, ?)",
                (teacher_id, class_id),
            )?;
            Ok(Some(true))
        }
        (false, true) => {
            conn.execute(
                "DELETE FROM teacher_classes WHERE teacher_id = ? AND class_id = ?",
                (teacher_id, class_id),
            )?;
            Ok(Some(false))
        }
        _ => Ok(None),
    }
}

/// Replaces the class's subjectIds and resyncs teachers against them.
pub fn set_class_subjects_in(
    conn: &Connection,
    class_id: &str,
    subject_ids: &[String],
) -> CoreResult<ResyncReport> {
    if !store::class_exists(conn, class_id)? {
        return Err(CoreError::not_found("class", class_id));
    }
    let mut wanted: Vec<String> = subject_ids.to_vec();
    wanted.sort();
    wanted.dedup();
    for subject_id in &wanted {
        if store::load_subject(conn, subject_id)?.is_none() {
            return Err(CoreError::not_found("subject", subject_id.as_str()));
        }
    }

    conn.execute("DELETE FROM class_subjects WHERE class_id = ?", [class_id])?;
    let mut stmt =
        conn.prepare("INSERT INTO class_subjects(class_id, subject_id) VALUES(?, ?)")?;
    for subject_id in &wanted {
        stmt.execute((class_id, subject_id))?;
    }

    on_class_subjects_changed_in(conn, class_id, &wanted)
}

pub fn list_relationships(conn: &Connection) -> CoreResult<Relationships> {
    let students = store::list_users(conn, Some(Role::Student))?
        .into_iter()
        .map(|u: User| StudentLink {
            id: u.id,
            name: u.name,
            parent_id: u.parent_id,
            class_id: u.class_id,
        })
        .collect();
    let parents = store::list_users(conn, Some(Role::Parent))?
        .into_iter()
        .map(|u: User| ParentLink {
            id: u.id,
            name: u.name,
            children_ids: u.children_ids,
        })
        .collect();
    Ok(Relationships { students, parents })
}
