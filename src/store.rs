//! Read-side access to the entity store. Every function takes the connection
//! (or an open transaction, which derefs to one) explicitly.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{CoreError, CoreResult};
use crate::model::{Class, Role, Subject, User};

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Role::parse(raw).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

pub fn query_strings<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> CoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn row_exists<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> CoreResult<bool> {
    Ok(conn
        .query_row(sql, params, |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

struct UserRow {
    id: String,
    name: String,
    role: Role,
    email: Option<String>,
    avatar: String,
    messaging_availability: bool,
    class_id: Option<String>,
    subject: Option<String>,
    created_at: String,
}

const USER_COLUMNS: &str =
    "id, name, role, email, avatar, messaging_availability, class_id, subject, created_at";

fn map_user_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: r.get(0)?,
        name: r.get(1)?,
        role: r.get(2)?,
        email: r.get(3)?,
        avatar: r.get(4)?,
        messaging_availability: r.get::<_, i64>(5)? != 0,
        class_id: r.get(6)?,
        subject: r.get(7)?,
        created_at: r.get(8)?,
    })
}

fn hydrate_user(conn: &Connection, row: UserRow) -> CoreResult<User> {
    let parent_id = match row.role {
        Role::Student => parent_of(conn, &row.id)?,
        _ => None,
    };
    let children_ids = match row.role {
        Role::Parent => children_of(conn, &row.id)?,
        _ => Vec::new(),
    };
    let class_ids = match row.role {
        Role::Teacher => teacher_class_ids(conn, &row.id)?,
        _ => Vec::new(),
    };
    Ok(User {
        id: row.id,
        name: row.name,
        role: row.role,
        email: row.email,
        avatar: row.avatar,
        messaging_availability: row.messaging_availability,
        class_id: row.class_id,
        parent_id,
        children_ids,
        subject: row.subject,
        class_ids,
        created_at: row.created_at,
    })
}

pub fn load_user(conn: &Connection, user_id: &str) -> CoreResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = conn.query_row(&sql, [user_id], map_user_row).optional()?;
    match row {
        Some(row) => Ok(Some(hydrate_user(conn, row)?)),
        None => Ok(None),
    }
}

/// Loads a user that must exist with the given role. A user of another role
/// is reported as `NotFound` for the expected role.
pub fn require_user_with_role(conn: &Connection, user_id: &str, role: Role) -> CoreResult<User> {
    match load_user(conn, user_id)? {
        Some(u) if u.role == role => Ok(u),
        _ => Err(CoreError::not_found(role.as_str(), user_id)),
    }
}

pub fn require_user(conn: &Connection, user_id: &str) -> CoreResult<User> {
    load_user(conn, user_id)?.ok_or_else(|| CoreError::not_found("user", user_id))
}

pub fn user_exists(conn: &Connection, user_id: &str) -> CoreResult<bool> {
    row_exists(conn, "SELECT 1 FROM users WHERE id = ?", [user_id])
}

pub fn list_users(conn: &Connection, role: Option<Role>) -> CoreResult<Vec<User>> {
    let rows = match role {
        Some(role) => {
            let sql = format!(
                "SELECT {} FROM users WHERE role = ? ORDER BY name, id",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([role.as_str()], map_user_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {} FROM users ORDER BY name, id", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    rows.into_iter().map(|r| hydrate_user(conn, r)).collect()
}

pub fn parent_of(conn: &Connection, student_id: &str) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT parent_id FROM parent_children WHERE student_id = ?",
            [student_id],
            |r| r.get::<_, String>(0),
        )
        .optional()?)
}

pub fn children_of(conn: &Connection, parent_id: &str) -> CoreResult<Vec<String>> {
    query_strings(
        conn,
        "SELECT student_id FROM parent_children WHERE parent_id = ? ORDER BY student_id",
        [parent_id],
    )
}

pub fn teacher_class_ids(conn: &Connection, teacher_id: &str) -> CoreResult<Vec<String>> {
    query_strings(
        conn,
        "SELECT class_id FROM teacher_classes WHERE teacher_id = ? ORDER BY class_id",
        [teacher_id],
    )
}

/// Teachers that carry a subject name, ascending by id.
pub fn teachers_with_subject(conn: &Connection) -> CoreResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject FROM users
         WHERE role = 'teacher' AND subject IS NOT NULL
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn class_exists(conn: &Connection, class_id: &str) -> CoreResult<bool> {
    row_exists(conn, "SELECT 1 FROM classes WHERE id = ?", [class_id])
}

pub fn class_subject_ids(conn: &Connection, class_id: &str) -> CoreResult<Vec<String>> {
    query_strings(
        conn,
        "SELECT subject_id FROM class_subjects WHERE class_id = ? ORDER BY subject_id",
        [class_id],
    )
}

pub fn classes_with_subject(conn: &Connection, subject_id: &str) -> CoreResult<Vec<String>> {
    query_strings(
        conn,
        "SELECT class_id FROM class_subjects WHERE subject_id = ? ORDER BY class_id",
        [subject_id],
    )
}

fn map_class(conn: &Connection, id: String, name: String) -> CoreResult<Class> {
    let subject_ids = class_subject_ids(conn, &id)?;
    let student_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE class_id = ? AND role = 'student'",
        [&id],
        |r| r.get(0),
    )?;
    Ok(Class {
        id,
        name,
        subject_ids,
        student_count,
    })
}

pub fn load_class(conn: &Connection, class_id: &str) -> CoreResult<Option<Class>> {
    let row = conn
        .query_row(
            "SELECT id, name FROM classes WHERE id = ?",
            [class_id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()?;
    match row {
        Some((id, name)) => Ok(Some(map_class(conn, id, name)?)),
        None => Ok(None),
    }
}

pub fn list_classes(conn: &Connection) -> CoreResult<Vec<Class>> {
    let mut stmt = conn.prepare("SELECT id, name FROM classes ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, name)| map_class(conn, id, name))
        .collect()
}

pub fn load_subject(conn: &Connection, subject_id: &str) -> CoreResult<Option<Subject>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM subjects WHERE id = ?",
            [subject_id],
            |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            },
        )
        .optional()?)
}

pub fn find_subject_by_name(conn: &Connection, name: &str) -> CoreResult<Option<Subject>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM subjects WHERE name = ?",
            [name],
            |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            },
        )
        .optional()?)
}

pub fn list_subjects(conn: &Connection) -> CoreResult<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn table_count(conn: &Connection, table: &str) -> CoreResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}
