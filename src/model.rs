use serde::Serialize;
use std::fmt;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Parent,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
            Role::Admin => "admin",
        }
    }

    /// Case-insensitive; clients historically sent both `STUDENT` and `student`.
    pub fn parse(raw: &str) -> Result<Role, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::validation(format!("unknown role: {}", other))),
        }
    }

    /// Role whose code format applies to `raw`. Anything that is not a
    /// student, teacher or parent, including no role at all, gets the
    /// admin format.
    pub fn for_code(raw: Option<&str>) -> Role {
        match raw.map(Role::parse) {
            Some(Ok(role)) => role,
            _ => Role::Admin,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub avatar: String,
    pub messaging_availability: bool,
    pub class_id: Option<String>,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    pub subject: Option<String>,
    pub class_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub subject_ids: Vec<String>,
    pub student_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub due_date: String,
    pub assigned_date: String,
    pub teacher_id: String,
    pub class_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub date: String,
    pub priority: String,
    pub teacher_id: String,
    pub class_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub assignment: String,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub kind: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub kind: String,
    pub content: Option<String>,
    pub audio_src: Option<String>,
    pub timestamp: String,
    pub is_read: bool,
    pub attachments: Vec<Attachment>,
}

pub const GRADE_KINDS: &[&str] = &["quiz", "test", "homework", "project", "exam"];
pub const ATTENDANCE_STATUSES: &[&str] = &["present", "absent", "late"];
pub const ANNOUNCEMENT_PRIORITIES: &[&str] = &["low", "medium", "high"];
pub const MESSAGE_KINDS: &[&str] = &["text", "voice", "file"];

pub const MAX_ATTACHMENTS: usize = 5;
pub const MAX_ATTACHMENT_BYTES: i64 = 10 * 1024 * 1024;
pub const ATTACHMENT_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
];

/// Lowercases `raw` and checks it against `allowed`, naming `field` in the error.
pub fn parse_enum_value(field: &str, raw: &str, allowed: &[&str]) -> Result<String, CoreError> {
    let v = raw.trim().to_ascii_lowercase();
    if allowed.contains(&v.as_str()) {
        Ok(v)
    } else {
        Err(CoreError::validation(format!(
            "{} must be one of {}",
            field,
            allowed.join(", ")
        )))
    }
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
