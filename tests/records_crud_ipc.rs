use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_edconad");
    let mut child = Command::new(exe)
        .env_remove("EDCONAD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn edconad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value["error"]["code"].as_str().unwrap_or("").to_string()
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &std::path::Path) {
    request_ok(
        stdin,
        reader,
        "s0",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "s1",
        "classes.create",
        json!({ "name": "7A", "classId": "C1" }),
    );
    request_ok(
        stdin,
        reader,
        "s2",
        "classes.create",
        json!({ "name": "7B", "classId": "C2" }),
    );
    request_ok(
        stdin,
        reader,
        "s3",
        "users.create",
        json!({ "name": "Tia", "role": "teacher", "userId": "T100" }),
    );
    request_ok(
        stdin,
        reader,
        "s4",
        "users.create",
        json!({ "name": "Sam", "role": "student", "userId": "S1", "classId": "C1" }),
    );
    request_ok(
        stdin,
        reader,
        "s5",
        "users.create",
        json!({ "name": "Pat", "role": "parent", "userId": "P100" }),
    );
}

#[test]
fn homework_and_announcements_filter_by_class() {
    let workspace = temp_dir("edcona-homework");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let hw = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "homework.create",
        json!({ "title": "Fractions", "subject": "Mathematics", "dueDate": "2024-09-10", "teacherId": "T100", "classIds": ["C1"] }),
    );
    let hw_id = hw["homework"]["id"].as_str().expect("hw id").to_string();
    assert!(hw_id.starts_with("HW-"));
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "homework.create",
        json!({ "title": "Essay", "subject": "English", "dueDate": "2024-09-12", "assignedDate": "2024-09-01", "teacherId": "T100", "classIds": ["C2"] }),
    );

    let c1 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "homework.list",
        json!({ "classId": "C1" }),
    );
    let items = c1["homework"].as_array().expect("homework");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Fractions");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "homework.update",
        json!({ "homeworkId": hw_id, "classIds": ["C1", "C2"], "dueDate": "2024-09-11" }),
    );
    assert_eq!(updated["homework"]["classIds"], json!(["C1", "C2"]));
    assert_eq!(updated["homework"]["dueDate"], "2024-09-11");

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "5",
            "homework.create",
            json!({ "title": "X", "subject": "Y", "dueDate": "10/09/2024", "teacherId": "T100" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "6",
            "homework.create",
            json!({ "title": "X", "subject": "Y", "dueDate": "2024-09-10", "teacherId": "S1" }),
        ),
        "not_found"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "7",
            "homework.create",
            json!({ "title": "X", "subject": "Y", "dueDate": "2024-09-10", "teacherId": "T100", "classIds": ["C404"] }),
        ),
        "not_found"
    );

    let ann = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "announcements.create",
        json!({ "title": "Trip", "content": "Museum on Friday", "teacherId": "T100", "classIds": ["C2"] }),
    );
    assert_eq!(ann["announcement"]["priority"], "medium");
    let ann_id = ann["announcement"]["id"].as_str().expect("ann id").to_string();
    assert!(ann_id.starts_with("ANN-"));

    let c2 = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "announcements.list",
        json!({ "classId": "C2" }),
    );
    assert_eq!(c2["announcements"].as_array().map(|a| a.len()), Some(1));
    let c1 = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "announcements.list",
        json!({ "classId": "C1" }),
    );
    assert_eq!(c1["announcements"], json!([]));

    let bumped = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "announcements.update",
        json!({ "announcementId": ann_id, "priority": "HIGH" }),
    );
    assert_eq!(bumped["announcement"]["priority"], "high");
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "12",
            "announcements.update",
            json!({ "announcementId": ann_id, "priority": "urgent" }),
        ),
        "bad_params"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "announcements.delete",
        json!({ "announcementId": ann_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "homework.delete",
        json!({ "homeworkId": hw_id }),
    );
    let all = request_ok(&mut stdin, &mut reader, "15", "homework.list", json!({}));
    assert_eq!(all["homework"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grades_and_attendance_validate_values() {
    let workspace = temp_dir("edcona-grades");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let grade = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.create",
        json!({ "studentId": "S1", "subject": "Mathematics", "assignment": "Quiz 1", "marksObtained": 7.5, "maxMarks": 10, "date": "2024-09-03" }),
    );
    assert_eq!(grade["grade"]["kind"], "quiz");
    let grade_id = grade["grade"]["id"].as_str().expect("grade id").to_string();

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "2",
            "grades.create",
            json!({ "studentId": "S1", "subject": "Mathematics", "assignment": "Quiz 2", "marksObtained": 11, "maxMarks": 10 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "3",
            "grades.create",
            json!({ "studentId": "S1", "subject": "Mathematics", "assignment": "Quiz 2", "marksObtained": 1, "maxMarks": 0 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "4",
            "grades.create",
            json!({ "studentId": "P100", "subject": "Mathematics", "assignment": "Quiz 2", "marksObtained": 1, "maxMarks": 5 }),
        ),
        "not_found"
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.update",
        json!({ "gradeId": grade_id, "marksObtained": 9, "kind": "test" }),
    );
    assert_eq!(updated["grade"]["marksObtained"], 9.0);
    assert_eq!(updated["grade"]["kind"], "test");
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "6",
            "grades.update",
            json!({ "gradeId": grade_id, "maxMarks": 5 }),
        ),
        "bad_params"
    );

    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grades.list",
        json!({ "studentId": "S1" }),
    );
    assert_eq!(mine["grades"].as_array().map(|a| a.len()), Some(1));

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grades.delete",
        json!({ "gradeId": grade_id }),
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "9",
            "grades.delete",
            json!({ "gradeId": grade_id }),
        ),
        "not_found"
    );

    let att = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.create",
        json!({ "studentId": "S1", "date": "2024-09-02", "status": "Late" }),
    );
    assert_eq!(att["attendance"]["status"], "late");
    let att_id = att["attendance"]["id"].as_str().expect("attendance id").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.create",
        json!({ "studentId": "S1", "date": "2024-09-03", "status": "present" }),
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "12",
            "attendance.create",
            json!({ "studentId": "S1", "date": "2024-09-04", "status": "sick" }),
        ),
        "bad_params"
    );

    let day = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.list",
        json!({ "studentId": "S1", "date": "2024-09-02" }),
    );
    assert_eq!(day["attendance"].as_array().map(|a| a.len()), Some(1));

    let fixed = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.update",
        json!({ "attendanceId": att_id, "status": "present" }),
    );
    assert_eq!(fixed["attendance"]["status"], "present");
    request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "attendance.delete",
        json!({ "attendanceId": att_id }),
    );
    let left = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "attendance.list",
        json!({ "studentId": "S1" }),
    );
    assert_eq!(left["attendance"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn attachment(name: &str, mime: &str, size: i64) -> serde_json::Value {
    json!({ "fileName": name, "mimeType": mime, "sizeBytes": size, "url": format!("/files/{}", name) })
}

#[test]
fn messages_validate_attachments_and_order_conversations() {
    let workspace = temp_dir("edcona-messages");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "messages.send",
        json!({ "senderId": "P100", "receiverId": "T100", "content": "Hello", "timestamp": "2024-09-01T08:00:00+00:00" }),
    );
    assert_eq!(first["message"]["kind"], "text");
    assert_eq!(first["message"]["isRead"], false);
    let first_id = first["message"]["id"].as_str().expect("id").to_string();

    let file = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "messages.send",
        json!({
            "senderId": "T100",
            "receiverId": "P100",
            "timestamp": "2024-09-01T09:00:00+00:00",
            "attachments": [attachment("report.pdf", "application/pdf", 1024), attachment("photo.png", "IMAGE/PNG", 2048)]
        }),
    );
    assert_eq!(file["message"]["kind"], "file");
    assert_eq!(file["message"]["attachments"][1]["mimeType"], "image/png");
    let file_id = file["message"]["id"].as_str().expect("id").to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "messages.send",
        json!({ "senderId": "T100", "receiverId": "P100", "kind": "voice", "audioSrc": "/audio/1.webm", "timestamp": "2024-09-01T07:00:00+00:00" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "messages.send",
        json!({ "senderId": "S1", "receiverId": "T100", "content": "Question" }),
    );

    let convo = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "messages.conversation",
        json!({ "userA": "T100", "userB": "P100" }),
    );
    let kinds: Vec<&str> = convo["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter_map(|m| m["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["voice", "text", "file"]);

    let inbox = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "messages.forUser",
        json!({ "userId": "P100" }),
    );
    let ids: Vec<&str> = inbox["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], file_id);

    let read = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "messages.markRead",
        json!({ "messageId": first_id }),
    );
    assert_eq!(read["message"]["isRead"], true);

    let too_many: Vec<serde_json::Value> = (0..6)
        .map(|i| attachment(&format!("f{}.txt", i), "text/plain", 10))
        .collect();
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "8",
            "messages.send",
            json!({ "senderId": "T100", "receiverId": "P100", "attachments": too_many }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "9",
            "messages.send",
            json!({ "senderId": "T100", "receiverId": "P100", "attachments": [attachment("big.pdf", "application/pdf", 10 * 1024 * 1024 + 1)] }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "10",
            "messages.send",
            json!({ "senderId": "T100", "receiverId": "P100", "attachments": [attachment("run.exe", "application/x-msdownload", 10)] }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "11",
            "messages.send",
            json!({ "senderId": "T100", "receiverId": "P100", "kind": "voice" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "12",
            "messages.send",
            json!({ "senderId": "T100", "receiverId": "P404", "content": "hi" }),
        ),
        "not_found"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "messages.delete",
        json!({ "messageId": file_id }),
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "14",
            "messages.markRead",
            json!({ "messageId": file_id }),
        ),
        "not_found"
    );
    let stats = request_ok(&mut stdin, &mut reader, "15", "backup.stats", json!({}));
    assert_eq!(stats["counts"]["messages"], 3);
    assert_eq!(stats["counts"]["attachments"], 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
