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

fn is_base62(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn assert_code_shape(role: &str, code: &str) {
    match role {
        "student" | "admin" => {
            let prefix = if role == "student" { 'S' } else { 'U' };
            assert!(code.starts_with(prefix), "{} code {}", role, code);
            assert_eq!(code.len(), 7, "{} code {}", role, code);
            assert!(is_base62(&code[1..]), "{} code {}", role, code);
        }
        "teacher" | "parent" => {
            let prefix = if role == "teacher" { 'T' } else { 'P' };
            assert!(code.starts_with(prefix), "{} code {}", role, code);
            let n: u32 = code[1..].parse().expect("numeric suffix");
            assert!((100..=999).contains(&n), "{} code {}", role, code);
        }
        other => panic!("unexpected role {}", other),
    }
}

#[test]
fn generated_codes_follow_role_formats() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, role) in ["student", "teacher", "parent", "admin", "STUDENT"]
        .iter()
        .enumerate()
    {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "users.generateCode",
            json!({ "role": role }),
        );
        let code = res["code"].as_str().expect("code");
        assert_code_shape(&role.to_ascii_lowercase(), code);
    }

    // Roles outside student/teacher/parent, or none at all, get the U format.
    for (i, params) in [json!({ "role": "janitor" }), json!({ "role": "" }), json!({})]
        .iter()
        .enumerate()
    {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("o{}", i),
            "users.generateCode",
            params.clone(),
        );
        assert_code_shape("admin", res["code"].as_str().expect("code"));
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn created_users_get_unique_codes_and_code_sheet_hides_contacts() {
    let workspace = temp_dir("edcona-user-codes");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut seen = std::collections::HashSet::new();
    for (i, role) in ["student", "teacher", "parent", "admin", "teacher", "parent"]
        .iter()
        .enumerate()
    {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "users.create",
            json!({
                "name": format!("User {}", i),
                "role": role,
                "email": format!("user{}@example.com", i)
            }),
        );
        let code = res["code"].as_str().expect("code").to_string();
        assert_code_shape(role, &code);
        assert_eq!(res["user"]["id"], code.as_str());
        assert_eq!(res["user"]["role"], *role);
        assert!(seen.insert(code), "duplicate code");
    }

    let teachers = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.list",
        json!({ "role": "teacher" }),
    );
    assert_eq!(teachers["users"].as_array().map(|a| a.len()), Some(2));
    let all = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "users.list",
        json!({ "role": "all" }),
    );
    assert_eq!(all["users"].as_array().map(|a| a.len()), Some(6));

    let sheet = request_ok(&mut stdin, &mut reader, "4", "users.codes", json!({}));
    let rows = sheet["codes"].as_array().expect("codes");
    assert_eq!(rows.len(), 6);
    assert!(!sheet.to_string().contains("@example.com"));
    assert!(rows.iter().all(|r| r.get("avatar").is_none()));

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "5",
            "users.create",
            json!({ "name": "Taken", "role": "student", "userId": rows[0]["id"] }),
        ),
        "conflict"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "6",
            "users.create",
            json!({ "name": "Odd", "role": "parent", "subject": "Mathematics" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "7",
            "users.create",
            json!({ "name": "Janitor", "role": "janitor" }),
        ),
        "bad_params"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
