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
    let exe = env!("CARGO_BIN_EXE_gradescaled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradescaled");
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .expect("error code")
}

#[test]
fn mutations_without_a_valid_session_key_are_rejected_without_writing() {
    let workspace = temp_dir("gradescale-sesskey");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sesskey = request_ok(&mut stdin, &mut reader, "2", "session.token", json!({}))
        .get("sesskey")
        .and_then(|v| v.as_str())
        .expect("sesskey")
        .to_string();

    // Scope creation is a mutation too.
    let denied = request(
        &mut stdin,
        &mut reader,
        "3",
        "schools.create",
        json!({ "name": "Northside High" }),
    );
    assert_eq!(error_code(&denied), "forbidden");

    let school_id = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schools.create",
        json!({ "name": "Northside High", "sesskey": sesskey }),
    )
    .get("schoolId")
    .and_then(|v| v.as_i64())
    .expect("schoolId");

    // Form submission with no key.
    let denied = request(
        &mut stdin,
        &mut reader,
        "5",
        "scales.manage",
        json!({
            "action": "add",
            "schoolId": school_id,
            "form": {
                "letter": "B",
                "minPercentage": 80.0,
                "maxPercentage": 89.99,
                "gradePoints": 3.0
            }
        }),
    );
    assert_eq!(error_code(&denied), "forbidden");

    // Form submission with a forged key.
    let denied = request(
        &mut stdin,
        &mut reader,
        "6",
        "scales.manage",
        json!({
            "action": "add",
            "schoolId": school_id,
            "sesskey": "forged",
            "form": {
                "letter": "B",
                "minPercentage": 80.0,
                "maxPercentage": 89.99,
                "gradePoints": 3.0
            }
        }),
    );
    assert_eq!(error_code(&denied), "forbidden");

    // Nothing was written.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "scales.manage",
        json!({ "action": "", "schoolId": school_id }),
    );
    assert_eq!(listed.get("empty").and_then(|v| v.as_bool()), Some(true));

    // Reads never need the key.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "scales.manage",
        json!({ "action": "" }),
    );
}

#[test]
fn delete_with_bad_key_fails_closed_even_for_missing_ids() {
    let workspace = temp_dir("gradescale-sesskey-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // The key is checked before the row lookup, so a forged key sees
    // "forbidden" whether or not the id exists.
    let denied = request(
        &mut stdin,
        &mut reader,
        "2",
        "scales.manage",
        json!({ "action": "delete", "id": 12345, "sesskey": "forged" }),
    );
    assert_eq!(error_code(&denied), "forbidden");

    let denied = request(
        &mut stdin,
        &mut reader,
        "3",
        "scales.manage",
        json!({ "action": "delete", "id": 12345 }),
    );
    assert_eq!(error_code(&denied), "forbidden");
}

#[test]
fn bundle_import_requires_the_session_key() {
    let workspace = temp_dir("gradescale-sesskey-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let denied = request(
        &mut stdin,
        &mut reader,
        "2",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": workspace.join("missing.zip").to_string_lossy()
        }),
    );
    assert_eq!(error_code(&denied), "forbidden");
}
