use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn check_sesskey(state: &AppState, req: &Request) -> Result<(), serde_json::Value> {
    let candidate = req.params.get("sesskey").and_then(|v| v.as_str());
    if state.session.matches(candidate) {
        Ok(())
    } else {
        Err(err(&req.id, "forbidden", "invalid session key", None))
    }
}

fn handle_schools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schools": [] }));
    };

    // Include scale counts so the picker can show a useful overview.
    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           (SELECT COUNT(*) FROM grade_scales g WHERE g.school_id = s.id) AS scale_count
         FROM schools s
         ORDER BY s.name, s.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let scale_count: i64 = row.get(2)?;
            Ok(json!({
                "id": id,
                "name": name,
                "scaleCount": scale_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(schools) => ok(&req.id, json!({ "schools": schools })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = check_sesskey(state, req) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    if let Err(e) = conn.execute("INSERT INTO schools(name) VALUES(?)", [&name]) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "schools" })),
        );
    }
    let school_id = conn.last_insert_rowid();

    ok(&req.id, json!({ "schoolId": school_id, "name": name }))
}

fn handle_schools_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = check_sesskey(state, req) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let school_id = match req.params.get("schoolId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM schools WHERE id = ?", [school_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if exists.is_none() {
        return err(&req.id, "not_found", "school not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute("DELETE FROM grade_scales WHERE school_id = ?", [school_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grade_scales" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM schools WHERE id = ?", [school_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schools" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.list" => Some(handle_schools_list(state, req)),
        "schools.create" => Some(handle_schools_create(state, req)),
        "schools.delete" => Some(handle_schools_delete(state, req)),
        _ => None,
    }
}
