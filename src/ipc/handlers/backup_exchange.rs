use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{SqliteStore, Store};
use serde_json::json;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn path_param(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_export_bundle(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = match path_param(req, "workspacePath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let out_path = match path_param(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:#}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Importing replaces the workspace database: a mutation, so the session
    // key is required up front.
    let candidate = req.params.get("sesskey").and_then(|v| v.as_str());
    if !state.session.matches(candidate) {
        return err(&req.id, "forbidden", "invalid session key", None);
    }

    let workspace = match path_param(req, "workspacePath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let in_path = match path_param(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Drop the open connection before the file swap.
    if state.workspace.as_deref() == Some(workspace.as_path()) {
        state.db = None;
    }

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "backup_import_failed", format!("{e:#}"), None),
    };

    match db::open_db(&workspace) {
        Ok(conn) => {
            state.workspace = Some(workspace.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace.to_string_lossy(),
                    "bundleFormatDetected": summary.bundle_format_detected,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_export_scales_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let school_id = match req.params.get("schoolId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let out_path = match path_param(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let store = SqliteStore::new(conn);
    let school = match store.require_school(school_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "not_found", e.to_string(), None),
    };
    let rows = match store.scales_for_school(school_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut out = String::from("letter,min_percentage,max_percentage,grade_points,quality,sort_order\n");
    for row in &rows {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_quote(&row.letter),
            row.min_percentage,
            row.max_percentage,
            row.grade_points,
            csv_quote(&row.quality),
            row.sort_order
        ));
    }

    if let Some(parent) = out_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "io_failed", e.to_string(), None);
        }
    }
    if let Err(e) = std::fs::write(&out_path, out) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "outPath": out_path.to_string_lossy(),
            "school": school.name,
            "rowCount": rows.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_bundle(state, req)),
        "exchange.exportScalesCsv" => Some(handle_export_scales_csv(state, req)),
        _ => None,
    }
}
