use crate::controller::{
    FormOutcome, Notice, Page, ScaleScreen, ScreenError, ScreenRequest, SystemClock,
};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{GradeScale, ScaleDraft, School, SqliteStore, StoreError};
use serde_json::json;

fn parse_screen_request(params: &serde_json::Value) -> Result<ScreenRequest, String> {
    let action = params
        .get("action")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let id = params.get("id").and_then(|v| v.as_i64());
    let school_id = params.get("schoolId").and_then(|v| v.as_i64());
    let confirm = match params.get("confirm") {
        Some(v) => v.as_bool().unwrap_or(false) || v.as_i64() == Some(1),
        None => false,
    };
    let sesskey = params
        .get("sesskey")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let cancelled = params
        .get("cancelled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let form = if cancelled {
        FormOutcome::Cancelled
    } else if let Some(form) = params.get("form") {
        FormOutcome::Submitted(parse_form(form)?)
    } else {
        FormOutcome::NotSubmitted
    };

    Ok(ScreenRequest {
        action,
        id,
        school_id,
        confirm,
        sesskey,
        form,
    })
}

fn parse_form(form: &serde_json::Value) -> Result<ScaleDraft, String> {
    let Some(obj) = form.as_object() else {
        return Err("form must be an object".to_string());
    };
    let letter = match obj.get("letter").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return Err("form.letter must be a string".to_string()),
    };
    let number = |key: &str| -> Result<f64, String> {
        obj.get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| format!("form.{} must be a number", key))
    };
    Ok(ScaleDraft {
        letter,
        min_percentage: number("minPercentage")?,
        max_percentage: number("maxPercentage")?,
        grade_points: number("gradePoints")?,
        quality: obj
            .get("quality")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        sort_order: obj.get("sortOrder").and_then(|v| v.as_i64()).unwrap_or(0),
    })
}

fn school_json(school: &School) -> serde_json::Value {
    json!({ "id": school.id, "name": school.name })
}

fn row_json(scale: &GradeScale) -> serde_json::Value {
    json!({
        "id": scale.id,
        "schoolId": scale.school_id,
        "letter": scale.letter,
        "minPercentage": scale.min_percentage,
        "maxPercentage": scale.max_percentage,
        "gradePoints": scale.grade_points,
        "quality": scale.quality,
        "sortOrder": scale.sort_order,
        "timeCreated": scale.time_created,
        "timeModified": scale.time_modified,
        "edit": { "action": "edit", "id": scale.id },
        "delete": { "action": "delete", "id": scale.id, "schoolId": scale.school_id }
    })
}

fn render_page(page: &Page) -> serde_json::Value {
    match page {
        Page::SchoolPicker { schools } => json!({
            "view": "schoolPicker",
            "schools": schools
                .iter()
                .map(|s| json!({
                    "id": s.id,
                    "name": s.name,
                    "open": { "action": "", "schoolId": s.id }
                }))
                .collect::<Vec<_>>()
        }),
        Page::ScaleList { school, rows } => {
            let mut body = json!({
                "view": "scaleList",
                "school": school_json(school),
                "rows": rows.iter().map(row_json).collect::<Vec<_>>(),
                "empty": rows.is_empty(),
            });
            if rows.is_empty() {
                body["emptyNotice"] =
                    json!("No grade scales have been defined for this school.");
            }
            body
        }
        Page::ScaleForm { school, existing } => {
            let values = match existing {
                Some(scale) => json!({
                    "letter": scale.letter,
                    "minPercentage": scale.min_percentage,
                    "maxPercentage": scale.max_percentage,
                    "gradePoints": scale.grade_points,
                    "quality": scale.quality,
                    "sortOrder": scale.sort_order,
                }),
                None => json!({
                    "letter": "",
                    "minPercentage": 0.0,
                    "maxPercentage": 100.0,
                    "gradePoints": 0.0,
                    "quality": "",
                    "sortOrder": 0,
                }),
            };
            json!({
                "view": "scaleForm",
                "mode": if existing.is_some() { "edit" } else { "add" },
                "school": school_json(school),
                "scaleId": existing.as_ref().map(|s| s.id),
                "values": values,
            })
        }
        Page::DeleteConfirm { school, scale } => json!({
            "view": "deleteConfirm",
            "school": school_json(school),
            "scale": { "id": scale.id, "letter": scale.letter },
            "message": format!(
                "Delete grade \"{}\" from {}?",
                scale.letter, school.name
            ),
            "confirm": {
                "action": "delete",
                "id": scale.id,
                "schoolId": school.id,
                "confirm": true
            },
            "cancel": { "action": "", "schoolId": school.id }
        }),
        Page::Redirect { school_id, notice } => json!({
            "redirect": { "view": "scaleList", "schoolId": school_id },
            "notification": notice.map(Notice::as_str),
        }),
    }
}

fn error_response(id: &str, e: ScreenError) -> serde_json::Value {
    match &e {
        ScreenError::MissingParam(_)
        | ScreenError::UnknownAction(_)
        | ScreenError::InvalidField { .. } => err(id, "bad_params", e.to_string(), None),
        ScreenError::BadSessionKey => err(id, "forbidden", e.to_string(), None),
        ScreenError::Store(StoreError::Missing { .. }) => err(id, "not_found", e.to_string(), None),
        ScreenError::Store(StoreError::Query(q)) => err(id, "db_query_failed", q.to_string(), None),
    }
}

fn handle_scales_manage(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let screen_req = match parse_screen_request(&req.params) {
        Ok(v) => v,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };

    let store = SqliteStore::new(conn);
    let clock = SystemClock;
    let screen = ScaleScreen::new(&store, &state.session, &clock);
    match screen.handle(&screen_req) {
        Ok(page) => ok(&req.id, render_page(&page)),
        Err(e) => {
            tracing::debug!(action = %screen_req.action, error = %e, "scales.manage rejected");
            error_response(&req.id, e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scales.manage" => Some(handle_scales_manage(state, req)),
        _ => None,
    }
}
