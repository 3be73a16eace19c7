use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::session::SessionKey;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: SessionKey,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            session: SessionKey::issue(),
        }
    }
}
