//! The grade-scale admin screen: one entry point that classifies each
//! request by `action`/`confirm` and answers with a view model or a
//! redirect. Mutations require the session key; a successful write is always
//! answered with a redirect so a refresh can never resubmit the form.

use thiserror::Error;

use crate::session::SessionKey;
use crate::store::{GradeScale, ScaleDraft, School, Store, StoreError};

pub trait Clock {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    List,
    Add,
    Edit,
    Delete,
}

impl Action {
    fn parse(raw: &str) -> Result<Self, ScreenError> {
        match raw {
            "" => Ok(Self::List),
            "add" => Ok(Self::Add),
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            other => Err(ScreenError::UnknownAction(other.to_string())),
        }
    }
}

/// What the form-processing collaborator reported for this request.
#[derive(Debug, Clone)]
pub enum FormOutcome {
    /// No submission: the caller wants the form displayed.
    NotSubmitted,
    /// The user backed out; redirect with no write and no notice.
    Cancelled,
    /// Submitted attribute values, not yet validated.
    Submitted(ScaleDraft),
}

#[derive(Debug, Clone)]
pub struct ScreenRequest {
    pub action: String,
    pub id: Option<i64>,
    pub school_id: Option<i64>,
    pub confirm: bool,
    pub sesskey: Option<String>,
    pub form: FormOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Added,
    Updated,
    Deleted,
}

impl Notice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// View models handed to the rendering side. Navigation intents (the confirm
/// link's parameters, the redirect target) are plain data.
#[derive(Debug)]
pub enum Page {
    SchoolPicker {
        schools: Vec<School>,
    },
    ScaleList {
        school: School,
        rows: Vec<GradeScale>,
    },
    ScaleForm {
        school: School,
        existing: Option<GradeScale>,
    },
    DeleteConfirm {
        school: School,
        scale: GradeScale,
    },
    Redirect {
        school_id: i64,
        notice: Option<Notice>,
    },
}

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("invalid session key")]
    BadSessionKey,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ScaleScreen<'a, S: Store, C: Clock> {
    store: &'a S,
    session: &'a SessionKey,
    clock: &'a C,
}

impl<'a, S: Store, C: Clock> ScaleScreen<'a, S, C> {
    pub fn new(store: &'a S, session: &'a SessionKey, clock: &'a C) -> Self {
        Self {
            store,
            session,
            clock,
        }
    }

    pub fn handle(&self, req: &ScreenRequest) -> Result<Page, ScreenError> {
        match Action::parse(&req.action)? {
            Action::List => self.list(req),
            Action::Add | Action::Edit => self.form_flow(req),
            Action::Delete => self.delete(req),
        }
    }

    fn authorize(&self, req: &ScreenRequest) -> Result<(), ScreenError> {
        if self.session.matches(req.sesskey.as_deref()) {
            Ok(())
        } else {
            Err(ScreenError::BadSessionKey)
        }
    }

    fn list(&self, req: &ScreenRequest) -> Result<Page, ScreenError> {
        let Some(school_id) = req.school_id else {
            return Ok(Page::SchoolPicker {
                schools: self.store.schools()?,
            });
        };
        let school = self.store.require_school(school_id)?;
        let rows = self.store.scales_for_school(school_id)?;
        Ok(Page::ScaleList { school, rows })
    }

    fn form_flow(&self, req: &ScreenRequest) -> Result<Page, ScreenError> {
        // Writes are authorized before any row is read, so an invalid key
        // cannot probe which ids exist.
        if matches!(req.form, FormOutcome::Submitted(_)) {
            self.authorize(req)?;
        }

        // An id always targets an existing row; otherwise this is a fresh
        // add and the owning school must be named.
        let existing = match req.id {
            Some(id) => Some(self.store.require_scale(id)?),
            None => None,
        };
        let school = match &existing {
            Some(scale) => self.store.require_school(scale.school_id)?,
            None => {
                let school_id = req
                    .school_id
                    .ok_or(ScreenError::MissingParam("schoolId"))?;
                self.store.require_school(school_id)?
            }
        };

        match &req.form {
            FormOutcome::NotSubmitted => Ok(Page::ScaleForm { school, existing }),
            FormOutcome::Cancelled => Ok(Page::Redirect {
                school_id: school.id,
                notice: None,
            }),
            FormOutcome::Submitted(draft) => {
                let draft = validate_draft(draft)?;
                let now = self.clock.now_ms();
                let notice = match &existing {
                    Some(scale) => {
                        self.store.update_scale(scale.id, &draft, now)?;
                        Notice::Updated
                    }
                    None => {
                        self.store.insert_scale(school.id, &draft, now)?;
                        Notice::Added
                    }
                };
                Ok(Page::Redirect {
                    school_id: school.id,
                    notice: Some(notice),
                })
            }
        }
    }

    fn delete(&self, req: &ScreenRequest) -> Result<Page, ScreenError> {
        self.authorize(req)?;
        let id = req.id.ok_or(ScreenError::MissingParam("id"))?;

        if !req.confirm {
            let scale = self.store.require_scale(id)?;
            let school = self.store.require_school(scale.school_id)?;
            return Ok(Page::DeleteConfirm { school, scale });
        }

        // Confirmed: delete unconditionally. A row that vanished in the
        // meantime still gets the redirect and the notice; the screen's
        // links carry schoolId so the redirect target survives that case.
        let school_id = match self.store.scale(id)? {
            Some(scale) => scale.school_id,
            None => req
                .school_id
                .ok_or(ScreenError::MissingParam("schoolId"))?,
        };
        self.store.delete_scale(id)?;
        Ok(Page::Redirect {
            school_id,
            notice: Some(Notice::Deleted),
        })
    }
}

fn validate_draft(draft: &ScaleDraft) -> Result<ScaleDraft, ScreenError> {
    let letter = draft.letter.trim().to_string();
    if letter.is_empty() {
        return Err(ScreenError::InvalidField {
            field: "letter",
            reason: "must not be empty",
        });
    }
    // NaN bounds fail this comparison too.
    if !(draft.min_percentage <= draft.max_percentage) {
        return Err(ScreenError::InvalidField {
            field: "minPercentage",
            reason: "must not exceed maxPercentage",
        });
    }
    Ok(ScaleDraft {
        letter,
        ..draft.clone()
    })
}
