use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

/// Parent scope: owns a collection of grade scales. Created and removed by
/// the schools admin surface; the scale screen only ever reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct School {
    pub id: i64,
    pub name: String,
}

/// One row of a school's grade scale table.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    pub id: i64,
    pub school_id: i64,
    pub letter: String,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub grade_points: f64,
    pub quality: String,
    pub sort_order: i64,
    pub time_created: i64,
    pub time_modified: i64,
}

/// Scale attributes without identity or timestamps; what a form submits.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDraft {
    pub letter: String,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub grade_points: f64,
    pub quality: String,
    pub sort_order: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: i64 },
}

/// Storage collaborator for the scale screen. Lookups come in two flavors:
/// `school`/`scale` return `None` on absence, `require_*` treat absence as a
/// hard error.
pub trait Store {
    fn schools(&self) -> Result<Vec<School>, StoreError>;
    fn school(&self, id: i64) -> Result<Option<School>, StoreError>;
    fn require_school(&self, id: i64) -> Result<School, StoreError>;
    fn scale(&self, id: i64) -> Result<Option<GradeScale>, StoreError>;
    fn require_scale(&self, id: i64) -> Result<GradeScale, StoreError>;
    /// All scales for one school, ordered by (sort_order ASC, id ASC).
    fn scales_for_school(&self, school_id: i64) -> Result<Vec<GradeScale>, StoreError>;
    fn insert_scale(
        &self,
        school_id: i64,
        draft: &ScaleDraft,
        stamp: i64,
    ) -> Result<i64, StoreError>;
    fn update_scale(&self, id: i64, draft: &ScaleDraft, stamp: i64) -> Result<(), StoreError>;
    /// Deleting an id that no longer exists is a no-op, not an error.
    fn delete_scale(&self, id: i64) -> Result<(), StoreError>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn scale_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GradeScale> {
    Ok(GradeScale {
        id: row.get(0)?,
        school_id: row.get(1)?,
        letter: row.get(2)?,
        min_percentage: row.get(3)?,
        max_percentage: row.get(4)?,
        grade_points: row.get(5)?,
        quality: row.get(6)?,
        sort_order: row.get(7)?,
        time_created: row.get(8)?,
        time_modified: row.get(9)?,
    })
}

const SCALE_COLS: &str = "id, school_id, letter, min_percentage, max_percentage, \
     grade_points, quality, sort_order, time_created, time_modified";

impl Store for SqliteStore<'_> {
    fn schools(&self) -> Result<Vec<School>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM schools ORDER BY name, id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(School {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn school(&self, id: i64) -> Result<Option<School>, StoreError> {
        let row = self
            .conn
            .query_row("SELECT id, name FROM schools WHERE id = ?", [id], |row| {
                Ok(School {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn require_school(&self, id: i64) -> Result<School, StoreError> {
        self.school(id)?.ok_or(StoreError::Missing {
            entity: "school",
            id,
        })
    }

    fn scale(&self, id: i64) -> Result<Option<GradeScale>, StoreError> {
        let sql = format!("SELECT {} FROM grade_scales WHERE id = ?", SCALE_COLS);
        let row = self
            .conn
            .query_row(&sql, [id], scale_from_row)
            .optional()?;
        Ok(row)
    }

    fn require_scale(&self, id: i64) -> Result<GradeScale, StoreError> {
        self.scale(id)?.ok_or(StoreError::Missing {
            entity: "grade scale",
            id,
        })
    }

    fn scales_for_school(&self, school_id: i64) -> Result<Vec<GradeScale>, StoreError> {
        let sql = format!(
            "SELECT {} FROM grade_scales WHERE school_id = ? ORDER BY sort_order, id",
            SCALE_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([school_id], scale_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_scale(
        &self,
        school_id: i64,
        draft: &ScaleDraft,
        stamp: i64,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO grade_scales(
                school_id, letter, min_percentage, max_percentage,
                grade_points, quality, sort_order, time_created, time_modified
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                school_id,
                &draft.letter,
                draft.min_percentage,
                draft.max_percentage,
                draft.grade_points,
                &draft.quality,
                draft.sort_order,
                stamp,
                stamp,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_scale(&self, id: i64, draft: &ScaleDraft, stamp: i64) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE grade_scales
             SET letter = ?, min_percentage = ?, max_percentage = ?,
                 grade_points = ?, quality = ?, sort_order = ?, time_modified = ?
             WHERE id = ?",
            (
                &draft.letter,
                draft.min_percentage,
                draft.max_percentage,
                draft.grade_points,
                &draft.quality,
                draft.sort_order,
                stamp,
                id,
            ),
        )?;
        if changed == 0 {
            return Err(StoreError::Missing {
                entity: "grade scale",
                id,
            });
        }
        Ok(())
    }

    fn delete_scale(&self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM grade_scales WHERE id = ?", [id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn draft(letter: &str, sort_order: i64) -> ScaleDraft {
        ScaleDraft {
            letter: letter.to_string(),
            min_percentage: 80.0,
            max_percentage: 89.99,
            grade_points: 3.0,
            quality: "Good".to_string(),
            sort_order,
        }
    }

    fn school(conn: &Connection, name: &str) -> i64 {
        conn.execute("INSERT INTO schools(name) VALUES(?)", [name])
            .expect("insert school");
        conn.last_insert_rowid()
    }

    #[test]
    fn insert_stamps_both_timestamps() {
        let conn = db::open_in_memory().expect("db");
        let store = SqliteStore::new(&conn);
        let sid = school(&conn, "Northside");

        let id = store.insert_scale(sid, &draft("B", 1), 1_000).expect("insert");
        let row = store.require_scale(id).expect("fetch");
        assert_eq!(row.time_created, 1_000);
        assert_eq!(row.time_modified, 1_000);
        assert_eq!(row.school_id, sid);
        assert_eq!(row.letter, "B");
    }

    #[test]
    fn update_preserves_time_created() {
        let conn = db::open_in_memory().expect("db");
        let store = SqliteStore::new(&conn);
        let sid = school(&conn, "Northside");

        let id = store.insert_scale(sid, &draft("B", 1), 1_000).expect("insert");
        store
            .update_scale(id, &draft("B+", 1), 2_000)
            .expect("update");
        let row = store.require_scale(id).expect("fetch");
        assert_eq!(row.time_created, 1_000);
        assert_eq!(row.time_modified, 2_000);
        assert_eq!(row.letter, "B+");
    }

    #[test]
    fn update_missing_row_is_an_error() {
        let conn = db::open_in_memory().expect("db");
        let store = SqliteStore::new(&conn);
        let err = store.update_scale(99, &draft("A", 0), 1_000).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Missing {
                entity: "grade scale",
                id: 99
            }
        ));
    }

    #[test]
    fn delete_missing_row_is_a_no_op() {
        let conn = db::open_in_memory().expect("db");
        let store = SqliteStore::new(&conn);
        store.delete_scale(42).expect("delete of absent row");
    }

    #[test]
    fn list_orders_by_sort_order_then_id() {
        let conn = db::open_in_memory().expect("db");
        let store = SqliteStore::new(&conn);
        let sid = school(&conn, "Northside");

        let a = store.insert_scale(sid, &draft("A", 3), 10).expect("a");
        let b = store.insert_scale(sid, &draft("B", 1), 10).expect("b");
        let c = store.insert_scale(sid, &draft("C", 2), 10).expect("c");
        // Tie on sort_order resolves by id.
        let d = store.insert_scale(sid, &draft("D", 2), 10).expect("d");

        let ids: Vec<i64> = store
            .scales_for_school(sid)
            .expect("list")
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![b, c, d, a]);
    }

    #[test]
    fn require_school_reports_missing_id() {
        let conn = db::open_in_memory().expect("db");
        let store = SqliteStore::new(&conn);
        let err = store.require_school(7).unwrap_err();
        assert_eq!(err.to_string(), "school 7 not found");
    }
}
