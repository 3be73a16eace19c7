use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "gradescale.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    apply_schema(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema, for unit tests.
#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    apply_schema(&conn)?;
    Ok(conn)
}

fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_scales(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            letter TEXT NOT NULL,
            min_percentage REAL NOT NULL,
            max_percentage REAL NOT NULL,
            grade_points REAL NOT NULL,
            quality TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL DEFAULT 0,
            time_created INTEGER NOT NULL,
            time_modified INTEGER NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_scales_school ON grade_scales(school_id)",
        [],
    )?;

    // Existing workspaces may predate the quality column. Add if needed.
    ensure_grade_scales_quality(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_scales_school_sort
         ON grade_scales(school_id, sort_order, id)",
        [],
    )?;

    Ok(())
}

fn ensure_grade_scales_quality(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grade_scales", "quality")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE grade_scales ADD COLUMN quality TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
