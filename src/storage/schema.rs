//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Lens database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per scan
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    seed_url TEXT NOT NULL,
    scan_type TEXT NOT NULL,
    strategy TEXT,
    status TEXT NOT NULL,
    abort_reason TEXT,
    error_message TEXT,
    config_hash TEXT NOT NULL,
    duplicates INTEGER NOT NULL DEFAULT 0,
    critical INTEGER NOT NULL DEFAULT 0,
    serious INTEGER NOT NULL DEFAULT 0,
    moderate INTEGER NOT NULL DEFAULT 0,
    minor INTEGER NOT NULL DEFAULT 0
);

-- Page dataset in scan order
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scans(id),
    scan_order INTEGER NOT NULL,
    url TEXT NOT NULL,
    final_url TEXT,
    state TEXT NOT NULL,
    source TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    http_status INTEGER,
    error_message TEXT,
    findings INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    UNIQUE(scan_id, scan_order)
);

CREATE INDEX IF NOT EXISTS idx_pages_scan ON pages(scan_id);

-- Archived frontier: every URL the scan touched, including invalid ones
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scans(id),
    url TEXT NOT NULL,
    state TEXT NOT NULL,
    source TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    discovered_order INTEGER,
    detail TEXT,
    http_status INTEGER,
    UNIQUE(scan_id, url)
);

CREATE INDEX IF NOT EXISTS idx_urls_state ON urls(scan_id, state);

-- Deduplicated issues
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scans(id),
    fingerprint TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    wcag_tags TEXT NOT NULL,
    help_url TEXT NOT NULL,
    html_snippet TEXT NOT NULL,
    description TEXT,
    first_seen TEXT NOT NULL,
    UNIQUE(scan_id, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_issues_severity ON issues(scan_id, severity);

-- Pages each issue was seen on
CREATE TABLE IF NOT EXISTS occurrences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL REFERENCES issues(id),
    page_url TEXT NOT NULL,
    seq INTEGER NOT NULL,
    UNIQUE(issue_id, page_url)
);

CREATE INDEX IF NOT EXISTS idx_occurrences_page ON occurrences(page_url);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["scans", "pages", "urls", "issues", "occurrences"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
