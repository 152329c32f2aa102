//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::aggregate::{AggregatedIssue, Occurrence, Severity, SeverityCounts};
use crate::config::ScanType;
use crate::state::{DiscoverySource, PageRecord, ScanReport, UrlState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunStatus, ScanRecord, UrlCounts};
use crate::ScanError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Pseudo-state for archived URLs that never canonicalized
const INVALID_STATE: &str = "invalid";

const SCAN_COLUMNS: &str = "id, started_at, finished_at, seed_url, scan_type, strategy, status, \
     abort_reason, error_message, config_hash, duplicates, critical, serious, moderate, minor";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> Result<Self, ScanError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ScanError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRecord> {
        Ok(ScanRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            seed_url: row.get(3)?,
            scan_type: row.get(4)?,
            strategy: row.get(5)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
                .unwrap_or(RunStatus::Running),
            abort_reason: row.get(7)?,
            error_message: row.get(8)?,
            config_hash: row.get(9)?,
            duplicates: row.get::<_, i64>(10)? as u64,
            counts: SeverityCounts {
                critical: row.get::<_, i64>(11)? as u64,
                serious: row.get::<_, i64>(12)? as u64,
                moderate: row.get::<_, i64>(13)? as u64,
                minor: row.get::<_, i64>(14)? as u64,
            },
        })
    }
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

impl Storage for SqliteStorage {
    // ===== Scan Management =====

    fn create_scan(
        &mut self,
        seed_url: &str,
        scan_type: ScanType,
        config_hash: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO scans (started_at, seed_url, scan_type, status, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now,
                seed_url,
                scan_type.as_str(),
                RunStatus::Running.to_db_string(),
                config_hash
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_scan(&self, scan_id: i64) -> StorageResult<ScanRecord> {
        let sql = format!("SELECT {} FROM scans WHERE id = ?1", SCAN_COLUMNS);
        self.conn
            .query_row(&sql, params![scan_id], Self::scan_from_row)
            .optional()?
            .ok_or(StorageError::ScanNotFound(scan_id))
    }

    fn get_latest_scan(&self) -> StorageResult<Option<ScanRecord>> {
        let sql = format!("SELECT {} FROM scans ORDER BY id DESC LIMIT 1", SCAN_COLUMNS);
        let scan = self
            .conn
            .query_row(&sql, [], Self::scan_from_row)
            .optional()?;
        Ok(scan)
    }

    fn fail_scan(&mut self, scan_id: i64, message: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE scans SET status = ?1, finished_at = ?2, error_message = ?3 WHERE id = ?4",
            params![RunStatus::Failed.to_db_string(), now, message, scan_id],
        )?;
        if updated == 0 {
            return Err(StorageError::ScanNotFound(scan_id));
        }
        Ok(())
    }

    fn save_report(&mut self, scan_id: i64, report: &ScanReport) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let status = if report.is_aborted() {
            RunStatus::Aborted
        } else {
            RunStatus::Completed
        };
        let counts = report.severity_counts;
        let updated = tx.execute(
            "UPDATE scans SET finished_at = ?1, strategy = ?2, status = ?3, abort_reason = ?4,
                 duplicates = ?5, critical = ?6, serious = ?7, moderate = ?8, minor = ?9
             WHERE id = ?10",
            params![
                report.end_time.to_rfc3339(),
                report.strategy.as_str(),
                status.to_db_string(),
                report.abort.map(|reason| reason.to_string()),
                report.duplicates as i64,
                counts.critical as i64,
                counts.serious as i64,
                counts.moderate as i64,
                counts.minor as i64,
                scan_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::ScanNotFound(scan_id));
        }

        {
            let mut insert_page = tx.prepare(
                "INSERT INTO pages (scan_id, scan_order, url, final_url, state, source, attempts,
                     http_status, error_message, findings, started_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for page in &report.pages {
                insert_page.execute(params![
                    scan_id,
                    page.order as i64,
                    page.url,
                    page.final_url,
                    page.outcome.to_db_string(),
                    page.source.as_str(),
                    page.attempts,
                    page.http_status,
                    page.error,
                    page.finding_count as i64,
                    page.started_at.to_rfc3339(),
                    page.finished_at.to_rfc3339(),
                ])?;
            }

            let mut insert_url = tx.prepare(
                "INSERT OR IGNORE INTO urls (scan_id, url, state, source, attempts,
                     discovered_order, detail, http_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in &report.records {
                insert_url.execute(params![
                    scan_id,
                    record.canonical_url,
                    record.state.to_db_string(),
                    record.discovered_from.as_str(),
                    record.attempts,
                    record.discovered_order as i64,
                    record.detail,
                    record.http_status,
                ])?;
            }
            for raw in &report.urls_crawled.invalid {
                insert_url.execute(params![
                    scan_id,
                    raw,
                    INVALID_STATE,
                    Option::<String>::None,
                    0,
                    Option::<i64>::None,
                    Option::<String>::None,
                    Option::<u16>::None,
                ])?;
            }

            let mut insert_issue = tx.prepare(
                "INSERT INTO issues (scan_id, fingerprint, rule_id, severity, wcag_tags, help_url,
                     html_snippet, description, first_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            let mut insert_occurrence = tx.prepare(
                "INSERT OR IGNORE INTO occurrences (issue_id, page_url, seq) VALUES (?1, ?2, ?3)",
            )?;
            for issue in &report.issues {
                let tags = serde_json::to_string(&issue.wcag_tags)?;
                insert_issue.execute(params![
                    scan_id,
                    issue.fingerprint,
                    issue.rule_id,
                    issue.severity.as_str(),
                    tags,
                    issue.help_url,
                    issue.html_snippet,
                    issue.description,
                    issue.first_seen.to_rfc3339(),
                ])?;
                let issue_id = tx.last_insert_rowid();

                for occurrence in &issue.occurrences {
                    insert_occurrence.execute(params![
                        issue_id,
                        occurrence.page_url,
                        occurrence.order as i64
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ===== Pages =====

    fn load_pages(&self, scan_id: i64) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT scan_order, url, final_url, state, source, attempts, http_status,
                    error_message, findings, started_at, finished_at
             FROM pages WHERE scan_id = ?1 ORDER BY scan_order",
        )?;

        let pages = stmt
            .query_map(params![scan_id], |row| {
                let state: String = row.get(3)?;
                let source: String = row.get(4)?;
                let started: String = row.get(9)?;
                let finished: String = row.get(10)?;
                Ok(PageRecord {
                    order: row.get::<_, i64>(0)? as u64,
                    url: row.get(1)?,
                    final_url: row.get(2)?,
                    outcome: UrlState::from_db_string(&state).unwrap_or(UrlState::Failed),
                    source: DiscoverySource::from_db_string(&source)
                        .unwrap_or(DiscoverySource::Domain),
                    attempts: row.get(5)?,
                    http_status: row.get(6)?,
                    error: row.get(7)?,
                    finding_count: row.get::<_, i64>(8)? as u64,
                    started_at: parse_time(&started),
                    finished_at: parse_time(&finished),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn count_urls(&self, scan_id: i64) -> StorageResult<UrlCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM urls WHERE scan_id = ?1 GROUP BY state")?;

        let mut counts = UrlCounts::default();
        let rows = stmt.query_map(params![scan_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        for row in rows {
            let (state, count) = row?;
            match (UrlState::from_db_string(&state), state.as_str()) {
                (Some(UrlState::Scanned), _) => counts.scanned += count,
                (Some(UrlState::Failed), _) => counts.failed += count,
                (Some(UrlState::Excluded), _) => counts.excluded += count,
                (Some(UrlState::Queued | UrlState::InProgress), _) => counts.queued += count,
                (None, INVALID_STATE) => counts.invalid += count,
                (None, other) => {
                    return Err(StorageError::Database(format!(
                        "unknown url state '{}'",
                        other
                    )))
                }
            }
        }

        Ok(counts)
    }

    // ===== Issues =====

    fn load_issues(&self, scan_id: i64) -> StorageResult<Vec<AggregatedIssue>> {
        let mut occurrences: HashMap<i64, Vec<Occurrence>> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT o.issue_id, o.page_url, o.seq FROM occurrences o
                 JOIN issues i ON i.id = o.issue_id
                 WHERE i.scan_id = ?1 ORDER BY o.seq",
            )?;
            let rows = stmt.query_map(params![scan_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Occurrence {
                        page_url: row.get(1)?,
                        order: row.get::<_, i64>(2)? as u64,
                    },
                ))
            })?;
            for row in rows {
                let (issue_id, occurrence) = row?;
                occurrences.entry(issue_id).or_default().push(occurrence);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, fingerprint, rule_id, severity, wcag_tags, help_url, html_snippet,
                    description, first_seen
             FROM issues WHERE scan_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![scan_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut issues = Vec::with_capacity(rows.len());
        for (id, fingerprint, rule_id, severity, tags, help_url, snippet, description, first_seen) in
            rows
        {
            let severity = Severity::from_db_string(&severity).ok_or_else(|| {
                StorageError::Database(format!("unknown severity '{}'", severity))
            })?;
            let wcag_tags: BTreeSet<String> = serde_json::from_str(&tags)?;
            issues.push(AggregatedIssue::restore(
                fingerprint,
                rule_id,
                severity,
                wcag_tags,
                help_url,
                snippet,
                description,
                occurrences.remove(&id).unwrap_or_default(),
                parse_time(&first_seen),
            ));
        }

        crate::aggregate::sort_issues(&mut issues);
        Ok(issues)
    }

    fn severity_counts(&self, scan_id: i64) -> StorageResult<SeverityCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT i.severity, COUNT(o.id) FROM issues i
             JOIN occurrences o ON o.issue_id = i.id
             WHERE i.scan_id = ?1 GROUP BY i.severity",
        )?;

        let mut counts = SeverityCounts::default();
        let rows = stmt.query_map(params![scan_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (severity, count) = row?;
            if let Some(severity) = Severity::from_db_string(&severity) {
                counts.add(severity, count);
            }
        }
        Ok(counts)
    }

    fn top_pages(&self, scan_id: i64, limit: usize) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.page_url, COUNT(*) AS n FROM occurrences o
             JOIN issues i ON i.id = o.issue_id
             WHERE i.scan_id = ?1
             GROUP BY o.page_url
             ORDER BY n DESC, o.page_url ASC
             LIMIT ?2",
        )?;

        let pages = stmt
            .query_map(params![scan_id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AbortReason, Finding, PageVisitResult, SeverityBucket, VisitStatus};
    use crate::config::ThresholdConfig;
    use crate::frontier::UrlRecord;
    use crate::state::ScanSession;

    fn finding(rule: &str, severity: Severity, snippet: &str) -> Finding {
        Finding {
            rule_id: rule.to_string(),
            severity,
            wcag_tags: ["wcag2a".to_string(), "wcag111".to_string()]
                .into_iter()
                .collect(),
            html_snippet: snippet.to_string(),
            help_url: format!("https://rules.example/{}", rule),
            page_url: String::new(),
            description: Some("Images must have alternate text".to_string()),
        }
    }

    fn record(url: &str, state: UrlState) -> UrlRecord {
        UrlRecord {
            canonical_url: url.to_string(),
            state,
            discovered_from: DiscoverySource::Domain,
            attempts: 1,
            discovered_order: 0,
            detail: None,
            http_status: Some(200),
        }
    }

    fn sample_report() -> ScanReport {
        let session = ScanSession::new(
            "https://example.com/",
            ScanType::Website,
            ThresholdConfig::default(),
        );
        let now = Utc::now();

        for (url, findings) in [
            (
                "https://example.com/",
                vec![
                    finding("image-alt", Severity::Critical, "<img src=a>"),
                    finding("color-contrast", Severity::Serious, "<p>low</p>"),
                ],
            ),
            (
                "https://example.com/about",
                vec![finding("image-alt", Severity::Critical, "<img src=a>")],
            ),
        ] {
            let r = record(url, UrlState::InProgress);
            let count = findings.len() as u64;
            session.merge_page(&PageVisitResult {
                url: url.to_string(),
                status: VisitStatus::Http { status: 200 },
                findings: findings
                    .into_iter()
                    .map(|mut f| {
                        f.page_url = url.to_string();
                        f
                    })
                    .collect(),
                started_at: now,
                finished_at: now,
            });
            session.record_page(&r, UrlState::Scanned, None, Some(200), None, count, now, now);
        }

        session.finish(
            vec![
                record("https://example.com/", UrlState::Scanned),
                record("https://example.com/about", UrlState::Scanned),
                record("https://example.com/logo.png", UrlState::Excluded),
            ],
            vec!["http://[bad".to_string()],
            4,
        )
    }

    #[test]
    fn test_create_and_get_scan() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_scan("https://example.com/", ScanType::Intelligent, "abc")
            .unwrap();

        let scan = storage.get_scan(id).unwrap();
        assert_eq!(scan.status, RunStatus::Running);
        assert_eq!(scan.scan_type, "intelligent");
        assert_eq!(scan.config_hash, "abc");
        assert!(scan.finished_at.is_none());

        let latest = storage.get_latest_scan().unwrap().unwrap();
        assert_eq!(latest.id, id);
    }

    #[test]
    fn test_missing_scan() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_scan(42),
            Err(StorageError::ScanNotFound(42))
        ));
        assert!(storage.fail_scan(42, "boom").is_err());
        assert!(storage.get_latest_scan().unwrap().is_none());
    }

    #[test]
    fn test_fail_scan() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        storage.fail_scan(id, "renderer unavailable").unwrap();

        let scan = storage.get_scan(id).unwrap();
        assert_eq!(scan.status, RunStatus::Failed);
        assert_eq!(scan.error_message.as_deref(), Some("renderer unavailable"));
    }

    #[test]
    fn test_save_report_round_trip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        let report = sample_report();
        storage.save_report(id, &report).unwrap();

        let scan = storage.get_scan(id).unwrap();
        assert_eq!(scan.status, RunStatus::Completed);
        assert_eq!(scan.duplicates, 4);
        assert_eq!(scan.counts, report.severity_counts);
        assert_eq!(scan.strategy.as_deref(), Some("domain"));

        let pages = storage.load_pages(id).unwrap();
        assert_eq!(pages, report.pages);

        let issues = storage.load_issues(id).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].rule_id, "image-alt");
        assert_eq!(issues[0].occurrence_count(), 2);
        assert_eq!(issues[0].wcag_tags.len(), 2);
        assert_eq!(
            issues[0].description.as_deref(),
            Some("Images must have alternate text")
        );

        // Stored occurrences reproduce the in-memory counts
        assert_eq!(storage.severity_counts(id).unwrap(), report.severity_counts);

        let counts = storage.count_urls(id).unwrap();
        assert_eq!(counts.scanned, 2);
        assert_eq!(counts.excluded, 1);
        assert_eq!(counts.invalid, 1);
    }

    #[test]
    fn test_top_pages() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        storage.save_report(id, &sample_report()).unwrap();

        let top = storage.top_pages(id, 5).unwrap();
        assert_eq!(
            top,
            vec![
                ("https://example.com/".to_string(), 2),
                ("https://example.com/about".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_aborted_scan_status() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        let mut report = sample_report();
        report.abort = Some(AbortReason {
            bucket: SeverityBucket::MustFix,
            count: 3,
            limit: 2,
        });
        storage.save_report(id, &report).unwrap();

        let scan = storage.get_scan(id).unwrap();
        assert_eq!(scan.status, RunStatus::Aborted);
        assert_eq!(
            scan.abort_reason.as_deref(),
            Some("mustFix occurrences found: 3 > 2")
        );
    }

    #[test]
    fn test_scans_are_isolated() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        let second = storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        storage.save_report(first, &sample_report()).unwrap();

        assert!(storage.load_issues(second).unwrap().is_empty());
        assert!(storage.load_pages(second).unwrap().is_empty());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scan.db");
        let mut storage = SqliteStorage::new(&path).unwrap();
        storage
            .create_scan("https://example.com/", ScanType::Website, "h")
            .unwrap();
        assert!(path.exists());
    }
}
