//! Merges per-page findings into one deduplicated issue set

use crate::aggregate::finding::{normalize_snippet, Finding, PageVisitResult, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

/// Occurrence counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub serious: u64,
    pub moderate: u64,
    pub minor: u64,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Serious => self.serious,
            Severity::Moderate => self.moderate,
            Severity::Minor => self.minor,
        }
    }

    fn slot(&mut self, severity: Severity) -> &mut u64 {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::Serious => &mut self.serious,
            Severity::Moderate => &mut self.moderate,
            Severity::Minor => &mut self.minor,
        }
    }

    pub fn add(&mut self, severity: Severity, n: u64) {
        *self.slot(severity) += n;
    }

    pub fn subtract(&mut self, severity: Severity, n: u64) {
        let slot = self.slot(severity);
        *slot = slot.saturating_sub(n);
    }

    /// critical + serious
    pub fn must_fix(&self) -> u64 {
        self.critical + self.serious
    }

    /// moderate + minor
    pub fn good_to_fix(&self) -> u64 {
        self.moderate + self.minor
    }

    pub fn total(&self) -> u64 {
        self.must_fix() + self.good_to_fix()
    }
}

/// One page an issue was found on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub page_url: String,
    /// Global merge sequence number
    pub order: u64,
}

/// An issue seen on one or more pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedIssue {
    pub fingerprint: String,
    pub rule_id: String,
    pub severity: Severity,
    pub wcag_tags: BTreeSet<String>,
    pub help_url: String,
    pub html_snippet: String,
    pub description: Option<String>,
    pub occurrences: Vec<Occurrence>,
    pub first_seen: DateTime<Utc>,
    #[serde(skip)]
    pages: HashSet<String>,
}

impl AggregatedIssue {
    fn new(fingerprint: String, finding: &Finding, seen_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            rule_id: finding.rule_id.clone(),
            severity: finding.severity,
            wcag_tags: finding.conformance_tags(),
            help_url: finding.help_url.clone(),
            html_snippet: normalize_snippet(&finding.html_snippet),
            description: finding.description.clone(),
            occurrences: Vec::new(),
            first_seen: seen_at,
            pages: HashSet::new(),
        }
    }

    /// Rebuilds an issue loaded from storage
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        fingerprint: String,
        rule_id: String,
        severity: Severity,
        wcag_tags: BTreeSet<String>,
        help_url: String,
        html_snippet: String,
        description: Option<String>,
        occurrences: Vec<Occurrence>,
        first_seen: DateTime<Utc>,
    ) -> Self {
        let pages = occurrences.iter().map(|o| o.page_url.clone()).collect();
        Self {
            fingerprint,
            rule_id,
            severity,
            wcag_tags,
            help_url,
            html_snippet,
            description,
            occurrences,
            first_seen,
            pages,
        }
    }

    pub fn occurrence_count(&self) -> u64 {
        self.occurrences.len() as u64
    }

    /// Distinct pages this issue appears on, sorted
    pub fn page_urls(&self) -> BTreeSet<String> {
        self.pages.iter().cloned().collect()
    }

    /// Folds descriptive fields from another finding of the same fingerprint.
    ///
    /// Every rule here is commutative so merge order does not matter.
    fn absorb(&mut self, finding: &Finding, seen_at: DateTime<Utc>) {
        self.wcag_tags.extend(finding.conformance_tags());
        if seen_at < self.first_seen {
            self.first_seen = seen_at;
        }
        if !finding.help_url.is_empty()
            && (self.help_url.is_empty() || finding.help_url < self.help_url)
        {
            self.help_url = finding.help_url.clone();
        }
        if let Some(desc) = &finding.description {
            match &self.description {
                Some(current) if current <= desc => {}
                _ => self.description = Some(desc.clone()),
            }
        }
    }
}

/// Result of merging one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub new_issues: u64,
    pub new_occurrences: u64,
    /// Cumulative counts right after this merge
    pub counts: SeverityCounts,
}

#[derive(Debug, Default)]
struct AggregatorState {
    issues: HashMap<String, AggregatedIssue>,
    counts: SeverityCounts,
    next_order: u64,
    ignored: u64,
}

/// Canonical issue set for one scan
///
/// Safe to share between workers; merges are serialized internally.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the findings of one page visit
    ///
    /// A finding whose (page, rule, snippet) is already recorded is a no-op,
    /// so replaying a page does not inflate counts.
    pub fn merge(&self, result: &PageVisitResult) -> MergeOutcome {
        self.merge_then(result, |_| ()).0
    }

    /// Merges one page, then runs `after` on the new counts before the lock
    /// is released
    ///
    /// No other merge can land between the two, so `after` sees exactly the
    /// counts this page produced.
    pub fn merge_then<R>(
        &self,
        result: &PageVisitResult,
        after: impl FnOnce(&SeverityCounts) -> R,
    ) -> (MergeOutcome, R) {
        let mut state = self.lock();
        let mut outcome = MergeOutcome::default();

        for finding in &result.findings {
            if finding.is_ignored() {
                state.ignored += 1;
                continue;
            }

            let page_url = if finding.page_url.is_empty() {
                result.url.as_str()
            } else {
                finding.page_url.as_str()
            };
            let fingerprint = finding.fingerprint();

            let AggregatorState {
                issues,
                counts,
                next_order,
                ..
            } = &mut *state;
            let issue = issues.entry(fingerprint.clone()).or_insert_with(|| {
                outcome.new_issues += 1;
                AggregatedIssue::new(fingerprint, finding, result.started_at)
            });

            issue.absorb(finding, result.started_at);

            if finding.severity > issue.severity {
                let moved = issue.occurrence_count();
                counts.subtract(issue.severity, moved);
                counts.add(finding.severity, moved);
                issue.severity = finding.severity;
            }

            if issue.pages.insert(page_url.to_string()) {
                issue.occurrences.push(Occurrence {
                    page_url: page_url.to_string(),
                    order: *next_order,
                });
                counts.add(issue.severity, 1);
                outcome.new_occurrences += 1;
                *next_order += 1;
            }
        }

        outcome.counts = state.counts;
        let after = after(&outcome.counts);
        (outcome, after)
    }

    /// Current cumulative counts
    pub fn counts(&self) -> SeverityCounts {
        self.lock().counts
    }

    pub fn issue_count(&self) -> usize {
        self.lock().issues.len()
    }

    /// Number of findings dropped because their rule is ignored
    pub fn ignored_count(&self) -> u64 {
        self.lock().ignored
    }

    /// Snapshot of all issues, most severe first, then by rule and fingerprint
    pub fn issues(&self) -> Vec<AggregatedIssue> {
        let mut issues: Vec<AggregatedIssue> = self.lock().issues.values().cloned().collect();
        sort_issues(&mut issues);
        issues
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Orders issues most severe first, then by rule id and fingerprint
pub fn sort_issues(issues: &mut [AggregatedIssue]) {
    issues.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
}

/// Pages ranked by number of issue occurrences, highest first
pub fn top_pages(issues: &[AggregatedIssue], limit: usize) -> Vec<(String, u64)> {
    let mut per_page: HashMap<&str, u64> = HashMap::new();
    for issue in issues {
        for occurrence in &issue.occurrences {
            *per_page.entry(occurrence.page_url.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, u64)> = per_page
        .into_iter()
        .map(|(url, count)| (url.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::finding::VisitStatus;
    use chrono::TimeZone;

    fn finding(rule: &str, severity: Severity, snippet: &str, page: &str) -> Finding {
        Finding {
            rule_id: rule.to_string(),
            severity,
            wcag_tags: ["wcag2a".to_string(), "cat.text".to_string()]
                .into_iter()
                .collect(),
            html_snippet: snippet.to_string(),
            help_url: format!("https://rules.example/{}", rule),
            page_url: page.to_string(),
            description: None,
        }
    }

    fn visit(url: &str, findings: Vec<Finding>) -> PageVisitResult {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        PageVisitResult {
            url: url.to_string(),
            status: VisitStatus::Http { status: 200 },
            findings,
            started_at: at,
            finished_at: at,
        }
    }

    /// Order-free projection of the aggregate for equality checks
    fn projection(agg: &ResultAggregator) -> Vec<(String, Severity, BTreeSet<String>, BTreeSet<String>)> {
        agg.issues()
            .into_iter()
            .map(|i| {
                let pages = i.page_urls();
                (i.fingerprint, i.severity, i.wcag_tags, pages)
            })
            .collect()
    }

    #[test]
    fn test_merge_creates_and_appends() {
        let agg = ResultAggregator::new();

        let first = agg.merge(&visit(
            "https://x.com/a",
            vec![
                finding("image-alt", Severity::Critical, "<img src=1>", "https://x.com/a"),
                finding("label", Severity::Minor, "<input>", "https://x.com/a"),
            ],
        ));
        assert_eq!(first.new_issues, 2);
        assert_eq!(first.new_occurrences, 2);

        let second = agg.merge(&visit(
            "https://x.com/b",
            vec![finding("image-alt", Severity::Critical, "<img src=1>", "https://x.com/b")],
        ));
        assert_eq!(second.new_issues, 0);
        assert_eq!(second.new_occurrences, 1);
        assert_eq!(second.counts.critical, 2);
        assert_eq!(second.counts.minor, 1);
        assert_eq!(agg.issue_count(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let agg = ResultAggregator::new();
        let page = visit(
            "https://x.com/a",
            vec![
                finding("image-alt", Severity::Serious, "<img>", "https://x.com/a"),
                finding("region", Severity::Moderate, "<div>", "https://x.com/a"),
            ],
        );

        agg.merge(&page);
        let counts_once = agg.counts();
        let replay = agg.merge(&page);

        assert_eq!(replay.new_issues, 0);
        assert_eq!(replay.new_occurrences, 0);
        assert_eq!(agg.counts(), counts_once);
        assert_eq!(agg.counts().total(), 2);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = finding("image-alt", Severity::Critical, "<img>", "https://x.com/1");
        let b = finding("image-alt", Severity::Critical, "<img>", "https://x.com/2");
        let c = finding("link-name", Severity::Moderate, "<a></a>", "https://x.com/1");

        let permutations = [
            [&a, &b, &c],
            [&a, &c, &b],
            [&b, &a, &c],
            [&b, &c, &a],
            [&c, &a, &b],
            [&c, &b, &a],
        ];

        let mut reference = None;
        for perm in permutations {
            let agg = ResultAggregator::new();
            for f in perm {
                agg.merge(&visit(&f.page_url, vec![f.clone()]));
            }
            let snapshot = (projection(&agg), agg.counts());
            match &reference {
                None => reference = Some(snapshot),
                Some(expected) => assert_eq!(&snapshot, expected),
            }
        }
    }

    #[test]
    fn test_severity_counts_match_occurrences() {
        let agg = ResultAggregator::new();
        for page in ["https://x.com/1", "https://x.com/2", "https://x.com/3"] {
            agg.merge(&visit(
                page,
                vec![
                    finding("image-alt", Severity::Critical, "<img>", page),
                    finding("list", Severity::Minor, "<ul>", page),
                ],
            ));
        }

        let issues = agg.issues();
        let counts = agg.counts();
        for severity in Severity::ALL {
            let expected: u64 = issues
                .iter()
                .filter(|i| i.severity == severity)
                .map(|i| i.occurrence_count())
                .sum();
            assert_eq!(counts.get(severity), expected);
        }
        assert_eq!(counts.must_fix(), 3);
        assert_eq!(counts.good_to_fix(), 3);
    }

    #[test]
    fn test_severity_escalation_moves_counts() {
        let agg = ResultAggregator::new();
        agg.merge(&visit(
            "https://x.com/1",
            vec![finding("contrast", Severity::Moderate, "<p>", "https://x.com/1")],
        ));
        agg.merge(&visit(
            "https://x.com/2",
            vec![finding("contrast", Severity::Serious, "<p>", "https://x.com/2")],
        ));

        let counts = agg.counts();
        assert_eq!(counts.moderate, 0);
        assert_eq!(counts.serious, 2);
    }

    #[test]
    fn test_ignored_rule_not_merged() {
        let agg = ResultAggregator::new();
        let outcome = agg.merge(&visit(
            "https://x.com/",
            vec![finding("frame-tested", Severity::Critical, "<iframe>", "https://x.com/")],
        ));
        assert_eq!(outcome.new_issues, 0);
        assert_eq!(agg.ignored_count(), 1);
        assert_eq!(agg.counts().total(), 0);
    }

    #[test]
    fn test_page_url_falls_back_to_visit_url() {
        let agg = ResultAggregator::new();
        agg.merge(&visit(
            "https://x.com/page",
            vec![finding("image-alt", Severity::Minor, "<img>", "")],
        ));
        let issues = agg.issues();
        assert_eq!(issues[0].occurrences[0].page_url, "https://x.com/page");
    }

    #[test]
    fn test_conformance_tags_only() {
        let agg = ResultAggregator::new();
        agg.merge(&visit(
            "https://x.com/",
            vec![finding("image-alt", Severity::Minor, "<img>", "https://x.com/")],
        ));
        let tags = &agg.issues()[0].wcag_tags;
        assert!(tags.contains("wcag2a"));
        assert!(!tags.contains("cat.text"));
    }

    #[test]
    fn test_top_pages() {
        let agg = ResultAggregator::new();
        agg.merge(&visit(
            "https://x.com/busy",
            vec![
                finding("a", Severity::Minor, "<a>", "https://x.com/busy"),
                finding("b", Severity::Minor, "<b>", "https://x.com/busy"),
            ],
        ));
        agg.merge(&visit(
            "https://x.com/quiet",
            vec![finding("a", Severity::Minor, "<a>", "https://x.com/quiet")],
        ));

        let ranked = top_pages(&agg.issues(), 5);
        assert_eq!(ranked[0], ("https://x.com/busy".to_string(), 2));
        assert_eq!(ranked[1], ("https://x.com/quiet".to_string(), 1));
    }
}
