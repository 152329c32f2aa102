//! In-memory collaborators for crawler tests

use crate::aggregate::{Finding, Severity};
use crate::crawler::evaluator::{EvaluationError, RuleEvaluator};
use crate::crawler::renderer::{
    NavigationError, RenderSession, RenderedPage, Renderer, VisitOptions,
};
use crate::ScanError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

type Handler = dyn Fn(&Url) -> Result<RenderedPage, NavigationError> + Send + Sync;

/// Renderer answering from a closure and recording every visit
#[derive(Clone)]
pub(crate) struct FakeRenderer {
    handler: Arc<Handler>,
    pub visits: Arc<Mutex<Vec<String>>>,
    /// Options received with each visit, in visit order
    pub options: Arc<Mutex<Vec<VisitOptions>>>,
    pub sessions_opened: Arc<AtomicUsize>,
    pub sessions_closed: Arc<AtomicUsize>,
}

impl FakeRenderer {
    pub fn new(
        handler: impl Fn(&Url) -> Result<RenderedPage, NavigationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            visits: Arc::new(Mutex::new(Vec::new())),
            options: Arc::new(Mutex::new(Vec::new())),
            sessions_opened: Arc::new(AtomicUsize::new(0)),
            sessions_closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every page links to two fresh pages, forever
    pub fn infinite() -> Self {
        Self::new(|url| {
            let path = url.path().trim_end_matches('/');
            Ok(html(
                url,
                &format!(r#"<a href="{0}/l">l</a><a href="{0}/r">r</a>"#, path),
            ))
        })
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub fn options(&self) -> Vec<VisitOptions> {
        self.options.lock().unwrap().clone()
    }
}

/// A 200 text/html page
pub(crate) fn html(url: &Url, body: &str) -> RenderedPage {
    RenderedPage {
        http_status: 200,
        final_url: url.clone(),
        content_type: "text/html; charset=utf-8".to_string(),
        dom: format!("<html><body>{}</body></html>", body),
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, ScanError> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            renderer: self.clone(),
        }))
    }
}

struct FakeSession {
    renderer: FakeRenderer,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn visit(
        &mut self,
        url: &Url,
        options: &VisitOptions,
    ) -> Result<RenderedPage, NavigationError> {
        self.renderer.visits.lock().unwrap().push(url.to_string());
        self.renderer.options.lock().unwrap().push(options.clone());
        tokio::task::yield_now().await;
        (self.renderer.handler)(url)
    }

    async fn close(&mut self) {
        self.renderer.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns the same findings for every page
#[derive(Default)]
pub(crate) struct FixedEvaluator {
    pub findings: Vec<Finding>,
    pub calls: AtomicUsize,
    /// Fail this many calls before succeeding
    pub fail_first: usize,
}

impl FixedEvaluator {
    pub fn with(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RuleEvaluator for FixedEvaluator {
    async fn evaluate(&self, _url: &Url, _dom: &str) -> Result<Vec<Finding>, EvaluationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(EvaluationError::Exit {
                status: "exit status: 1".to_string(),
                stderr: "evaluator crashed".to_string(),
            });
        }
        Ok(self.findings.clone())
    }
}

pub(crate) fn finding(rule: &str, severity: Severity) -> Finding {
    Finding {
        rule_id: rule.to_string(),
        severity,
        wcag_tags: ["wcag2aa".to_string()].into_iter().collect(),
        html_snippet: format!("<div class=\"{}\"></div>", rule),
        help_url: format!("https://rules.example/{}", rule),
        page_url: String::new(),
        description: None,
    }
}
