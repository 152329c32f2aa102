//! Rule-evaluation collaborator
//!
//! Rule logic lives outside this crate. [`CommandEvaluator`] runs an external
//! program (for example an axe wrapper) that reads the DOM snapshot on stdin
//! and prints a JSON array of findings on stdout.

use crate::aggregate::Finding;
use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use url::Url;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to start evaluator: {0}")]
    Spawn(std::io::Error),

    #[error("evaluator exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("evaluator output is not a findings array: {0}")]
    Output(#[from] serde_json::Error),
}

#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn evaluate(&self, url: &Url, dom: &str) -> Result<Vec<Finding>, EvaluationError>;
}

/// Produces no findings; used for crawl-only and dry runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvaluator;

#[async_trait]
impl RuleEvaluator for NullEvaluator {
    async fn evaluate(&self, _url: &Url, _dom: &str) -> Result<Vec<Finding>, EvaluationError> {
        Ok(Vec::new())
    }
}

/// Runs an external program once per page
///
/// The page URL is passed in the `SUMI_LENS_PAGE_URL` environment variable.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
}

impl CommandEvaluator {
    /// Returns None when the command line is empty
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl RuleEvaluator for CommandEvaluator {
    async fn evaluate(&self, url: &Url, dom: &str) -> Result<Vec<Finding>, EvaluationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("SUMI_LENS_PAGE_URL", url.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EvaluationError::Spawn)?;

        // Feed stdin from its own task so a chatty child cannot deadlock us
        let writer = child.stdin.take().map(|mut stdin| {
            let dom = dom.to_string();
            tokio::spawn(async move {
                let _ = stdin.write_all(dom.as_bytes()).await;
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(EvaluationError::Spawn)?;

        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            return Err(EvaluationError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let findings: Vec<Finding> = serde_json::from_slice(&output.stdout)?;
        Ok(findings)
    }
}
