use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use log::{info, warn};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::time::Instant;

use crate::dispatcher::{DispatchSummary, Dispatcher};
use crate::executor::{ExecutorError, ExecutorMode};
use crate::matcher::{self, MatchConfig, MatchError, MatchLocation};
use crate::output::{self, ResultSink};
use crate::template::{self, RequestTemplate, TemplateError};

#[derive(Clone, Debug)]
pub enum TemplateSource {
    FilePath(PathBuf),
    Inline(RequestTemplate),
}

#[derive(Clone, Debug)]
pub enum TargetSource {
    FilePath(PathBuf),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Options {
    pub template: Option<TemplateSource>,
    pub targets: Option<TargetSource>,
    pub grep_location: MatchLocation,
    pub grep_header: Option<String>,
    pub grep: String,
    pub grep_status_code: u16,
    pub output: PathBuf,
    pub trace_redirects: bool,
    /// Accepted and reported, never handed to the transport.
    pub proxy: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            template: None,
            targets: None,
            grep_location: MatchLocation::Default,
            grep_header: None,
            grep: matcher::DEFAULT_PATTERN.to_string(),
            grep_status_code: 0,
            output: PathBuf::from(output::DEFAULT_OUTPUT_PATH),
            trace_redirects: false,
            proxy: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no request template provided")]
    MissingTemplate,

    #[error("no subdomains provided")]
    MissingTargets,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ScanResult {
    pub started_at: Instant,
    pub elapsed: Duration,
    pub mode: ExecutorMode,
    pub summary: DispatchSummary,
    pub matches: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
    config: Arc<MatchConfig>,
}

impl Runner {
    /// Checks the required inputs and compiles the match rule.
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.template.is_none() {
            return Err(RunnerError::MissingTemplate);
        }
        if options.targets.is_none() {
            return Err(RunnerError::MissingTargets);
        }
        let config = MatchConfig::new(
            options.grep_location,
            options.grep_header.clone(),
            &options.grep,
            options.grep_status_code,
        )?;
        Ok(Self {
            options,
            config: Arc::new(config),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub async fn run(&self) -> Result<ScanResult, RunnerError> {
        self.run_with_progress(ProgressBar::hidden()).await
    }

    pub async fn run_with_progress(&self, pb: ProgressBar) -> Result<ScanResult, RunnerError> {
        let started_at = Instant::now();

        let template = match self.options.template.as_ref() {
            Some(TemplateSource::Inline(t)) => t.clone(),
            Some(TemplateSource::FilePath(path)) => template::load_template(path).await?,
            None => return Err(RunnerError::MissingTemplate),
        };
        let targets = match self.options.targets.as_ref() {
            Some(source) => load_targets(source).await?,
            None => return Err(RunnerError::MissingTargets),
        };

        if let Some(proxy) = self.options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            warn!("proxy {proxy} is configured but not used for requests");
        }

        let sink = Arc::new(ResultSink::create(&self.options.output).await);
        pb.set_length(targets.len() as u64);

        let mut dispatcher = Dispatcher::new(
            Arc::new(template),
            Arc::clone(&self.config),
            Arc::clone(&sink),
            self.options.trace_redirects,
        )
        .with_progress(pb.clone());
        let mode = dispatcher.mode();
        info!(
            "dispatching {} targets in {} mode",
            targets.len(),
            mode.as_str()
        );

        let summary = dispatcher.run(&targets).await?;
        pb.finish_and_clear();

        Ok(ScanResult {
            started_at,
            elapsed: started_at.elapsed(),
            mode,
            summary,
            matches: sink.lines().await,
        })
    }
}

/// One target per line, untrimmed; blank lines stay as empty targets.
pub async fn load_targets(source: &TargetSource) -> Result<Vec<String>, RunnerError> {
    let path = match source {
        TargetSource::Inline(values) => return Ok(values.clone()),
        TargetSource::FilePath(path) => path.display().to_string(),
    };

    let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
        kind: "subdomains",
        path: path.clone(),
        source: e,
    })?;
    let mut out = Vec::new();
    let mut lines = BufReader::new(handle).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => out.push(line),
            Ok(None) => break,
            Err(e) => {
                return Err(RunnerError::FileRead {
                    kind: "subdomains",
                    path,
                    source: e,
                })
            }
        }
    }
    Ok(out)
}
