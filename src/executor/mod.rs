use std::time::Duration;

use log::{info, warn};
use reqwest::header::LOCATION;
use reqwest::redirect;
use thiserror::Error;

use crate::matcher::{self, MatchConfig, ResponseSnapshot};
use crate::output::ResultSink;
use crate::template::RequestTemplate;

pub const SINGLE_SHOT_TIMEOUT: Duration = Duration::from_secs(3);
pub const TRACE_TIMEOUT: Duration = Duration::from_secs(10);
pub const BODY_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_REDIRECT_ITERATIONS: usize = 100;
pub const MAX_IDLE_PER_HOST: usize = 1000;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("error making request for {url}: {source}")]
    RequestBuild {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no host in request URL {url}")]
    MissingHost { url: String },

    #[error("error sending request to {url}: {source}")]
    Send {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// False when nothing sits between the scheme and the path, as happens for a
/// blank target line. `http:///health` would otherwise parse with `health`
/// as its host.
pub fn has_host(url: &str) -> bool {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    !authority.is_empty()
}

fn missing_host(url: &str) -> ExecutorError {
    ExecutorError::MissingHost {
        url: url.to_string(),
    }
}

fn send_error(url: &str, source: reqwest::Error) -> ExecutorError {
    ExecutorError::Send {
        url: url.to_string(),
        source,
    }
}

/// Which request shape a unit of work sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorMode {
    SingleShot,
    TraceRedirects,
    Body,
}

impl ExecutorMode {
    /// Body requests take priority; redirect tracing is opt-in.
    pub fn select(template: &RequestTemplate, trace_redirects: bool) -> Self {
        if template.has_body() {
            Self::Body
        } else if trace_redirects {
            Self::TraceRedirects
        } else {
            Self::SingleShot
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleShot => "single",
            Self::TraceRedirects => "trace-redirects",
            Self::Body => "body",
        }
    }
}

/// What a unit of work did for its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attempt {
    /// Requests actually handed to the transport.
    pub requests: usize,
    /// Result lines appended to the sink.
    pub matches: usize,
}

// every call gets its own client so no live connection is shared between targets
fn build_client(
    timeout: Duration,
    policy: redirect::Policy,
) -> Result<reqwest::Client, ExecutorError> {
    reqwest::Client::builder()
        .redirect(policy)
        .timeout(timeout)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .build()
        .map_err(|e| ExecutorError::ClientBuild { source: e })
}

pub async fn execute(
    mode: ExecutorMode,
    url: &str,
    template: &RequestTemplate,
    config: &MatchConfig,
    sink: &ResultSink,
) -> Result<Attempt, ExecutorError> {
    match mode {
        ExecutorMode::SingleShot => Ok(send_single(url, template, config, sink).await),
        ExecutorMode::TraceRedirects => Ok(trace_redirects(url, template, config, sink).await),
        ExecutorMode::Body => send_with_body(url, template, config, sink).await,
    }
}

/// One request without a body. Every failure is logged and swallowed.
pub async fn send_single(
    url: &str,
    template: &RequestTemplate,
    config: &MatchConfig,
    sink: &ResultSink,
) -> Attempt {
    info!("Testing: {url}");
    let mut attempt = Attempt::default();
    if !has_host(url) {
        warn!("{}", missing_host(url));
        return attempt;
    }

    let client = match build_client(SINGLE_SHOT_TIMEOUT, redirect::Policy::default()) {
        Ok(client) => client,
        Err(e) => {
            warn!("{url}: {e}");
            return attempt;
        }
    };

    let request = match build_request(&client, url, template) {
        Ok(request) => request,
        Err(e) => {
            warn!("{e}");
            return attempt;
        }
    };

    attempt.requests += 1;
    match client.execute(request).await {
        Ok(response) => {
            let snapshot = ResponseSnapshot::read(url, response).await;
            attempt.matches += matcher::record_matches(url, &snapshot, config, sink).await;
        }
        Err(e) => warn!("{}", send_error(url, e)),
    }
    attempt
}

/// Walks a redirect chain by hand, matching every hop, until a 200, a send
/// failure, a hop without a host, or the iteration cap. `Location` is taken
/// as-is.
pub async fn trace_redirects(
    url: &str,
    template: &RequestTemplate,
    config: &MatchConfig,
    sink: &ResultSink,
) -> Attempt {
    info!("Testing: {url}");
    let mut attempt = Attempt::default();

    let client = match build_client(TRACE_TIMEOUT, redirect::Policy::none()) {
        Ok(client) => client,
        Err(e) => {
            warn!("{url}: {e}");
            return attempt;
        }
    };

    let mut current = url.to_string();
    for _ in 0..MAX_REDIRECT_ITERATIONS {
        if !has_host(&current) {
            warn!("{}", missing_host(&current));
            break;
        }
        let request = match build_request(&client, &current, template) {
            Ok(request) => request,
            Err(e) => {
                warn!("{e}");
                break;
            }
        };

        attempt.requests += 1;
        let response = match client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("{}", send_error(&current, e));
                break;
            }
        };

        let snapshot = ResponseSnapshot::read(&current, response).await;
        attempt.matches += matcher::record_matches(&current, &snapshot, config, sink).await;
        if snapshot.status == 200 {
            break;
        }

        current = snapshot
            .headers
            .get(LOCATION)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();
    }
    attempt
}

/// One request carrying the template body. Headers are set rather than
/// appended. A target without a host is logged and skipped; any other
/// request that cannot be built is returned as an error and ends the whole
/// run.
pub async fn send_with_body(
    url: &str,
    template: &RequestTemplate,
    config: &MatchConfig,
    sink: &ResultSink,
) -> Result<Attempt, ExecutorError> {
    info!("Testing: {url}");
    let mut attempt = Attempt::default();
    if !has_host(url) {
        warn!("{}", missing_host(url));
        return Ok(attempt);
    }

    let client = match build_client(BODY_TIMEOUT, redirect::Policy::default()) {
        Ok(client) => client,
        Err(e) => {
            warn!("{url}: {e}");
            return Ok(attempt);
        }
    };

    let body = template.body.clone().unwrap_or_default();
    let mut request = client
        .request(template.method.as_reqwest(), url)
        .body(body)
        .build()
        .map_err(|e| ExecutorError::RequestBuild {
            url: url.to_string(),
            source: e,
        })?;
    for (name, value) in template.headers.iter() {
        request.headers_mut().insert(name.clone(), value.clone());
    }

    attempt.requests += 1;
    match client.execute(request).await {
        Ok(response) => {
            let snapshot = ResponseSnapshot::read(url, response).await;
            attempt.matches += matcher::record_matches(url, &snapshot, config, sink).await;
        }
        Err(e) => warn!("{}", send_error(url, e)),
    }
    Ok(attempt)
}

fn build_request(
    client: &reqwest::Client,
    url: &str,
    template: &RequestTemplate,
) -> Result<reqwest::Request, ExecutorError> {
    let mut builder = client.request(template.method.as_reqwest(), url);
    for (name, value) in template.headers.iter() {
        builder = builder.header(name, value);
    }
    builder.build().map_err(|e| ExecutorError::RequestBuild {
        url: url.to_string(),
        source: e,
    })
}
