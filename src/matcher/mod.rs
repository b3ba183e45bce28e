use std::str::FromStr;

use log::{debug, info, warn};
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use thiserror::Error;

use crate::output::ResultSink;

pub const DEFAULT_PATTERN: &str = "test";

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid grep location '{value}', expected default, body, headers or statuscode")]
    InvalidLocation { value: String },

    #[error("invalid grep pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Which part of the response is inspected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchLocation {
    #[default]
    Default,
    Body,
    Headers,
    StatusCode,
}

impl MatchLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Body => "body",
            Self::Headers => "headers",
            Self::StatusCode => "statuscode",
        }
    }
}

impl FromStr for MatchLocation {
    type Err = MatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "default" => Ok(Self::Default),
            "body" => Ok(Self::Body),
            "headers" => Ok(Self::Headers),
            "statuscode" => Ok(Self::StatusCode),
            _ => Err(MatchError::InvalidLocation {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MatchConfig {
    pub location: MatchLocation,
    pub header_name: Option<String>,
    pub pattern: Regex,
    /// 0 means any status.
    pub status_code: u16,
}

impl MatchConfig {
    /// Compiles `pattern` up front so a bad expression stops the run before
    /// any request goes out.
    pub fn new(
        location: MatchLocation,
        header_name: Option<String>,
        pattern: &str,
        status_code: u16,
    ) -> Result<Self, MatchError> {
        let pattern = Regex::new(pattern).map_err(|e| MatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        let header_name = header_name
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty() && h != "default");
        Ok(Self {
            location,
            header_name,
            pattern,
            status_code,
        })
    }

    fn status_allowed(&self, status: u16) -> bool {
        self.status_code == 0 || self.status_code == status
    }
}

/// What the matcher needs from a completed response.
#[derive(Clone, Debug)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: HeaderMap,
    /// `None` when the body could not be read in full.
    pub body: Option<String>,
}

impl ResponseSnapshot {
    /// Drains the response. A failed body read is logged and recorded as a
    /// missing body; the rest of the snapshot is still usable.
    pub async fn read(url: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!("{url}: failed to read response body: {e}");
                None
            }
        };
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Decides which result lines a response produces.
pub fn match_response(url: &str, snapshot: &ResponseSnapshot, config: &MatchConfig) -> Vec<String> {
    let mut out = Vec::new();
    match config.location {
        MatchLocation::Default => {
            info!("{}: {}", url, snapshot.status);
            let content_type = snapshot
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            info!("{}: {}", url, content_type);
            // placeholders, not per-target data
            out.push("default".to_string());
            out.push("default1".to_string());
        }
        MatchLocation::Body => match snapshot.body.as_deref() {
            Some(body) => {
                if config.pattern.is_match(body) {
                    out.push(format!("{url}\n"));
                }
            }
            None => debug!("{url}: no body available, skipping body match"),
        },
        MatchLocation::Headers => match config.header_name.as_deref() {
            None => {
                for name in snapshot.headers.keys() {
                    let value = first_header_value(&snapshot.headers, name.as_str());
                    if config.pattern.is_match(&value.to_lowercase())
                        && config.status_allowed(snapshot.status)
                    {
                        out.push(format!("{url}\n"));
                    }
                }
            }
            Some(header_name) => {
                if snapshot.headers.contains_key(header_name) {
                    debug!("{url}: header {header_name} exists");
                    let value = first_header_value(&snapshot.headers, header_name);
                    if config.pattern.is_match(&value.to_lowercase())
                        && config.status_allowed(snapshot.status)
                    {
                        out.push(format!("{url}| {value}\n"));
                    }
                } else {
                    debug!("{url}: header {header_name} does not exist");
                }
            }
        },
        MatchLocation::StatusCode => {
            if snapshot.status == config.status_code {
                out.push(format!("{url}\n"));
            }
        }
    }
    out
}

/// Runs the matcher and appends whatever it produced to the sink.
pub async fn record_matches(
    url: &str,
    snapshot: &ResponseSnapshot,
    config: &MatchConfig,
    sink: &ResultSink,
) -> usize {
    let lines = match_response(url, snapshot, config);
    let count = lines.len();
    for line in lines {
        sink.append(line).await;
    }
    count
}

fn first_header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}
