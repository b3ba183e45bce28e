use std::path::Path;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_ACCEPT: &str = "*/*";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.93 Safari/537.36";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read request template: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse request template: {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("request template document contains no templates")]
    Empty,

    #[error("invalid header name '{name}' in template '{template}'")]
    InvalidHeaderName { template: String, name: String },

    #[error("invalid value for header '{name}' in template '{template}'")]
    InvalidHeaderValue { template: String, name: String },
}

/// The fixed set of methods a template may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestMethod {
    Connect,
    Delete,
    #[default]
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl RequestMethod {
    /// Upper-cases the input and falls back to GET for anything unknown.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "CONNECT" => Self::Connect,
            "DELETE" => Self::Delete,
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "TRACE" => Self::Trace,
            _ => Self::Get,
        }
    }

    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Connect => reqwest::Method::CONNECT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Patch => reqwest::Method::PATCH,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Trace => reqwest::Method::TRACE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Trace => "TRACE",
        }
    }
}

// a single entry of the template document, keyed by template name
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TemplateEntry {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub headers: Vec<TemplateHeader>,
    #[serde(default)]
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TemplateHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// The request shape every target receives. Built once, then shared read-only.
#[derive(Clone, Debug)]
pub struct RequestTemplate {
    pub method: RequestMethod,
    pub url_path: String,
    pub protocol: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: RequestMethod::Get,
            url_path: String::new(),
            protocol: String::new(),
            headers: default_headers(),
            body: None,
        }
    }
}

impl RequestTemplate {
    pub fn has_body(&self) -> bool {
        self.body.as_ref().map(|b| !b.is_empty()).unwrap_or(false)
    }

    pub fn target_url(&self, host: &str) -> String {
        format!("http://{}{}", host, self.url_path)
    }

    /// Applies each named entry in order on top of the built-in defaults.
    /// Headers accumulate across entries; method, url, protocol and body are
    /// taken from the last entry.
    pub fn from_entries(entries: &[(String, TemplateEntry)]) -> Result<Self, TemplateError> {
        if entries.is_empty() {
            return Err(TemplateError::Empty);
        }
        if entries.len() > 1 {
            warn!(
                "{} request templates found, the last one ({}) wins",
                entries.len(),
                entries[entries.len() - 1].0
            );
        }

        let mut template = RequestTemplate::default();
        for (name, entry) in entries.iter() {
            for header in entry.headers.iter() {
                let header_name = HeaderName::from_bytes(header.name.trim().as_bytes())
                    .map_err(|_| TemplateError::InvalidHeaderName {
                        template: name.clone(),
                        name: header.name.clone(),
                    })?;
                let header_value = HeaderValue::from_str(&header.value).map_err(|_| {
                    TemplateError::InvalidHeaderValue {
                        template: name.clone(),
                        name: header.name.clone(),
                    }
                })?;
                template.headers.insert(header_name, header_value);
            }
            template.method = RequestMethod::normalize(&entry.method);
            template.url_path = entry.url.clone();
            template.protocol = entry.protocol.clone();
            template.body = if entry.body.is_empty() {
                None
            } else {
                Some(entry.body.clone().into_bytes())
            };
        }

        debug!("request method: {}", template.method.as_str());
        debug!("request url: {}", template.url_path);
        debug!("request protocol: {}", template.protocol);
        for (k, v) in template.headers.iter() {
            debug!("request header: {}: {}", k, v.to_str().unwrap_or("<binary>"));
        }
        Ok(template)
    }
}

pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers
}

/// Parses a template document, keeping the order entries appear in.
pub fn parse_template_document(
    contents: &str,
    path: &str,
) -> Result<Vec<(String, TemplateEntry)>, TemplateError> {
    let mapping: serde_yaml::Mapping =
        serde_yaml::from_str(contents).map_err(|e| TemplateError::Parse {
            path: path.to_string(),
            source: e,
        })?;

    let mut out = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = match key {
            serde_yaml::Value::String(s) => s,
            other => serde_yaml::to_string(&other)
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
        let entry: TemplateEntry =
            serde_yaml::from_value(value).map_err(|e| TemplateError::Parse {
                path: path.to_string(),
                source: e,
            })?;
        out.push((name, entry));
    }
    Ok(out)
}

pub async fn load_template(path: &Path) -> Result<RequestTemplate, TemplateError> {
    let display = path.display().to_string();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TemplateError::Read {
            path: display.clone(),
            source: e,
        })?;
    let entries = parse_template_document(&contents, &display)?;
    RequestTemplate::from_entries(&entries)
}
