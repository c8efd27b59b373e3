use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("insufficient corpus: {available} snippet(s) available, need at least {required} for comparison")]
    InsufficientCorpus { available: usize, required: usize },
    #[error("degenerate corpus: every text reduced to an empty vocabulary")]
    DegenerateCorpus,
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("export failed: {0}")]
    Export(String),
}

impl Error {
    /// Stable machine-readable code used in JSON reports.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NetworkFailure(_) => "network_failure",
            Error::MalformedResponse(_) => "malformed_response",
            Error::InsufficientCorpus { .. } => "insufficient_corpus",
            Error::DegenerateCorpus => "degenerate_corpus",
            Error::NotConfigured(_) => "not_configured",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Export(_) => "export_failed",
        }
    }

    /// Whether this error stops the remaining calls of the current keyword.
    pub fn aborts_keyword(&self) -> bool {
        matches!(self, Error::NetworkFailure(_) | Error::MalformedResponse(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A search location: either a human-readable name ("Austin, Texas, United States")
/// or a numeric location code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Code(u32),
    Name(String),
}

impl Location {
    /// Parse one list entry. All-digit entries become codes; blank entries are skipped.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(code) = s.parse::<u32>() {
                return Some(Location::Code(code));
            }
        }
        Some(Location::Name(s.to_string()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Code(c) => write!(f, "{c}"),
            Location::Name(n) => f.write_str(n),
        }
    }
}

/// Split a delimiter-separated list, trimming entries and dropping blanks.
pub fn split_list(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn parse_locations(raw: &str, delimiter: char) -> Vec<Location> {
    raw.split(delimiter).filter_map(Location::parse).collect()
}

/// Settings shared by every query of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTarget {
    pub domain: String,
    pub language: String,
    pub country: Option<String>,
    pub device: String,
    pub os: String,
}

impl Default for SearchTarget {
    fn default() -> Self {
        Self {
            domain: "google.com".to_string(),
            language: "en".to_string(),
            country: Some("us".to_string()),
            device: "desktop".to_string(),
            os: "windows".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub keyword: String,
    pub location: Location,
    pub language: String,
    pub domain: String,
    pub country: Option<String>,
    pub device: String,
    pub os: String,
}

impl Query {
    pub fn new(keyword: &str, location: Location, target: &SearchTarget) -> Self {
        Self {
            keyword: keyword.to_string(),
            location,
            language: target.language.clone(),
            domain: target.domain.clone(),
            country: target.country.clone(),
            device: target.device.clone(),
            os: target.os.clone(),
        }
    }

    /// Query for the 0-based `call_index`, rotating through `locations`.
    ///
    /// Returns `None` when `locations` is empty.
    pub fn for_call(
        keyword: &str,
        locations: &[Location],
        call_index: usize,
        target: &SearchTarget,
    ) -> Option<Self> {
        if locations.is_empty() {
            return None;
        }
        let location = locations[call_index % locations.len()].clone();
        Some(Self::new(keyword, location, target))
    }

    /// Wire form of one task object.
    pub fn to_task(&self) -> serde_json::Value {
        let mut task = serde_json::Map::new();
        task.insert("keyword".to_string(), self.keyword.clone().into());
        match &self.location {
            Location::Code(c) => {
                task.insert("location_code".to_string(), (*c).into());
            }
            Location::Name(n) => {
                task.insert("location_name".to_string(), n.clone().into());
            }
        }
        task.insert("google_domain".to_string(), self.domain.clone().into());
        if let Some(gl) = self.country.as_deref() {
            task.insert("gl".to_string(), gl.into());
        }
        task.insert("hl".to_string(), self.language.clone().into());
        task.insert("device".to_string(), self.device.clone().into());
        task.insert("os".to_string(), self.os.clone().into());
        serde_json::Value::Object(task)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header: `Basic base64(login:password)`.
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.login, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret.
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    AnswerBox,
    AiOverview,
}

impl ExtractMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMode::AnswerBox => "answer_box",
            ExtractMode::AiOverview => "ai_overview",
        }
    }
}

impl FromStr for ExtractMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "answer_box" => Ok(ExtractMode::AnswerBox),
            "ai_overview" => Ok(ExtractMode::AiOverview),
            other => Err(Error::InvalidConfig(format!("unknown extract mode: {other}"))),
        }
    }
}

/// How a keyword batch is sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestShape {
    /// One POST per call, each carrying a single task.
    SingleTask,
    /// One POST per keyword carrying every call as its own task.
    MultiTask,
}

impl RequestShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestShape::SingleTask => "single",
            RequestShape::MultiTask => "multi",
        }
    }
}

impl FromStr for RequestShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single_task" | "single-task" => Ok(RequestShape::SingleTask),
            "multi" | "multi_task" | "multi-task" => Ok(RequestShape::MultiTask),
            other => Err(Error::InvalidConfig(format!("unknown request shape: {other}"))),
        }
    }
}

/// What was extracted from one response. `present == false` is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub present: bool,
    pub text: Option<String>,
    pub structured: Option<serde_json::Value>,
}

impl Snippet {
    pub fn absent() -> Self {
        Self {
            present: false,
            text: None,
            structured: None,
        }
    }

    pub fn found(text: String, structured: Option<serde_json::Value>) -> Self {
        Self {
            present: true,
            text: Some(text),
            structured,
        }
    }

    /// Text usable as a corpus document: present and not blank.
    pub fn usable_text(&self) -> Option<&str> {
        if !self.present {
            return None;
        }
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub keyword: String,
    pub location: Location,
    /// 1-based.
    pub call_index: usize,
    pub text: String,
}

/// One similarity row mapped back to its (keyword, location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub keyword: String,
    pub location: Location,
    pub similarities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHtmlLink {
    pub keyword: String,
    pub location: Location,
    pub raw_html_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub document: serde_json::Value,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SerpProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send one request for `queries` and return the parsed document.
    ///
    /// `SingleTask` expects exactly one query; `MultiTask` sends them as a list and the
    /// response's `tasks[i]` answers `queries[i]`.
    async fn post(&self, queries: &[Query], shape: RequestShape) -> Result<RawResponse>;
}
