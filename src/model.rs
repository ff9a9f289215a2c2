use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    #[default]
    Standard,
    Job,
}

impl ReleaseKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "standard" | "std" | "web" | "worker" => Some(Self::Standard),
            "job" | "jobs" | "cronjob" | "cj" => Some(Self::Job),
            _ => None,
        }
    }

    pub fn empty_message(self) -> &'static str {
        match self {
            Self::Standard => {
                "No objects to display. This might happen while your app is still deploying."
            }
            Self::Job => "There are no jobs currently running.",
        }
    }
}

impl Display for ReleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Job => write!(f, "job"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ReleaseRef {
    pub namespace: String,
    pub name: String,
    pub revision: u32,
    pub cluster_id: String,
    pub project_id: String,
    pub kind: ReleaseKind,
}

impl ReleaseRef {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("namespace", &self.namespace),
            ("name", &self.name),
            ("cluster id", &self.cluster_id),
            ("project id", &self.project_id),
        ];
        for (label, value) in fields {
            if value.trim().is_empty() {
                bail!("release {label} is required");
            }
        }
        if self.revision == 0 {
            bail!("release revision must be at least 1");
        }
        Ok(())
    }
}

impl Display for ReleaseRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} rev {} ({})",
            self.namespace, self.name, self.revision, self.kind
        )
    }
}

/// Raw controller resources as returned by the status query, tagged by the
/// release kind that decides how they are normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerPayload {
    Standard(Vec<Value>),
    Job(Vec<Value>),
}

impl ControllerPayload {
    pub fn for_kind(kind: ReleaseKind, items: Vec<Value>) -> Self {
        match kind {
            ReleaseKind::Standard => Self::Standard(items),
            ReleaseKind::Job => Self::Job(items),
        }
    }

    pub fn kind(&self) -> ReleaseKind {
        match self {
            Self::Standard(_) => ReleaseKind::Standard,
            Self::Job(_) => ReleaseKind::Job,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ControllerActivity {
    Active,
    Paused,
}

impl ControllerActivity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Controller {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub activity: ControllerActivity,
    pub raw_status: Value,
    pub ordinal_index: usize,
}

impl Controller {
    pub fn is_first(&self) -> bool {
        self.ordinal_index == 0
    }

    pub fn is_last(&self, total: usize) -> bool {
        self.ordinal_index + 1 == total
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SelectorBinding {
    pub controller_index: usize,
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct PodSummary {
    pub uid: String,
    pub name: String,
    pub phase: String,
    pub container_names: Vec<String>,
}

impl PodSummary {
    pub fn default_container(&self) -> Option<&str> {
        self.container_names.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogLine {
    pub line: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            timestamp: None,
        }
    }

    /// Splits the RFC3339 prefix the API server adds when timestamps are
    /// requested. Lines without a parseable prefix are kept verbatim.
    pub fn parse_timestamped(raw: &str) -> Self {
        if let Some((head, rest)) = raw.split_once(' ')
            && let Ok(ts) = DateTime::parse_from_rfc3339(head)
        {
            return Self {
                line: rest.to_string(),
                timestamp: Some(ts.with_timezone(&Utc)),
            };
        }
        Self::new(raw)
    }

    pub fn render(&self) -> String {
        match self.timestamp {
            Some(ts) => format!("{} {}", ts.format("%H:%M:%S"), self.line),
            None => self.line.clone(),
        }
    }
}
