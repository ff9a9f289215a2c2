use crate::k8s::GatewayOptions;
use crate::logs::DEFAULT_BUFFER_LINES;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const MIN_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatusConfig {
    pub source: Option<String>,
    pub poll_interval_ms: u64,
    pub log_tail_lines: i64,
    pub log_buffer_lines: usize,
    pub timestamps: bool,
    pub release_label: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            source: None,
            poll_interval_ms: default_poll_interval_ms(),
            log_tail_lines: default_log_tail_lines(),
            log_buffer_lines: DEFAULT_BUFFER_LINES,
            timestamps: true,
            release_label: default_release_label(),
        }
    }
}

impl StatusConfig {
    /// Polling period, or `None` when polling is switched off.
    pub fn poll_interval_ms(&self) -> Option<u64> {
        match self.poll_interval_ms {
            0 => None,
            value => Some(value.max(MIN_POLL_INTERVAL_MS)),
        }
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            release_label: self.release_label.clone(),
            log_tail_lines: self.log_tail_lines,
            timestamps: self.timestamps,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct StatusConfigFile {
    #[serde(default, alias = "refresh_ms", alias = "poll_ms")]
    poll_interval_ms: Option<u64>,
    #[serde(default, alias = "tail_lines", alias = "tail")]
    log_tail_lines: Option<i64>,
    #[serde(default, alias = "buffer_lines")]
    log_buffer_lines: Option<usize>,
    #[serde(default)]
    timestamps: Option<bool>,
    #[serde(default)]
    release_label: Option<String>,
}

pub fn load() -> Result<StatusConfig> {
    match discover_config_path() {
        Some(path) => load_from(&path),
        None => Ok(StatusConfig::default()),
    }
}

pub fn load_from(path: &Path) -> Result<StatusConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config = parse(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.source = Some(path.display().to_string());
    Ok(config)
}

fn parse(raw: &str) -> Result<StatusConfig> {
    let defaults = StatusConfig::default();
    if raw.trim().is_empty() {
        return Ok(defaults);
    }
    let parsed: StatusConfigFile = serde_yaml::from_str(raw)?;
    Ok(StatusConfig {
        source: None,
        poll_interval_ms: parsed.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        log_tail_lines: parsed
            .log_tail_lines
            .filter(|lines| *lines > 0)
            .unwrap_or(defaults.log_tail_lines),
        log_buffer_lines: parsed
            .log_buffer_lines
            .filter(|lines| *lines > 0)
            .unwrap_or(defaults.log_buffer_lines),
        timestamps: parsed.timestamps.unwrap_or(defaults.timestamps),
        release_label: parsed
            .release_label
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or(defaults.release_label),
    })
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_log_tail_lines() -> i64 {
    500
}

fn default_release_label() -> String {
    "app.kubernetes.io/instance".to_string()
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHART_STATUS_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("chart-status.yaml"),
        PathBuf::from("chart-status.yml"),
        PathBuf::from(".chart-status.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/chart-status/config.yaml"),
            PathBuf::from(&home).join(".config/chart-status/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{StatusConfig, parse};

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse("").expect("parse");
        assert_eq!(config, StatusConfig::default());
        assert_eq!(config.poll_interval_ms(), Some(5_000));
    }

    #[test]
    fn aliases_and_overrides_are_read() {
        let config = parse(
            "refresh_ms: 100\ntail: 50\nbuffer_lines: 200\ntimestamps: false\nrelease_label: release\n",
        )
        .expect("parse");
        assert_eq!(config.poll_interval_ms(), Some(500));
        assert_eq!(config.log_tail_lines, 50);
        assert_eq!(config.log_buffer_lines, 200);
        assert!(!config.timestamps);
        assert_eq!(config.gateway_options().release_label, "release");
    }

    #[test]
    fn zero_interval_disables_polling() {
        let config = parse("poll_interval_ms: 0\n").expect("parse");
        assert_eq!(config.poll_interval_ms(), None);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = parse("log_tail_lines: -4\nlog_buffer_lines: 0\nrelease_label: '  '\n")
            .expect("parse");
        assert_eq!(config.log_tail_lines, 500);
        assert_eq!(config.log_buffer_lines, 5_000);
        assert_eq!(config.release_label, "app.kubernetes.io/instance");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(parse("poll_interval_ms: [nope").is_err());
    }
}
