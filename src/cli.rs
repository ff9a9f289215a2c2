use crate::config::StatusConfig;
use crate::model::{ReleaseKind, ReleaseRef};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "chart-status",
    version,
    about = "Live controller, pod and log status for a deployed chart release."
)]
pub struct CliArgs {
    /// Release name
    #[arg(long)]
    pub name: String,

    /// Release namespace (defaults to the kubeconfig namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Release revision
    #[arg(long, default_value_t = 1)]
    pub revision: u32,

    /// Release kind: standard or job
    #[arg(long, default_value = "standard", value_parser = parse_kind)]
    pub kind: ReleaseKind,

    /// Kubeconfig context used as the cluster id (defaults to current context)
    #[arg(long)]
    pub cluster: Option<String>,

    /// Project id the release belongs to
    #[arg(long, default_value = "default")]
    pub project: String,

    /// Pod selector per controller, in controller order. Derived from the
    /// controllers when omitted.
    #[arg(short = 'l', long = "selector")]
    pub selectors: Vec<String>,

    /// Pod polling interval in milliseconds (0 disables polling)
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write diagnostics to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

impl CliArgs {
    pub fn apply_overrides(&self, config: &mut StatusConfig) {
        if let Some(refresh_ms) = self.refresh_ms {
            config.poll_interval_ms = refresh_ms;
        }
    }

    pub fn explicit_selectors(&self) -> Option<Vec<String>> {
        if self.selectors.is_empty() {
            None
        } else {
            Some(self.selectors.clone())
        }
    }

    pub fn release_ref(&self, default_namespace: &str, cluster_id: &str) -> ReleaseRef {
        ReleaseRef {
            namespace: self
                .namespace
                .clone()
                .filter(|namespace| !namespace.trim().is_empty())
                .unwrap_or_else(|| default_namespace.to_string()),
            name: self.name.clone(),
            revision: self.revision,
            cluster_id: cluster_id.to_string(),
            project_id: self.project.clone(),
            kind: self.kind,
        }
    }
}

fn parse_kind(value: &str) -> Result<ReleaseKind, String> {
    ReleaseKind::from_token(value).ok_or_else(|| format!("unknown release kind '{value}'"))
}
