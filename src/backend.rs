use crate::model::{ControllerPayload, LogLine, PodSummary, ReleaseRef};
use anyhow::Result;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

pub type LogFeed = BoxStream<'static, Result<LogLine>>;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogTarget {
    pub cluster_id: String,
    pub namespace: String,
    pub pod_uid: String,
    pub pod_name: String,
    pub container: Option<String>,
}

/// Request/response collaborator that owns transport and auth.
#[async_trait::async_trait]
pub trait StatusBackend: Send + Sync {
    async fn fetch_controllers(&self, release: &ReleaseRef) -> Result<ControllerPayload>;

    async fn fetch_pods(
        &self,
        cluster_id: &str,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PodSummary>>;

    async fn open_log_feed(&self, target: &LogTarget) -> Result<LogFeed>;
}

/// Fire-and-forget error reporting shared with the surrounding UI.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: String);
}

impl ErrorSink for mpsc::UnboundedSender<String> {
    fn report(&self, message: String) {
        if self.send(message).is_err() {
            warn!("error sink receiver dropped");
        }
    }
}

/// Keeps the most recent report, mirroring a single "current error" slot.
#[derive(Debug, Default, Clone)]
pub struct LatestError {
    slot: Arc<Mutex<Option<String>>>,
}

impl LatestError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn take(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl ErrorSink for LatestError {
    fn report(&self, message: String) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorSink, LatestError};
    use tokio::sync::mpsc;

    #[test]
    fn latest_error_keeps_last_report() {
        let sink = LatestError::new();
        sink.report("first".to_string());
        sink.report("second".to_string());
        assert_eq!(sink.current().as_deref(), Some("second"));
        assert_eq!(sink.take().as_deref(), Some("second"));
        assert!(sink.current().is_none());
    }

    #[test]
    fn channel_sink_forwards_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tx.report("boom".to_string());
        assert_eq!(rx.try_recv().ok().as_deref(), Some("boom"));
    }
}
