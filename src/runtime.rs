use crate::backend::StatusBackend;
use crate::logs::FeedToken;
use crate::status::{StatusCommand, StatusEvent, StatusView};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Runs [`StatusCommand`]s on tokio tasks and hands the results back in
/// completion order.
pub struct StatusDriver {
    backend: Arc<dyn StatusBackend>,
    events_tx: mpsc::UnboundedSender<StatusEvent>,
    events_rx: mpsc::UnboundedReceiver<StatusEvent>,
    feeds: HashMap<FeedToken, JoinHandle<()>>,
}

impl StatusDriver {
    pub fn new(backend: Arc<dyn StatusBackend>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            events_tx,
            events_rx,
            feeds: HashMap::new(),
        }
    }

    pub fn open_feeds(&self) -> usize {
        self.feeds
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub fn execute(&mut self, commands: Vec<StatusCommand>) {
        for command in commands {
            match command {
                StatusCommand::FetchControllers(query) => {
                    let backend = Arc::clone(&self.backend);
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = backend
                            .fetch_controllers(&query.release)
                            .await
                            .map_err(|error| format!("{error:#}"));
                        let _ = tx.send(StatusEvent::ControllersLoaded {
                            generation: query.generation,
                            result,
                        });
                    });
                }
                StatusCommand::FetchPods {
                    generation,
                    cluster_id,
                    namespace,
                    query,
                } => {
                    let backend = Arc::clone(&self.backend);
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = backend
                            .fetch_pods(&cluster_id, &namespace, &query.selector)
                            .await
                            .map_err(|error| format!("{error:#}"));
                        let _ = tx.send(StatusEvent::PodsLoaded {
                            generation,
                            controller_id: query.controller_id,
                            token: query.token,
                            result,
                        });
                    });
                }
                StatusCommand::OpenLogFeed { token, target } => {
                    let backend = Arc::clone(&self.backend);
                    let tx = self.events_tx.clone();
                    let handle = tokio::spawn(async move {
                        let mut feed = match backend.open_log_feed(&target).await {
                            Ok(feed) => feed,
                            Err(error) => {
                                let _ = tx.send(StatusEvent::LogFeedFailed {
                                    token,
                                    message: format!("{error:#}"),
                                });
                                return;
                            }
                        };
                        let _ = tx.send(StatusEvent::LogFeedOpened { token });
                        while let Some(item) = feed.next().await {
                            match item {
                                Ok(line) => {
                                    if tx.send(StatusEvent::LogLine { token, line }).is_err() {
                                        return;
                                    }
                                }
                                Err(error) => {
                                    warn!(pod = %target.pod_name, "log feed broke: {error:#}");
                                    let _ = tx.send(StatusEvent::LogFeedFailed {
                                        token,
                                        message: format!("{error:#}"),
                                    });
                                    break;
                                }
                            }
                        }
                        debug!(pod = %target.pod_name, "log feed ended");
                        let _ = tx.send(StatusEvent::LogFeedEnded { token });
                    });
                    if let Some(previous) = self.feeds.insert(token, handle) {
                        previous.abort();
                    }
                }
                StatusCommand::CloseLogFeed { token } => {
                    if let Some(handle) = self.feeds.remove(&token) {
                        handle.abort();
                    }
                }
            }
        }
        self.feeds.retain(|_, handle| !handle.is_finished());
    }

    pub async fn next_event(&mut self) -> Option<StatusEvent> {
        self.events_rx.recv().await
    }

    /// Applies one event to the view and runs whatever it asks for next.
    pub fn dispatch(&mut self, view: &mut StatusView, event: StatusEvent) {
        let commands = view.apply(event);
        self.execute(commands);
    }

    pub async fn pump(&mut self, view: &mut StatusView) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.dispatch(view, event);
                true
            }
            None => false,
        }
    }
}

impl Drop for StatusDriver {
    fn drop(&mut self) {
        for (_, handle) in self.feeds.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StatusDriver;
    use crate::backend::{LatestError, LogFeed, LogTarget, StatusBackend};
    use crate::model::{ControllerPayload, LogLine, PodSummary, ReleaseKind, ReleaseRef};
    use crate::status::{LoadingState, StatusView};
    use anyhow::{Result, anyhow};
    use futures::{StreamExt, stream};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[derive(Default)]
    struct MockBackend {
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
        pods: HashMap<String, Vec<PodSummary>>,
        logs: HashMap<String, Vec<String>>,
        endless_logs: bool,
    }

    #[async_trait::async_trait]
    impl StatusBackend for MockBackend {
        async fn fetch_controllers(&self, release: &ReleaseRef) -> Result<ControllerPayload> {
            let gate = self
                .gates
                .lock()
                .map_err(|_| anyhow!("gate lock poisoned"))?
                .remove(&release.name);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if release.name == "broken" {
                return Err(anyhow!("status query failed"));
            }
            Ok(ControllerPayload::Standard(vec![json!({
                "kind": "Deployment",
                "metadata": {"name": release.name, "uid": format!("uid-{}", release.name)}
            })]))
        }

        async fn fetch_pods(
            &self,
            _cluster_id: &str,
            _namespace: &str,
            selector: &str,
        ) -> Result<Vec<PodSummary>> {
            Ok(self.pods.get(selector).cloned().unwrap_or_default())
        }

        async fn open_log_feed(&self, target: &LogTarget) -> Result<LogFeed> {
            let Some(lines) = self.logs.get(&target.pod_name).cloned() else {
                return Err(anyhow!("pod {} not found", target.pod_name));
            };
            let feed = stream::iter(lines.into_iter().map(|line| Ok(LogLine::new(line))));
            if self.endless_logs {
                Ok(feed.chain(stream::pending()).boxed())
            } else {
                Ok(feed.boxed())
            }
        }
    }

    fn release(name: &str) -> ReleaseRef {
        ReleaseRef {
            namespace: "default".to_string(),
            name: name.to_string(),
            revision: 1,
            cluster_id: "dev".to_string(),
            project_id: "1".to_string(),
            kind: ReleaseKind::Standard,
        }
    }

    fn pod(uid: &str, name: &str) -> PodSummary {
        PodSummary {
            uid: uid.to_string(),
            name: name.to_string(),
            phase: "Running".to_string(),
            container_names: vec!["app".to_string()],
        }
    }

    async fn pump_until<F>(driver: &mut StatusDriver, view: &mut StatusView, done: F)
    where
        F: Fn(&StatusView) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            while !done(view) {
                driver.pump(view).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn pipeline_streams_logs_for_selected_pod() {
        let mut backend = MockBackend::default();
        backend
            .pods
            .insert("app=web".to_string(), vec![pod("p1", "web-1")]);
        backend.logs.insert(
            "web-1".to_string(),
            vec!["booting".to_string(), "ready".to_string()],
        );
        let mut driver = StatusDriver::new(Arc::new(backend));
        let mut view = StatusView::new(Arc::new(LatestError::new()), 100);

        let commands = view.set_selectors(Some(vec!["app=web".to_string()]));
        driver.execute(commands);
        driver.execute(view.set_release(release("web")));
        pump_until(&mut driver, &mut view, |view| {
            view.tracker("uid-web").is_some_and(|t| !t.pods().is_empty())
        })
        .await;

        driver.execute(view.select_pod("uid-web", "p1"));
        pump_until(&mut driver, &mut view, |view| {
            view.snapshot().log_lines.len() == 2
        })
        .await;
        assert_eq!(
            view.snapshot().log_lines,
            vec!["booting".to_string(), "ready".to_string()]
        );
    }

    #[tokio::test]
    async fn late_result_for_replaced_release_is_dropped() {
        let (release_a, gate_a) = oneshot::channel::<()>();
        let backend = MockBackend::default();
        backend
            .gates
            .lock()
            .expect("lock")
            .insert("a".to_string(), gate_a);
        let mut driver = StatusDriver::new(Arc::new(backend));
        let mut view = StatusView::new(Arc::new(LatestError::new()), 100);

        driver.execute(view.set_release(release("a")));
        driver.execute(view.set_release(release("b")));
        pump_until(&mut driver, &mut view, |view| {
            view.loading_state() == LoadingState::Populated
        })
        .await;

        let _ = release_a.send(());
        let late = timeout(Duration::from_secs(2), driver.next_event())
            .await
            .expect("late event")
            .expect("channel open");
        driver.dispatch(&mut view, late);

        let ids = view
            .controllers()
            .iter()
            .map(|controller| controller.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["uid-b".to_string()]);
    }

    #[tokio::test]
    async fn fetch_failure_reaches_error_sink() {
        let sink = LatestError::new();
        let mut driver = StatusDriver::new(Arc::new(MockBackend::default()));
        let mut view = StatusView::new(Arc::new(sink.clone()), 100);

        driver.execute(view.set_release(release("broken")));
        pump_until(&mut driver, &mut view, |view| {
            view.loading_state() != LoadingState::Loading
        })
        .await;

        assert_eq!(sink.current().as_deref(), Some("status query failed"));
        assert!(view.controllers().is_empty());
    }

    #[tokio::test]
    async fn feed_open_failure_sets_pod_error() {
        let mut backend = MockBackend::default();
        backend
            .pods
            .insert("app=web".to_string(), vec![pod("p1", "web-1")]);
        let mut driver = StatusDriver::new(Arc::new(backend));
        let mut view = StatusView::new(Arc::new(LatestError::new()), 100);

        driver.execute(view.set_selectors(Some(vec!["app=web".to_string()])));
        driver.execute(view.set_release(release("web")));
        pump_until(&mut driver, &mut view, |view| {
            view.tracker("uid-web").is_some_and(|t| !t.pods().is_empty())
        })
        .await;

        driver.execute(view.select_pod("uid-web", "p1"));
        pump_until(&mut driver, &mut view, |view| {
            !view.snapshot().pod_error.is_empty()
        })
        .await;
        assert_eq!(view.snapshot().pod_error, "pod web-1 not found");
    }

    #[tokio::test]
    async fn clearing_selection_aborts_feed_task() {
        let mut backend = MockBackend {
            endless_logs: true,
            ..MockBackend::default()
        };
        backend
            .pods
            .insert("app=web".to_string(), vec![pod("p1", "web-1")]);
        backend
            .logs
            .insert("web-1".to_string(), vec!["tick".to_string()]);
        let mut driver = StatusDriver::new(Arc::new(backend));
        let mut view = StatusView::new(Arc::new(LatestError::new()), 100);

        driver.execute(view.set_selectors(Some(vec!["app=web".to_string()])));
        driver.execute(view.set_release(release("web")));
        pump_until(&mut driver, &mut view, |view| {
            view.tracker("uid-web").is_some_and(|t| !t.pods().is_empty())
        })
        .await;
        driver.execute(view.select_pod("uid-web", "p1"));
        pump_until(&mut driver, &mut view, |view| {
            !view.snapshot().log_lines.is_empty()
        })
        .await;
        assert_eq!(driver.open_feeds(), 1);

        driver.execute(view.clear_selection());
        assert_eq!(driver.open_feeds(), 0);
        assert!(view.snapshot().log_lines.is_empty());
    }
}
