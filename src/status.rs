use crate::backend::{ErrorSink, LogTarget};
use crate::fetch::{ControllerQuery, Generation, ResourceFetcher};
use crate::logs::{FeedScope, FeedState, FeedToken, LogStreamer};
use crate::model::{
    Controller, ControllerPayload, LogLine, PodSummary, ReleaseKind, ReleaseRef, SelectorBinding,
};
use crate::normalize::normalize_controllers;
use crate::pods::{PodQuery, PodSetTracker, PodToken};
use crate::selection::SelectionCursor;
use crate::selectors::bind_selectors_by_position;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Work the view needs done outside of itself. The driver executes these and
/// answers with [`StatusEvent`]s.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StatusCommand {
    FetchControllers(ControllerQuery),
    FetchPods {
        generation: Generation,
        cluster_id: String,
        namespace: String,
        query: PodQuery,
    },
    OpenLogFeed {
        token: FeedToken,
        target: LogTarget,
    },
    CloseLogFeed {
        token: FeedToken,
    },
}

#[derive(Debug, Clone)]
pub enum StatusEvent {
    ControllersLoaded {
        generation: Generation,
        result: Result<ControllerPayload, String>,
    },
    PodsLoaded {
        generation: Generation,
        controller_id: String,
        token: PodToken,
        result: Result<Vec<PodSummary>, String>,
    },
    LogFeedOpened {
        token: FeedToken,
    },
    LogLine {
        token: FeedToken,
        line: LogLine,
    },
    LogFeedFailed {
        token: FeedToken,
        message: String,
    },
    LogFeedEnded {
        token: FeedToken,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoadingState {
    Idle,
    Loading,
    Empty { message: &'static str },
    Populated,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Selection {
    pub controller_id: Option<String>,
    pub pod_uid: Option<String>,
    pub container: Option<String>,
    pub pod_error: String,
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub loading_state: LoadingState,
    pub controllers: Vec<Controller>,
    pub selection: Selection,
    pub log_lines: Vec<String>,
    pub pod_error: String,
}

/// Derives one selector per controller, in controller order.
pub type SelectorResolver = fn(&[Controller]) -> Vec<String>;

pub struct StatusView {
    fetcher: ResourceFetcher,
    selectors: Option<Vec<String>>,
    resolver: Option<SelectorResolver>,
    pod_token: PodToken,
    controller_loads: u64,
    loading: bool,
    loaded_once: bool,
    controllers: Vec<Controller>,
    bindings: Vec<SelectorBinding>,
    trackers: Vec<PodSetTracker>,
    cursor: SelectionCursor,
    streamer: LogStreamer,
    sink: Arc<dyn ErrorSink>,
    last_refreshed: Option<DateTime<Local>>,
}

impl StatusView {
    pub fn new(sink: Arc<dyn ErrorSink>, buffer_limit: usize) -> Self {
        Self {
            fetcher: ResourceFetcher::new(),
            selectors: None,
            resolver: None,
            pod_token: PodToken::default(),
            controller_loads: 0,
            loading: false,
            loaded_once: false,
            controllers: Vec::new(),
            bindings: Vec::new(),
            trackers: Vec::new(),
            cursor: SelectionCursor::default(),
            streamer: LogStreamer::new(buffer_limit),
            sink,
            last_refreshed: None,
        }
    }

    pub fn release(&self) -> Option<&ReleaseRef> {
        self.fetcher.release()
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn bindings(&self) -> &[SelectorBinding] {
        &self.bindings
    }

    /// Number of controller results applied so far, successful or not.
    /// Stale results do not count.
    pub fn controller_loads(&self) -> u64 {
        self.controller_loads
    }

    pub fn tracker(&self, controller_id: &str) -> Option<&PodSetTracker> {
        self.trackers
            .iter()
            .rev()
            .find(|tracker| tracker.controller_id() == controller_id)
    }

    pub fn cursor(&self) -> &SelectionCursor {
        &self.cursor
    }

    pub fn streamer(&self) -> &LogStreamer {
        &self.streamer
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Local>> {
        self.last_refreshed
    }

    pub fn loading_state(&self) -> LoadingState {
        if self.loading {
            return LoadingState::Loading;
        }
        if !self.loaded_once {
            return LoadingState::Idle;
        }
        if self.controllers.is_empty() {
            let kind = self
                .release()
                .map(|release| release.kind)
                .unwrap_or_default();
            return LoadingState::Empty {
                message: kind.empty_message(),
            };
        }
        LoadingState::Populated
    }

    pub fn selection(&self) -> Selection {
        Selection {
            controller_id: self.cursor.controller_id().map(str::to_string),
            pod_uid: self.cursor.pod_uid().map(str::to_string),
            container: self
                .streamer
                .scope()
                .and_then(|scope| scope.container.clone()),
            pod_error: self.streamer.pod_error().to_string(),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            loading_state: self.loading_state(),
            controllers: self.controllers.clone(),
            selection: self.selection(),
            log_lines: self.streamer.log_lines(),
            pod_error: self.streamer.pod_error().to_string(),
        }
    }

    /// Points the view at a release. A different identity discards all
    /// derived state and restarts the pipeline.
    pub fn set_release(&mut self, release: ReleaseRef) -> Vec<StatusCommand> {
        if !self.fetcher.set_release(release) {
            return Vec::new();
        }
        info!(release = ?self.fetcher.release().map(ToString::to_string), "release changed");

        let mut commands = Vec::new();
        self.controllers.clear();
        self.bindings.clear();
        self.trackers.clear();
        self.cursor.clear();
        commands.extend(self.close_feed());
        self.loaded_once = false;
        self.loading = true;
        commands.extend(self.begin_fetch());
        commands
    }

    /// Replaces the externally supplied selector list and re-queries pods for
    /// controllers whose selector changed.
    pub fn set_selectors(&mut self, selectors: Option<Vec<String>>) -> Vec<StatusCommand> {
        self.resolver = None;
        if self.selectors == selectors {
            return Vec::new();
        }
        self.selectors = selectors;
        self.rebind()
    }

    /// Derives selectors from every controller list as it lands instead of
    /// taking them from outside.
    pub fn derive_selectors(&mut self, resolver: SelectorResolver) -> Vec<StatusCommand> {
        self.resolver = Some(resolver);
        let selectors = Some(resolver(&self.controllers));
        if self.selectors == selectors {
            return Vec::new();
        }
        self.selectors = selectors;
        self.rebind()
    }

    /// Re-fetches the controller list for the current release.
    pub fn refresh(&mut self) -> Vec<StatusCommand> {
        self.begin_fetch()
    }

    /// Re-queries every pod set without touching the controller list.
    pub fn refresh_pods(&mut self) -> Vec<StatusCommand> {
        let Some(release) = self.fetcher.release().cloned() else {
            return Vec::new();
        };
        let generation = self.fetcher.generation();
        let mut commands = Vec::new();
        for tracker in &mut self.trackers {
            if tracker.selector().is_none() {
                continue;
            }
            self.pod_token = self.pod_token.next();
            if let Some(query) = tracker.begin_refresh(self.pod_token) {
                commands.push(StatusCommand::FetchPods {
                    generation,
                    cluster_id: release.cluster_id.clone(),
                    namespace: release.namespace.clone(),
                    query,
                });
            }
        }
        commands
    }

    pub fn select_pod(&mut self, controller_id: &str, pod_uid: &str) -> Vec<StatusCommand> {
        if self.cursor.is_selected(controller_id, pod_uid) {
            // reselecting a failed or finished feed retries it
            if matches!(self.streamer.state(), FeedState::Failed | FeedState::Ended) {
                let container = self
                    .streamer
                    .scope()
                    .and_then(|scope| scope.container.clone());
                return self.reopen_feed(container);
            }
            return Vec::new();
        }
        if !self.cursor.select(&self.trackers, controller_id, pod_uid) {
            debug!(controller = controller_id, pod = pod_uid, "ignoring selection of unknown pod");
            return Vec::new();
        }
        let container = self
            .selected_pod()
            .and_then(|pod| pod.default_container().map(str::to_string));
        self.reopen_feed(container)
    }

    pub fn select_container(&mut self, container: &str) -> Vec<StatusCommand> {
        let Some(pod) = self.selected_pod() else {
            return Vec::new();
        };
        if !pod.container_names.iter().any(|name| name == container) {
            return Vec::new();
        }
        let current = self
            .streamer
            .scope()
            .and_then(|scope| scope.container.as_deref());
        if current == Some(container) {
            return Vec::new();
        }
        self.reopen_feed(Some(container.to_string()))
    }

    pub fn clear_selection(&mut self) -> Vec<StatusCommand> {
        if !self.cursor.clear() {
            return Vec::new();
        }
        self.close_feed()
    }

    pub fn selected_pod(&self) -> Option<&PodSummary> {
        let controller_id = self.cursor.controller_id()?;
        let pod_uid = self.cursor.pod_uid()?;
        self.tracker(controller_id)?.pods().get(pod_uid)
    }

    pub fn apply(&mut self, event: StatusEvent) -> Vec<StatusCommand> {
        match event {
            StatusEvent::ControllersLoaded { generation, result } => {
                self.apply_controllers(generation, result)
            }
            StatusEvent::PodsLoaded {
                generation,
                controller_id,
                token,
                result,
            } => self.apply_pods(generation, &controller_id, token, result),
            StatusEvent::LogFeedOpened { token } => {
                self.streamer.feed_opened(token);
                Vec::new()
            }
            StatusEvent::LogLine { token, line } => {
                self.streamer.append(token, line);
                Vec::new()
            }
            StatusEvent::LogFeedFailed { token, message } => {
                if self.streamer.feed_failed(token, message) {
                    debug!(pod_error = self.streamer.pod_error(), "log feed failed");
                }
                Vec::new()
            }
            StatusEvent::LogFeedEnded { token } => {
                self.streamer.feed_ended(token);
                Vec::new()
            }
        }
    }

    fn begin_fetch(&mut self) -> Vec<StatusCommand> {
        match self.fetcher.begin() {
            None => Vec::new(),
            Some(Ok(query)) => vec![StatusCommand::FetchControllers(query)],
            Some(Err(error)) => self.fail_fetch(format!("{error:#}")),
        }
    }

    fn apply_controllers(
        &mut self,
        generation: Generation,
        result: Result<ControllerPayload, String>,
    ) -> Vec<StatusCommand> {
        if !self.fetcher.complete(generation) {
            return Vec::new();
        }
        self.controller_loads += 1;
        match result {
            Ok(payload) => {
                let expected = self
                    .release()
                    .map(|release| release.kind)
                    .unwrap_or(ReleaseKind::Standard);
                if payload.kind() != expected {
                    warn!(
                        expected = %expected,
                        got = %payload.kind(),
                        "controller payload kind differs from release kind"
                    );
                }
                self.controllers = normalize_controllers(payload);
                self.loading = false;
                self.loaded_once = true;
                self.last_refreshed = Some(Local::now());
                debug!(count = self.controllers.len(), "controllers loaded");
                if let Some(resolver) = self.resolver {
                    self.selectors = Some(resolver(&self.controllers));
                }
                self.rebind()
            }
            Err(message) => self.fail_fetch(message),
        }
    }

    fn fail_fetch(&mut self, message: String) -> Vec<StatusCommand> {
        warn!(error = %message, "controller fetch failed");
        self.sink.report(message);
        self.controllers.clear();
        self.bindings.clear();
        self.trackers.clear();
        self.loading = false;
        self.loaded_once = true;
        self.last_refreshed = Some(Local::now());
        let mut commands = Vec::new();
        if self.cursor.clear() {
            commands.extend(self.close_feed());
        }
        commands
    }

    fn apply_pods(
        &mut self,
        generation: Generation,
        controller_id: &str,
        token: PodToken,
        result: Result<Vec<PodSummary>, String>,
    ) -> Vec<StatusCommand> {
        if generation != self.fetcher.generation() {
            debug!(controller = controller_id, "dropping pod result from earlier cycle");
            return Vec::new();
        }
        let Some(tracker) = self
            .trackers
            .iter_mut()
            .rev()
            .find(|tracker| tracker.controller_id() == controller_id)
        else {
            return Vec::new();
        };
        match result {
            Ok(pods) => {
                if tracker.apply_snapshot(token, pods).is_none() {
                    return Vec::new();
                }
            }
            Err(message) => {
                tracker.apply_error(token, message);
                return Vec::new();
            }
        }
        self.reconcile_selection()
    }

    /// Rebuilds trackers for the current controllers and selectors. Trackers
    /// whose controller and selector are unchanged keep their pod sets.
    fn rebind(&mut self) -> Vec<StatusCommand> {
        self.bindings = bind_selectors_by_position(&self.controllers, self.selectors.as_deref());
        let mut previous = std::mem::take(&mut self.trackers);
        self.trackers = self
            .controllers
            .iter()
            .zip(self.bindings.iter())
            .map(|(controller, binding)| {
                let kept = previous.iter().position(|tracker| {
                    tracker.controller_id() == controller.id
                        && tracker.selector() == binding.selector.as_deref()
                });
                match kept {
                    Some(index) => previous.swap_remove(index),
                    None => PodSetTracker::new(controller.id.clone(), binding.selector.clone()),
                }
            })
            .collect();

        let mut commands = self.reconcile_selection();
        commands.extend(self.refresh_pods());
        commands
    }

    fn reconcile_selection(&mut self) -> Vec<StatusCommand> {
        if self.cursor.reconcile(&self.trackers) {
            info!("selected pod is gone, clearing selection");
            return self.close_feed();
        }
        Vec::new()
    }

    fn reopen_feed(&mut self, container: Option<String>) -> Vec<StatusCommand> {
        let (Some(release), Some(pod)) = (self.release().cloned(), self.selected_pod().cloned())
        else {
            return Vec::new();
        };
        let Some(controller_id) = self.cursor.controller_id().map(str::to_string) else {
            return Vec::new();
        };

        let mut commands = self.close_feed();
        let token = self.streamer.open(FeedScope {
            controller_id,
            pod_uid: pod.uid.clone(),
            container: container.clone(),
        });
        commands.push(StatusCommand::OpenLogFeed {
            token,
            target: LogTarget {
                cluster_id: release.cluster_id,
                namespace: release.namespace,
                pod_uid: pod.uid,
                pod_name: pod.name,
                container,
            },
        });
        commands
    }

    fn close_feed(&mut self) -> Vec<StatusCommand> {
        self.streamer
            .close()
            .map(|token| StatusCommand::CloseLogFeed { token })
            .into_iter()
            .collect()
    }
}
