use crate::backend::LatestError;
use crate::input::Action;
use crate::k8s::resolve_selectors;
use crate::model::{Controller, PodSummary, ReleaseRef};
use crate::status::{StatusCommand, StatusEvent, StatusView};
use std::sync::Arc;

const LOG_PAGE: usize = 20;

pub struct App {
    view: StatusView,
    errors: LatestError,
    active_controller: usize,
    highlighted_pod: usize,
    log_scroll: Option<usize>,
    status: String,
    running: bool,
    show_help: bool,
}

impl App {
    pub fn new(buffer_limit: usize, explicit_selectors: Option<Vec<String>>) -> (Self, Vec<StatusCommand>) {
        let errors = LatestError::new();
        let mut view = StatusView::new(Arc::new(errors.clone()), buffer_limit);
        let commands = match explicit_selectors {
            Some(selectors) => view.set_selectors(Some(selectors)),
            None => view.derive_selectors(resolve_selectors),
        };
        let app = Self {
            view,
            errors,
            active_controller: 0,
            highlighted_pod: 0,
            log_scroll: None,
            status: String::new(),
            running: true,
            show_help: false,
        };
        (app, commands)
    }

    pub fn view(&self) -> &StatusView {
        &self.view
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.current()
    }

    pub fn active_controller_index(&self) -> usize {
        self.active_controller
    }

    pub fn highlighted_pod_index(&self) -> usize {
        self.highlighted_pod
    }

    pub fn log_scroll(&self) -> Option<usize> {
        self.log_scroll
    }

    pub fn active_controller(&self) -> Option<&Controller> {
        self.view.controllers().get(self.active_controller)
    }

    pub fn active_pods(&self) -> &[PodSummary] {
        self.active_controller()
            .and_then(|controller| self.view.tracker(&controller.id))
            .map(|tracker| tracker.pods().pods())
            .unwrap_or(&[])
    }

    pub fn set_release(&mut self, release: ReleaseRef) -> Vec<StatusCommand> {
        self.active_controller = 0;
        self.highlighted_pod = 0;
        self.log_scroll = None;
        self.set_status(format!("Loading {release}"));
        self.view.set_release(release)
    }

    pub fn poll(&mut self) -> Vec<StatusCommand> {
        self.view.refresh_pods()
    }

    pub fn apply_event(&mut self, event: StatusEvent) -> Vec<StatusCommand> {
        let loads = self.view.controller_loads();
        let commands = self.view.apply(event);
        if self.view.controller_loads() != loads {
            if let Some(error) = self.errors.take() {
                self.set_status(format!("Status query failed: {error}"));
            } else {
                self.set_status(format!("Loaded {} controllers", self.view.controllers().len()));
            }
        }
        self.clamp_cursor();
        commands
    }

    pub fn apply_action(&mut self, action: Action) -> Vec<StatusCommand> {
        match action {
            Action::Quit => {
                self.running = false;
                Vec::new()
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                Vec::new()
            }
            Action::NextController => {
                let total = self.view.controllers().len();
                if total > 0 {
                    self.active_controller = (self.active_controller + 1) % total;
                    self.highlighted_pod = 0;
                }
                Vec::new()
            }
            Action::PrevController => {
                let total = self.view.controllers().len();
                if total > 0 {
                    self.active_controller = (self.active_controller + total - 1) % total;
                    self.highlighted_pod = 0;
                }
                Vec::new()
            }
            Action::Down => {
                let total = self.active_pods().len();
                if total > 0 {
                    self.highlighted_pod = (self.highlighted_pod + 1).min(total - 1);
                }
                Vec::new()
            }
            Action::Up => {
                self.highlighted_pod = self.highlighted_pod.saturating_sub(1);
                Vec::new()
            }
            Action::SelectPod => {
                let Some(controller_id) = self.active_controller().map(|c| c.id.clone()) else {
                    return Vec::new();
                };
                let Some(pod) = self.active_pods().get(self.highlighted_pod).cloned() else {
                    self.set_status("No pod to select");
                    return Vec::new();
                };
                self.log_scroll = None;
                self.set_status(format!("Streaming logs for {}", pod.name));
                self.view.select_pod(&controller_id, &pod.uid)
            }
            Action::CycleContainer => {
                let Some(pod) = self.view.selected_pod().cloned() else {
                    self.set_status("Select a pod first");
                    return Vec::new();
                };
                if pod.container_names.len() < 2 {
                    return Vec::new();
                }
                let current = self.view.selection().container;
                let position = current
                    .and_then(|name| pod.container_names.iter().position(|c| *c == name))
                    .unwrap_or(0);
                let next = &pod.container_names[(position + 1) % pod.container_names.len()];
                self.log_scroll = None;
                self.set_status(format!("Streaming logs for {}:{next}", pod.name));
                self.view.select_container(next)
            }
            Action::ClearSelection => {
                self.log_scroll = None;
                self.view.clear_selection()
            }
            Action::Refresh => {
                self.set_status("Refreshing");
                self.view.refresh()
            }
            Action::LogsPageUp => {
                let total = self.view.streamer().buffer().len();
                let offset = self.log_scroll.unwrap_or(0);
                self.log_scroll = Some((offset + LOG_PAGE).min(total.saturating_sub(1)));
                Vec::new()
            }
            Action::LogsPageDown => {
                self.log_scroll = match self.log_scroll {
                    Some(offset) if offset > LOG_PAGE => Some(offset - LOG_PAGE),
                    _ => None,
                };
                Vec::new()
            }
            Action::FollowLogs => {
                self.log_scroll = None;
                Vec::new()
            }
        }
    }

    fn clamp_cursor(&mut self) {
        let total = self.view.controllers().len();
        if self.active_controller >= total {
            self.active_controller = total.saturating_sub(1);
        }
        let pods = self.active_pods().len();
        if self.highlighted_pod >= pods {
            self.highlighted_pod = pods.saturating_sub(1);
        }
    }
}
