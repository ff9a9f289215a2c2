use crate::pods::{PodSetTracker, PodToken};

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum SelectionCursor {
    #[default]
    Unselected,
    Selected {
        controller_id: String,
        pod_uid: String,
    },
}

impl SelectionCursor {
    pub fn controller_id(&self) -> Option<&str> {
        match self {
            Self::Unselected => None,
            Self::Selected { controller_id, .. } => Some(controller_id),
        }
    }

    pub fn pod_uid(&self) -> Option<&str> {
        match self {
            Self::Unselected => None,
            Self::Selected { pod_uid, .. } => Some(pod_uid),
        }
    }

    pub fn is_selected(&self, controller_id: &str, pod_uid: &str) -> bool {
        self.controller_id() == Some(controller_id) && self.pod_uid() == Some(pod_uid)
    }

    /// Moves to `Selected` only if the pod is currently tracked under that
    /// controller. Returns true when the selection changed.
    pub fn select(&mut self, trackers: &[PodSetTracker], controller_id: &str, pod_uid: &str) -> bool {
        if !pod_exists(trackers, controller_id, pod_uid) {
            return false;
        }
        if self.is_selected(controller_id, pod_uid) {
            return false;
        }
        *self = Self::Selected {
            controller_id: controller_id.to_string(),
            pod_uid: pod_uid.to_string(),
        };
        true
    }

    pub fn clear(&mut self) -> bool {
        let changed = *self != Self::Unselected;
        *self = Self::Unselected;
        changed
    }

    /// Drops a selection whose controller or pod is gone. Returns true when
    /// the selection was cleared.
    pub fn reconcile(&mut self, trackers: &[PodSetTracker]) -> bool {
        let Self::Selected {
            controller_id,
            pod_uid,
        } = self
        else {
            return false;
        };
        if pod_exists(trackers, controller_id, pod_uid) {
            return false;
        }
        *self = Self::Unselected;
        true
    }
}

fn pod_exists(trackers: &[PodSetTracker], controller_id: &str, pod_uid: &str) -> bool {
    // last tracker wins when controller ids collide
    trackers
        .iter()
        .rev()
        .find(|tracker| tracker.controller_id() == controller_id)
        .is_some_and(|tracker| tracker.pods().contains(pod_uid))
}
