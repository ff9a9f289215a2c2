use crate::model::PodSummary;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PodToken(u64);

impl PodToken {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PodQuery {
    pub controller_id: String,
    pub selector: String,
    pub token: PodToken,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PodTransition {
    Appeared { uid: String, name: String },
    PhaseChanged { uid: String, from: String, to: String },
    Removed { uid: String, name: String },
}

/// Pods of one controller, ordered by discovery with unique uids.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PodSet {
    pods: Vec<PodSummary>,
}

impl PodSet {
    pub fn from_snapshot(snapshot: Vec<PodSummary>) -> Self {
        let mut pods: Vec<PodSummary> = Vec::with_capacity(snapshot.len());
        let mut positions = HashMap::<String, usize>::new();
        for pod in snapshot {
            match positions.get(&pod.uid) {
                Some(&position) => pods[position] = pod,
                None => {
                    positions.insert(pod.uid.clone(), pods.len());
                    pods.push(pod);
                }
            }
        }
        Self { pods }
    }

    pub fn pods(&self) -> &[PodSummary] {
        &self.pods
    }

    pub fn get(&self, uid: &str) -> Option<&PodSummary> {
        self.pods.iter().find(|pod| pod.uid == uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.get(uid).is_some()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    fn transitions_to(&self, next: &PodSet) -> Vec<PodTransition> {
        let mut transitions = Vec::new();
        for pod in &next.pods {
            match self.get(&pod.uid) {
                None => transitions.push(PodTransition::Appeared {
                    uid: pod.uid.clone(),
                    name: pod.name.clone(),
                }),
                Some(previous) if previous.phase != pod.phase => {
                    transitions.push(PodTransition::PhaseChanged {
                        uid: pod.uid.clone(),
                        from: previous.phase.clone(),
                        to: pod.phase.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for pod in &self.pods {
            if !next.contains(&pod.uid) {
                transitions.push(PodTransition::Removed {
                    uid: pod.uid.clone(),
                    name: pod.name.clone(),
                });
            }
        }
        transitions
    }
}

/// Live pod set of one controller. Query tokens are handed in by the owner
/// from a single counter, so tokens never repeat across tracker instances.
#[derive(Debug, Clone)]
pub struct PodSetTracker {
    controller_id: String,
    selector: Option<String>,
    pods: PodSet,
    error: Option<String>,
    first_issued: Option<PodToken>,
    last_issued: Option<PodToken>,
    resolved: Option<PodToken>,
}

impl PodSetTracker {
    pub fn new(controller_id: impl Into<String>, selector: Option<String>) -> Self {
        Self {
            controller_id: controller_id.into(),
            selector,
            pods: PodSet::default(),
            error: None,
            first_issued: None,
            last_issued: None,
            resolved: None,
        }
    }

    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn pods(&self) -> &PodSet {
        &self.pods
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_refreshing(&self) -> bool {
        self.last_issued.is_some() && self.last_issued != self.resolved
    }

    /// Starts a pod query tagged with `token`. Without a selector there is
    /// nothing to query and the set stays empty.
    pub fn begin_refresh(&mut self, token: PodToken) -> Option<PodQuery> {
        let selector = self.selector.clone()?;
        self.first_issued.get_or_insert(token);
        self.last_issued = Some(token);
        Some(PodQuery {
            controller_id: self.controller_id.clone(),
            selector,
            token,
        })
    }

    pub fn apply_snapshot(
        &mut self,
        token: PodToken,
        snapshot: Vec<PodSummary>,
    ) -> Option<Vec<PodTransition>> {
        if !self.accepts(token) {
            return None;
        }
        let next = PodSet::from_snapshot(snapshot);
        let transitions = self.pods.transitions_to(&next);
        for transition in &transitions {
            debug!(controller = %self.controller_id, ?transition, "pod transition");
        }
        self.pods = next;
        self.error = None;
        Some(transitions)
    }

    pub fn apply_error(&mut self, token: PodToken, message: impl Into<String>) -> bool {
        if !self.accepts(token) {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    /// A result lands when this tracker issued its token and nothing newer
    /// has landed yet. Overlapping queries therefore still make progress.
    fn accepts(&mut self, token: PodToken) -> bool {
        let (Some(first), Some(last)) = (self.first_issued, self.last_issued) else {
            debug!(controller = %self.controller_id, "dropping pod result nobody asked for");
            return false;
        };
        let issued_here = first <= token && token <= last;
        let newer = self.resolved.is_none_or(|resolved| token > resolved);
        if !issued_here || !newer {
            debug!(controller = %self.controller_id, ?token, "dropping stale pod result");
            return false;
        }
        self.resolved = Some(token);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{PodSet, PodSetTracker, PodToken, PodTransition};
    use crate::model::PodSummary;

    fn pod(uid: &str, phase: &str) -> PodSummary {
        PodSummary {
            uid: uid.to_string(),
            name: format!("pod-{uid}"),
            phase: phase.to_string(),
            container_names: vec!["app".to_string()],
        }
    }

    fn query(tracker: &mut PodSetTracker, counter: &mut PodToken) -> PodToken {
        *counter = counter.next();
        let Some(query) = tracker.begin_refresh(*counter) else {
            panic!("query expected");
        };
        query.token
    }

    #[test]
    fn missing_selector_issues_no_query() {
        let mut tracker = PodSetTracker::new("c1", None);
        assert!(tracker.begin_refresh(PodToken::default().next()).is_none());
        assert!(tracker.pods().is_empty());
        assert!(tracker.error().is_none());
        assert!(!tracker.is_refreshing());
    }

    #[test]
    fn snapshot_replaces_set_wholesale() {
        let mut counter = PodToken::default();
        let mut tracker = PodSetTracker::new("c1", Some("app=web".to_string()));
        let first = query(&mut tracker, &mut counter);
        tracker.apply_snapshot(first, vec![pod("a", "Running"), pod("b", "Running")]);

        let second = query(&mut tracker, &mut counter);
        let transitions = tracker
            .apply_snapshot(second, vec![pod("b", "Succeeded"), pod("c", "Pending")])
            .unwrap_or_default();

        let uids = tracker
            .pods()
            .pods()
            .iter()
            .map(|pod| pod.uid.as_str())
            .collect::<Vec<_>>();
        assert_eq!(uids, vec!["b", "c"]);
        assert!(transitions.contains(&PodTransition::Removed {
            uid: "a".to_string(),
            name: "pod-a".to_string()
        }));
        assert!(transitions.contains(&PodTransition::Appeared {
            uid: "c".to_string(),
            name: "pod-c".to_string()
        }));
        assert!(transitions.contains(&PodTransition::PhaseChanged {
            uid: "b".to_string(),
            from: "Running".to_string(),
            to: "Succeeded".to_string()
        }));
    }

    #[test]
    fn duplicate_uids_collapse_to_one_entry() {
        let set = PodSet::from_snapshot(vec![
            pod("a", "Pending"),
            pod("b", "Running"),
            pod("a", "Running"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.pods()[0].uid, "a");
        assert_eq!(set.pods()[0].phase, "Running");
    }

    #[test]
    fn older_result_after_newer_one_is_dropped() {
        let mut counter = PodToken::default();
        let mut tracker = PodSetTracker::new("c1", Some("app=web".to_string()));
        let old = query(&mut tracker, &mut counter);
        let new = query(&mut tracker, &mut counter);

        assert!(tracker.apply_snapshot(new, vec![pod("new", "Running")]).is_some());
        assert!(tracker.apply_snapshot(old, vec![pod("old", "Running")]).is_none());
        assert!(tracker.pods().contains("new"));
        assert!(!tracker.pods().contains("old"));
        assert!(!tracker.is_refreshing());
    }

    #[test]
    fn overlapping_queries_still_land_in_order() {
        let mut counter = PodToken::default();
        let mut tracker = PodSetTracker::new("c1", Some("app=web".to_string()));
        let mut previous = query(&mut tracker, &mut counter);
        for round in 0..5 {
            let current = query(&mut tracker, &mut counter);
            assert!(
                tracker
                    .apply_snapshot(previous, vec![pod(&format!("p{round}"), "Running")])
                    .is_some()
            );
            assert!(tracker.is_refreshing());
            previous = current;
        }
        assert_eq!(tracker.pods().len(), 1);
        assert!(tracker.pods().contains("p4"));
    }

    #[test]
    fn token_issued_to_another_tracker_is_rejected() {
        let mut counter = PodToken::default();
        let mut replaced = PodSetTracker::new("c1", Some("app=old".to_string()));
        let stale = query(&mut replaced, &mut counter);
        let mut tracker = PodSetTracker::new("c1", Some("app=new".to_string()));
        let fresh = query(&mut tracker, &mut counter);

        assert!(tracker.apply_snapshot(stale, vec![pod("wrong", "Running")]).is_none());
        assert!(tracker.apply_snapshot(fresh, vec![pod("right", "Running")]).is_some());
        assert!(tracker.pods().contains("right"));
    }

    #[test]
    fn error_is_scoped_and_cleared_by_next_snapshot() {
        let mut counter = PodToken::default();
        let mut tracker = PodSetTracker::new("c1", Some("app=web".to_string()));
        let token = query(&mut tracker, &mut counter);
        assert!(tracker.apply_error(token, "forbidden"));
        assert_eq!(tracker.error(), Some("forbidden"));

        let token = query(&mut tracker, &mut counter);
        tracker.apply_snapshot(token, vec![pod("a", "Running")]);
        assert!(tracker.error().is_none());
    }
}
