use crate::model::ReleaseRef;
use anyhow::Result;
use tracing::debug;

/// Identifies one fetch cycle. Results tagged with an older generation are
/// stale and must not touch state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ControllerQuery {
    pub generation: Generation,
    pub release: ReleaseRef,
}

#[derive(Debug, Default)]
pub struct ResourceFetcher {
    release: Option<ReleaseRef>,
    current: Generation,
    in_flight: bool,
}

impl ResourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) -> Option<&ReleaseRef> {
        self.release.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.current
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Switches to a new release identity. Returns false when the identity is
    /// unchanged, in which case nothing restarts.
    pub fn set_release(&mut self, release: ReleaseRef) -> bool {
        if self.release.as_ref() == Some(&release) {
            return false;
        }
        self.release = Some(release);
        self.bump();
        self.in_flight = false;
        true
    }

    /// Starts a query for the current release. Any earlier outstanding query
    /// is superseded, so at most one is live at a time.
    pub fn begin(&mut self) -> Option<Result<ControllerQuery>> {
        let release = self.release.clone()?;
        self.bump();
        if let Err(error) = release.validate() {
            self.in_flight = false;
            return Some(Err(error));
        }
        self.in_flight = true;
        Some(Ok(ControllerQuery {
            generation: self.current,
            release,
        }))
    }

    /// Accepts a completion for `generation`. Returns false for stale results.
    pub fn complete(&mut self, generation: Generation) -> bool {
        if generation != self.current {
            debug!(
                stale = generation.value(),
                current = self.current.value(),
                "dropping stale controller result"
            );
            return false;
        }
        self.in_flight = false;
        true
    }

    fn bump(&mut self) {
        self.current = Generation(self.current.0.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceFetcher;
    use crate::model::{ReleaseKind, ReleaseRef};

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

    #[test]
    fn begin_without_release_issues_nothing() {
        let mut fetcher = ResourceFetcher::new();
        assert!(fetcher.begin().is_none());
    }

    #[test]
    fn result_from_previous_release_is_stale() {
        let mut fetcher = ResourceFetcher::new();
        fetcher.set_release(release("a"));
        let first = fetcher.begin().and_then(Result::ok).map(|q| q.generation);
        fetcher.set_release(release("b"));
        let second = fetcher.begin().and_then(Result::ok).map(|q| q.generation);

        let (Some(first), Some(second)) = (first, second) else {
            panic!("queries should be issued");
        };
        assert!(!fetcher.complete(first));
        assert!(fetcher.in_flight());
        assert!(fetcher.complete(second));
        assert!(!fetcher.in_flight());
    }

    #[test]
    fn same_release_does_not_restart() {
        let mut fetcher = ResourceFetcher::new();
        assert!(fetcher.set_release(release("a")));
        let generation = fetcher.generation();
        assert!(!fetcher.set_release(release("a")));
        assert_eq!(fetcher.generation(), generation);
    }

    #[test]
    fn invalid_release_is_refused_and_not_in_flight() {
        let mut fetcher = ResourceFetcher::new();
        let mut bad = release("a");
        bad.namespace.clear();
        fetcher.set_release(bad);
        assert!(matches!(fetcher.begin(), Some(Err(_))));
        assert!(!fetcher.in_flight());
    }
}
