use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chain_tunnel_core::prelude::{DiscoveryFailure, Requester};

/// Default time a single discovery stage may take before it is abandoned.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// State that later discovery stages build on.
///
/// `merge` folds the output of a stage into the accumulated state. Values that are already known
/// must not be overwritten.
pub trait Mergeable {
    fn merge(&mut self, other: Self);
}

/// Bounds for the state a scenario discovers and generates load from.
pub trait DiscoveredState: Mergeable + Default + std::fmt::Debug + Send + Sync + 'static {}

/// One step of progressive discovery.
///
/// A stage sees everything discovered by the stages before it and returns only what it found
/// itself.
#[async_trait]
pub trait DiscoveryStage<S: Send + Sync>: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self, state: &S, requester: &dyn Requester) -> Result<S, DiscoveryFailure>;
}

#[derive(Debug)]
pub struct DiscoveryOutcome<S> {
    pub state: S,
    pub completed: Vec<String>,
    pub failed: Vec<DiscoveryFailure>,
}

/// Runs discovery stages in order, each one against the state accumulated so far.
///
/// A failing or slow stage is logged and skipped, it never stops discovery.
pub struct DiscoveryRunner<S: Send + Sync> {
    stages: Vec<Box<dyn DiscoveryStage<S>>>,
    stage_timeout: Duration,
}

impl<S> Default for DiscoveryRunner<S>
where
    S: Mergeable + Default + Send + Sync,
{
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }
}

impl<S> DiscoveryRunner<S>
where
    S: Mergeable + Default + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl DiscoveryStage<S> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn with_stage_timeout(mut self, stage_timeout: Duration) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, requester: Arc<dyn Requester>) -> DiscoveryOutcome<S> {
        let mut outcome = DiscoveryOutcome {
            state: S::default(),
            completed: Vec::new(),
            failed: Vec::new(),
        };

        for stage in &self.stages {
            log::info!("Running discovery stage [{}]", stage.name());

            let result = tokio::time::timeout(
                self.stage_timeout,
                stage.discover(&outcome.state, requester.as_ref()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(DiscoveryFailure::new(
                    stage.name(),
                    format!("timed out after {:?}", self.stage_timeout),
                ))
            });

            match result {
                Ok(found) => {
                    log::info!("Discovery stage [{}] complete", stage.name());
                    outcome.state.merge(found);
                    outcome.completed.push(stage.name().to_string());
                }
                Err(e) => {
                    log::warn!("{}, continuing with the state discovered so far", e);
                    outcome.failed.push(e);
                }
            }
        }

        outcome
    }
}

impl<S: Send + Sync> std::fmt::Debug for DiscoveryRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRunner")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("stage_timeout", &self.stage_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_tunnel_core::prelude::{RequestDescriptor, RequestFailure, Response};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, PartialEq)]
    struct Heights(Vec<u64>);

    impl Mergeable for Heights {
        fn merge(&mut self, other: Self) {
            for h in other.0 {
                if !self.0.contains(&h) {
                    self.0.push(h);
                }
            }
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Requester for Unreachable {
        async fn send(&self, _: &RequestDescriptor) -> Result<Response, RequestFailure> {
            Err(RequestFailure::connection("refused"))
        }
    }

    struct Fixed(u64);

    #[async_trait]
    impl DiscoveryStage<Heights> for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn discover(&self, _: &Heights, _: &dyn Requester) -> Result<Heights, DiscoveryFailure> {
            Ok(Heights(vec![self.0]))
        }
    }

    struct Previous;

    #[async_trait]
    impl DiscoveryStage<Heights> for Previous {
        fn name(&self) -> &str {
            "previous"
        }

        async fn discover(&self, state: &Heights, _: &dyn Requester) -> Result<Heights, DiscoveryFailure> {
            let latest = state
                .0
                .first()
                .ok_or_else(|| DiscoveryFailure::new(self.name(), "no latest height"))?;
            Ok(Heights(vec![latest - 1]))
        }
    }

    struct Remote;

    #[async_trait]
    impl DiscoveryStage<Heights> for Remote {
        fn name(&self) -> &str {
            "remote"
        }

        async fn discover(&self, _: &Heights, requester: &dyn Requester) -> Result<Heights, DiscoveryFailure> {
            requester
                .send(&RequestDescriptor::rest_get("latest", "/latest"))
                .await
                .map_err(|e| DiscoveryFailure::from_request(self.name(), &e))?;
            Ok(Heights::default())
        }
    }

    struct Stuck;

    #[async_trait]
    impl DiscoveryStage<Heights> for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn discover(&self, _: &Heights, _: &dyn Requester) -> Result<Heights, DiscoveryFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Heights(vec![0]))
        }
    }

    #[tokio::test]
    async fn later_stages_see_earlier_state() {
        let outcome = DiscoveryRunner::new()
            .with_stage(Fixed(100))
            .with_stage(Previous)
            .run(Arc::new(Unreachable))
            .await;

        assert_eq!(Heights(vec![100, 99]), outcome.state);
        assert_eq!(vec!["fixed", "previous"], outcome.completed);
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn failed_stage_is_skipped() {
        let outcome = DiscoveryRunner::new()
            .with_stage(Previous)
            .with_stage(Remote)
            .with_stage(Fixed(7))
            .run(Arc::new(Unreachable))
            .await;

        assert_eq!(Heights(vec![7]), outcome.state);
        assert_eq!(vec!["fixed"], outcome.completed);
        assert_eq!(
            vec!["previous", "remote"],
            outcome.failed.iter().map(|f| f.stage()).collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stage_times_out() {
        let outcome = DiscoveryRunner::new()
            .with_stage(Stuck)
            .with_stage(Fixed(1))
            .with_stage_timeout(Duration::from_secs(5))
            .run(Arc::new(Unreachable))
            .await;

        assert_eq!(Heights(vec![1]), outcome.state);
        assert_eq!(1, outcome.failed.len());
        assert!(outcome.failed[0].message().contains("timed out"));
    }
}
