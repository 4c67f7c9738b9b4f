//! Sequential multi-user runs
//!
//! Users are processed strictly one after another, in the order given, with
//! a random pause between consecutive users to stay clear of rate limits.
//! A failure for one user becomes that user's error result and never stops
//! the run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::TimingConfig;
use crate::content::ContentSource;
use crate::error::{ConfigError, Result};
use crate::media::MediaStore;
use crate::pipeline::{PostPipeline, ReadinessDelays};
use crate::threads::ApiConnector;
use crate::types::{PostResult, User};

/// Bounds of the random pause between users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(ConfigError::InvalidValue {
                field: "timing.pacing_min".to_string(),
                reason: "must not exceed timing.pacing_max".to_string(),
            }
            .into());
        }
        Ok(Self { min, max })
    }

    /// Uniform pick from `[min, max]`
    pub fn pick(&self) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(60),
            max: Duration::from_secs(600),
        }
    }
}

impl TryFrom<&TimingConfig> for Pacing {
    type Error = crate::error::PairpostError;

    fn try_from(timing: &TimingConfig) -> Result<Self> {
        Pacing::new(timing.pacing_min, timing.pacing_max)
    }
}

pub struct Coordinator {
    connector: Arc<dyn ApiConnector>,
    pipeline: PostPipeline,
    pacing: Pacing,
}

impl Coordinator {
    pub fn new(
        connector: Arc<dyn ApiConnector>,
        media: Arc<dyn MediaStore>,
        content: Arc<dyn ContentSource>,
        delays: ReadinessDelays,
        pacing: Pacing,
    ) -> Self {
        Self {
            connector,
            pipeline: PostPipeline::new(media, content, delays),
            pacing,
        }
    }

    /// Post for every user, returning one result per user in input order
    pub async fn run(&self, users: &[User]) -> Vec<PostResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id, users = users.len());

        async {
            info!("starting run");
            let mut results = Vec::with_capacity(users.len());

            for (index, user) in users.iter().enumerate() {
                let result = match self.connector.connect(user) {
                    Ok(api) => self.pipeline.run(api.as_ref(), user).await,
                    Err(e) => {
                        error!(username = %user.username, error = %e, "could not create client");
                        PostResult::error(&user.username, format!("client setup failed: {}", e))
                    }
                };

                match &result.thread_id {
                    Some(thread_id) if result.is_success() => {
                        info!(username = %user.username, thread_id = %thread_id, "user done")
                    }
                    _ => error!(
                        username = %user.username,
                        message = result.message.as_deref().unwrap_or_default(),
                        "user failed"
                    ),
                }
                results.push(result);

                if index + 1 < users.len() {
                    let pause = self.pacing.pick();
                    info!(pause = %humantime::format_duration(pause), "pausing before next user");
                    sleep(pause).await;
                }
            }

            let summary = RunSummary::from_results(&results);
            info!(%summary, "run finished");
            results
        }
        .instrument(span)
        .await
    }
}

/// Counts and failure reasons of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn from_results(results: &[PostResult]) -> Self {
        let failures: Vec<(String, String)> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| {
                (
                    r.username.clone(),
                    r.message.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            })
            .collect();

        Self {
            succeeded: results.len() - failures.len(),
            failed: failures.len(),
            failures,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)?;
        for (username, reason) in &self.failures {
            write!(f, "; {}: {}", username, reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_pick_within_bounds() {
        let pacing = Pacing::new(Duration::from_secs(60), Duration::from_secs(600)).unwrap();
        for _ in 0..100 {
            let pause = pacing.pick();
            assert!(pause >= Duration::from_secs(60) && pause <= Duration::from_secs(600));
        }
    }

    #[test]
    fn test_pacing_degenerate_range() {
        let pacing = Pacing::new(Duration::ZERO, Duration::ZERO).unwrap();
        assert_eq!(pacing.pick(), Duration::ZERO);
    }

    #[test]
    fn test_pacing_rejects_inverted_bounds() {
        let err = Pacing::new(Duration::from_secs(10), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_pacing_from_timing() {
        let pacing = Pacing::try_from(&TimingConfig::default()).unwrap();
        assert_eq!(pacing, Pacing::default());
    }

    #[test]
    fn test_run_summary() {
        let results = vec![
            PostResult::success("alice", "t1".to_string(), None),
            PostResult::error("bob", "uploading failed: boom"),
            PostResult::success("carol", "t2".to_string(), Some("r1".to_string())),
        ];

        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.to_string(),
            "2 succeeded, 1 failed; bob: uploading failed: boom"
        );
    }

    #[test]
    fn test_run_summary_empty() {
        assert_eq!(RunSummary::from_results(&[]).to_string(), "0 succeeded, 0 failed");
    }
}
