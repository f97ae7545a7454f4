//! Stale-while-revalidate report orchestration.
//!
//! Serving policy, per key:
//! - fresh hit: return directly;
//! - stale hit: return the stale value immediately and trigger at most
//!   one background rebuild (guarded by the cache's build lock);
//! - miss with no build in flight: build synchronously;
//! - miss with a build in flight: wait (bounded) for it and re-read.
//!
//! A failed rebuild never touches the stored value — the prior report
//! stays servable and the lock is released by the guard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::report::cache::ReportCache;
use crate::report::model::{Report, ReportKey};

/// The expensive build step, implemented over the store + provider.
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    async fn build(&self, key: &ReportKey) -> Result<Report, AnalysisError>;
}

/// A report plus whether it was served past freshness.
#[derive(Debug, Clone)]
pub struct FetchedReport {
    pub report: Report,
    pub is_stale: bool,
}

/// Cache-fronted report service.
pub struct ReportService {
    cache: ReportCache<Report>,
    builder: Arc<dyn ReportBuilder>,
    /// How long a miss will wait on another caller's in-flight build.
    wait_timeout: Duration,
}

impl ReportService {
    pub fn new(
        cache: ReportCache<Report>,
        builder: Arc<dyn ReportBuilder>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            builder,
            wait_timeout,
        }
    }

    /// Direct cache handle, shared with the admin surface.
    pub fn cache(&self) -> &ReportCache<Report> {
        &self.cache
    }

    /// Fetch a report under the stale-while-revalidate policy.
    pub async fn get_report(&self, key: &ReportKey) -> Result<FetchedReport, AnalysisError> {
        if let Some(fetched) = self.cache.get(key) {
            if !fetched.is_stale {
                return Ok(FetchedReport {
                    report: fetched.data,
                    is_stale: false,
                });
            }

            // Stale: serve immediately, rebuild in the background if no
            // build is already running for this key.
            if let Some(guard) = self.cache.begin_build(key) {
                debug!(key = %key, "Stale hit — triggering background rebuild");
                let builder = Arc::clone(&self.builder);
                let cache = self.cache.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    match builder.build(&key).await {
                        Ok(report) => {
                            cache.set(key.clone(), report);
                            info!(key = %key, "Background rebuild complete");
                        }
                        Err(e) => {
                            // Prior value stays servable.
                            warn!(key = %key, error = %e, "Background rebuild failed");
                        }
                    }
                    drop(guard);
                });
            }

            return Ok(FetchedReport {
                report: fetched.data,
                is_stale: true,
            });
        }

        // Miss: build synchronously if we win the lock, otherwise wait
        // for the in-flight build.
        match self.cache.begin_build(key) {
            Some(guard) => {
                debug!(key = %key, "Cache miss — building synchronously");
                let report = self.builder.build(key).await?;
                self.cache.set(key.clone(), report.clone());
                drop(guard);
                Ok(FetchedReport {
                    report,
                    is_stale: false,
                })
            }
            None => self.wait_for_inflight(key).await,
        }
    }

    /// Wait (bounded) for another caller's build of `key`, then re-read.
    /// If that build fails and frees the lock without storing a value,
    /// take the lock over and build synchronously.
    async fn wait_for_inflight(&self, key: &ReportKey) -> Result<FetchedReport, AnalysisError> {
        let deadline = tokio::time::Instant::now() + self.wait_timeout;
        loop {
            let notified = self.cache.build_completed();
            tokio::pin!(notified);
            // Register for wakeups before re-checking, so a release
            // landing in between is not lost.
            notified.as_mut().enable();

            if let Some(fetched) = self.cache.get(key) {
                return Ok(FetchedReport {
                    report: fetched.data,
                    is_stale: fetched.is_stale,
                });
            }
            // No value and the lock is free: the build we were waiting
            // on failed. This is our miss now.
            if let Some(guard) = self.cache.begin_build(key) {
                debug!(key = %key, "In-flight build failed — building synchronously");
                let report = self.builder.build(key).await?;
                self.cache.set(key.clone(), report.clone());
                drop(guard);
                return Ok(FetchedReport {
                    report,
                    is_stale: false,
                });
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(AnalysisError::BuildWaitTimeout {
                    key: key.to_string(),
                    timeout: self.wait_timeout,
                });
            }
        }
    }
}
