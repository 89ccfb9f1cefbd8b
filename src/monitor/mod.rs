//! Run monitor: the polling loop that follows a queued run to completion.
//!
//! Each cycle pings the lab machines, refreshes the catalog, archives tests
//! that finished since the previous cycle, reports the test that started
//! running, and stops once nothing is queued or running.

pub mod tracker;

use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, warn};

use crate::archive::ResultsArchiver;
use crate::catalog::{RunStats, Test, TestCatalog, TestId};
use crate::error::{ArchiveFailure, RunError, Transport};
use crate::lab::{Lab, RunTarget};

/// Reference page for a test, keyed by its id.
pub const TEST_REFERENCE_URL: &str = "https://docs.microsoft.com/en-us/windows-hardware/test/hlk/testref/";

/// Delays between remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    /// Wait after applying filters, before packaging results.
    pub filter_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            filter_settle: Duration::from_secs(50),
        }
    }
}

/// What the previous cycle observed.
#[derive(Debug, Default)]
struct RunState {
    last_done: HashSet<TestId>,
    last_running: Option<TestId>,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub cycles: usize,
    /// Tests that were reported as started, in order.
    pub started: Vec<TestId>,
    /// Tests whose results were archived, in order.
    pub archived: Vec<TestId>,
    pub final_stats: RunStats,
}

pub struct RunMonitor {
    catalog: TestCatalog,
    lab: Lab,
    archiver: ResultsArchiver,
    tag: String,
    timing: Timing,
    state: RunState,
}

impl RunMonitor {
    pub fn new(catalog: TestCatalog, lab: &Lab, target: &RunTarget, timing: Timing) -> Self {
        Self {
            catalog,
            archiver: ResultsArchiver::new(lab, target),
            lab: lab.clone(),
            tag: target.tag.clone(),
            timing,
            state: RunState::default(),
        }
    }

    /// Poll until every test has finished.
    ///
    /// Termination is checked before every cycle, so a target that is
    /// already finished after priming runs no cycle at all. Any transport
    /// failure ends the run. Archival failures are collected for the whole
    /// cycle and surfaced once the cycle completes.
    pub async fn run(mut self) -> Result<RunReport, RunError> {
        self.catalog.refresh(true).await?;
        if self.catalog.is_empty() {
            return Err(RunError::EmptyCatalog {
                target: self.catalog.target_key().to_string(),
            });
        }

        let mut report = RunReport {
            cycles: 0,
            started: Vec::new(),
            archived: Vec::new(),
            final_stats: self.catalog.stats(),
        };

        while !tracker::all_finished(&self.catalog) {
            if report.cycles > 0 {
                tokio::time::sleep(self.timing.poll_interval).await;
            }
            report.cycles += 1;
            self.poll_cycle(&mut report).await?;
        }

        report.final_stats = self.catalog.stats();
        info!(cycles = report.cycles, archived = report.archived.len(), "All tests finished");
        Ok(report)
    }

    async fn poll_cycle(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        self.keep_alive().await?;
        self.catalog.refresh(false).await?;

        let fresh = tracker::newly_done(&self.catalog, &self.state.last_done);
        let drained = if fresh.is_empty() {
            Ok(())
        } else {
            self.drain(&fresh, report).await
        };

        self.note_running(report);
        self.state.last_done = tracker::done_ids(&self.catalog);
        drained
    }

    async fn keep_alive(&self) -> Result<(), RunError> {
        let client = self.lab.client.keep_alive();
        match &self.lab.support {
            Some(support) => tokio::try_join!(client, support.keep_alive())
                .map(|_| ())
                .transport("keep alive"),
            None => client.await.transport("keep alive"),
        }
    }

    /// Filter once, then report and archive each newly finished test.
    async fn drain(&self, fresh: &[Test], report: &mut RunReport) -> Result<(), RunError> {
        info!(count = fresh.len(), "Applying filters on finished tests");
        self.lab
            .controller
            .apply_filters(&self.tag)
            .await
            .transport("apply filters")?;
        tokio::time::sleep(self.timing.filter_settle).await;

        // A failed publish does not skip the test's archival.
        let mut failures = Vec::new();
        for test in fresh {
            if let Err(source) = self.publish_stats().await {
                warn!(test = %test.id, error = %source, "Failed to publish run stats");
                failures.push(ArchiveFailure {
                    test: test.id.clone(),
                    op: "publish run stats",
                    source,
                });
            }

            let status = self.catalog.find(&test.id).map_or(&test.status, |t| &t.status);
            info!(test = %test.id, "{}: {}", status, test.name);
            info!("Test information page: {}{}", TEST_REFERENCE_URL, test.id);

            match self.archiver.archive(test, &self.catalog).await {
                Ok(()) => report.archived.push(test.id.clone()),
                Err(err) => {
                    warn!(test = %test.id, error = %err, "Failed to archive test results");
                    failures.push(ArchiveFailure {
                        test: test.id.clone(),
                        op: "archive results",
                        source: err.into(),
                    });
                }
            }
        }

        let stats = self.catalog.stats();
        info!(
            current = stats.current.as_deref().unwrap_or("-"),
            "<<< Passed: {} | Failed: {} | InQueue: {}",
            stats.passed,
            stats.failed,
            stats.in_queue
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunError::Archive { failures })
        }
    }

    /// No-op without a publisher, or while it is unreachable.
    async fn publish_stats(&self) -> anyhow::Result<()> {
        let Some(publisher) = &self.lab.publisher else {
            return Ok(());
        };
        if !publisher.is_reachable().await {
            return Ok(());
        }
        publisher.publish(&self.catalog.stats()).await
    }

    fn note_running(&mut self, report: &mut RunReport) {
        let running = self.catalog.current_running();
        if running.map(|t| &t.id) == self.state.last_running.as_ref() {
            return;
        }

        if let Some(test) = running {
            info!(test = %test.id, ">>> Currently running: {} [{}]", test.name, test.estimated_runtime);
            report.started.push(test.id.clone());
        }
        self.state.last_running = running.map(|t| t.id.clone());
    }
}
