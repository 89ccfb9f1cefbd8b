//! Offline lab replay.
//!
//! A scenario is a list of catalog snapshots, one per poll. Once the list is
//! exhausted the last snapshot is served forever. Result bundles are written
//! as placeholder files into a work directory so that the archival path can
//! be exercised end to end without a lab.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MachineConnection, ResultsPackage, TestController, ZippedLogs};
use crate::catalog::{Test, TestId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Catalog returned by each successive `list_tests` call.
    pub polls: Vec<Vec<Test>>,
    /// Tests whose result packaging the controller rejects.
    #[serde(default)]
    pub zip_failures: Vec<TestId>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
        let scenario: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scenario file: {}", path.display()))?;
        Ok(scenario)
    }
}

/// Every call the replay controller has served.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub polls: usize,
    pub queued: Vec<(TestId, Option<String>)>,
    pub filters_applied: usize,
    pub zipped: Vec<TestId>,
    pub packages: Vec<String>,
}

pub struct ReplayController {
    scenario: Scenario,
    zip_failures: HashSet<TestId>,
    work_dir: PathBuf,
    journal: Mutex<Journal>,
}

impl ReplayController {
    pub fn new(scenario: Scenario, work_dir: impl Into<PathBuf>) -> Self {
        let zip_failures = scenario.zip_failures.iter().cloned().collect();
        Self {
            scenario,
            zip_failures,
            work_dir: work_dir.into(),
            journal: Mutex::new(Journal::default()),
        }
    }

    pub fn journal(&self) -> Journal {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot served by the `n`th poll (0-based).
    fn snapshot(&self, n: usize) -> &[Test] {
        let polls = &self.scenario.polls;
        match polls.len() {
            0 => &[],
            len => polls[n.min(len - 1)].as_slice(),
        }
    }

    /// Snapshot most recently served, or the first one before any poll.
    fn latest(&self) -> &[Test] {
        let polls = self.lock().polls;
        self.snapshot(polls.saturating_sub(1))
    }

    async fn write_placeholder(&self, file_name: &str, body: String) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .with_context(|| format!("failed to create work dir {}", self.work_dir.display()))?;
        let path = self.work_dir.join(file_name);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait::async_trait]
impl TestController for ReplayController {
    async fn list_tests(&self, target_key: &str) -> Result<Vec<Test>> {
        let poll = {
            let mut journal = self.lock();
            journal.polls += 1;
            journal.polls - 1
        };
        debug!(%target_key, poll, "Replaying test list");
        Ok(self.snapshot(poll).to_vec())
    }

    async fn queue_test(
        &self,
        test_id: &TestId,
        _target_key: &str,
        _machine: &str,
        _tag: &str,
        support: Option<&str>,
    ) -> Result<()> {
        self.lock()
            .queued
            .push((test_id.clone(), support.map(str::to_string)));
        Ok(())
    }

    async fn apply_filters(&self, _tag: &str) -> Result<()> {
        self.lock().filters_applied += 1;
        Ok(())
    }

    async fn zip_result_logs(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
    ) -> Result<ZippedLogs> {
        if self.zip_failures.contains(test_id) {
            bail!("controller could not package logs for test {test_id}");
        }
        let Some(test) = self.latest().iter().find(|t| &t.id == test_id).cloned() else {
            bail!("test {test_id} not found on target {target_key}");
        };

        let body = format!("{}\n{}\n{target_key}\n{machine}\n{tag}\n", test.id, test.status);
        let path = self.write_placeholder(&format!("{test_id}.zip"), body).await?;
        self.lock().zipped.push(test_id.clone());

        Ok(ZippedLogs {
            status: test.status.to_string(),
            test_name: test.name,
            host_logs_zip_path: path,
        })
    }

    async fn create_results_package(&self, tag: &str) -> Result<ResultsPackage> {
        let body: String = self
            .latest()
            .iter()
            .map(|t| format!("{}: {}\n", t.status, t.name))
            .collect();
        let path = self.write_placeholder(&format!("{tag}.hlkx"), body).await?;
        self.lock().packages.push(tag.to_string());

        Ok(ResultsPackage {
            host_project_package_path: path,
        })
    }
}

/// Machine connection that only counts keep-alives.
pub struct ReplayConnection {
    name: String,
    keep_alives: AtomicUsize,
}

impl ReplayConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keep_alives: AtomicUsize::new(0),
        }
    }

    pub fn keep_alives(&self) -> usize {
        self.keep_alives.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MachineConnection for ReplayConnection {
    async fn keep_alive(&self) -> Result<()> {
        self.keep_alives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn machine_name(&self) -> &str {
        &self.name
    }
}
