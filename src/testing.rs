//! Recording fakes for unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tempfile::TempDir;

use crate::catalog::{ExecutionState, RunStats, Test, TestId, TestStatus};
use crate::lab::replay::{ReplayController, Scenario};
use crate::lab::{MachineConnection, ResultStore, ResultsPackage, StatusPublisher, TestController, ZippedLogs};

pub fn test(id: &str, status: TestStatus) -> Test {
    Test {
        id: TestId::from(id),
        name: format!("test {id}"),
        estimated_runtime: "00:05:00".to_string(),
        schedule_options: Vec::new(),
        execution_state: ExecutionState::NotRunning,
        status,
    }
}

pub fn running(id: &str) -> Test {
    Test {
        execution_state: ExecutionState::Running,
        ..test(id, TestStatus::InQueue)
    }
}

/// Replay controller whose work directory is removed with the fixture.
pub struct Replay {
    pub controller: Arc<ReplayController>,
    _work_dir: TempDir,
}

pub fn replayed(polls: Vec<Vec<Test>>) -> Replay {
    replayed_with_zip_failures(polls, &[])
}

pub fn replayed_with_zip_failures(polls: Vec<Vec<Test>>, zip_failures: &[&str]) -> Replay {
    let work_dir = tempfile::tempdir().unwrap();
    let scenario = Scenario {
        polls,
        zip_failures: zip_failures.iter().map(|id| TestId::from(*id)).collect(),
    };
    Replay {
        controller: Arc::new(ReplayController::new(scenario, work_dir.path())),
        _work_dir: work_dir,
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub uploads: Mutex<Vec<(String, PathBuf)>>,
    pub texts: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn upload_names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn last_text(&self, name: &str) -> Option<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }
}

#[async_trait::async_trait]
impl ResultStore for RecordingStore {
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((remote_name.to_string(), local_path.to_path_buf()));
        Ok(())
    }

    async fn upload_text(&self, content: &str, remote_name: &str) -> Result<()> {
        self.texts
            .lock()
            .unwrap()
            .push((remote_name.to_string(), content.to_string()));
        Ok(())
    }
}

/// Store that rejects bundle uploads, digest uploads, or both.
#[derive(Default)]
pub struct FailingStore {
    pub reject_uploads: bool,
    pub reject_text: bool,
    pub accepted: RecordingStore,
}

#[async_trait::async_trait]
impl ResultStore for FailingStore {
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<()> {
        if self.reject_uploads {
            bail!("disk full");
        }
        self.accepted.upload(local_path, remote_name).await
    }

    async fn upload_text(&self, content: &str, remote_name: &str) -> Result<()> {
        if self.reject_text {
            bail!("disk full");
        }
        self.accepted.upload_text(content, remote_name).await
    }
}

pub struct RecordingPublisher {
    pub reachable: bool,
    /// Every publish call errors after being recorded.
    pub rejects: bool,
    pub published: Mutex<Vec<RunStats>>,
}

impl RecordingPublisher {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable,
            rejects: false,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            rejects: true,
            ..Self::new(true)
        }
    }
}

#[async_trait::async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn is_reachable(&self) -> bool {
        self.reachable
    }

    async fn publish(&self, stats: &RunStats) -> Result<()> {
        self.published.lock().unwrap().push(stats.clone());
        if self.rejects {
            bail!("webhook returned 502");
        }
        Ok(())
    }
}

/// Connection whose session has already expired.
pub struct DeadConnection;

#[async_trait::async_trait]
impl MachineConnection for DeadConnection {
    async fn keep_alive(&self) -> Result<()> {
        bail!("session expired")
    }

    fn machine_name(&self) -> &str {
        "dead"
    }
}

/// Replay controller that drops the connection on a given poll (1-based).
pub struct FlakyController {
    pub inner: Arc<ReplayController>,
    pub fail_on_poll: usize,
}

#[async_trait::async_trait]
impl TestController for FlakyController {
    async fn list_tests(&self, target_key: &str) -> Result<Vec<Test>> {
        if self.inner.journal().polls + 1 == self.fail_on_poll {
            bail!("connection refused");
        }
        self.inner.list_tests(target_key).await
    }

    async fn queue_test(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
        support: Option<&str>,
    ) -> Result<()> {
        self.inner.queue_test(test_id, target_key, machine, tag, support).await
    }

    async fn apply_filters(&self, tag: &str) -> Result<()> {
        self.inner.apply_filters(tag).await
    }

    async fn zip_result_logs(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
    ) -> Result<ZippedLogs> {
        self.inner.zip_result_logs(test_id, target_key, machine, tag).await
    }

    async fn create_results_package(&self, tag: &str) -> Result<ResultsPackage> {
        self.inner.create_results_package(tag).await
    }
}

/// Shared, ordered record of calls made across several fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Connection that records each keep-alive as `keep_alive <name>`.
pub struct LoggedConnection {
    pub name: String,
    pub log: CallLog,
}

#[async_trait::async_trait]
impl MachineConnection for LoggedConnection {
    async fn keep_alive(&self) -> Result<()> {
        self.log.push(format!("keep_alive {}", self.name));
        Ok(())
    }

    fn machine_name(&self) -> &str {
        &self.name
    }
}

/// Replay controller that records each `list_tests` call.
pub struct LoggedController {
    pub inner: Arc<ReplayController>,
    pub log: CallLog,
}

#[async_trait::async_trait]
impl TestController for LoggedController {
    async fn list_tests(&self, target_key: &str) -> Result<Vec<Test>> {
        self.log.push("list_tests");
        self.inner.list_tests(target_key).await
    }

    async fn queue_test(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
        support: Option<&str>,
    ) -> Result<()> {
        self.inner.queue_test(test_id, target_key, machine, tag, support).await
    }

    async fn apply_filters(&self, tag: &str) -> Result<()> {
        self.inner.apply_filters(tag).await
    }

    async fn zip_result_logs(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
    ) -> Result<ZippedLogs> {
        self.inner.zip_result_logs(test_id, target_key, machine, tag).await
    }

    async fn create_results_package(&self, tag: &str) -> Result<ResultsPackage> {
        self.inner.create_results_package(tag).await
    }
}
