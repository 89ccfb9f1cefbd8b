//! Test catalog: the most recent snapshot of every test scheduled for a target.
//!
//! The snapshot is replaced wholesale on each refresh and keeps the
//! controller's ordering, which is also the order used for reporting.

pub mod support;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RunError, Transport};
use crate::lab::TestController;

/// Stable identifier of a test within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub String);

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Result status reported by the controller. Unknown values pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestStatus {
    Passed,
    Failed,
    InQueue,
    Other(String),
}

impl TestStatus {
    /// Passed and Failed are terminal; a done test never reverts.
    pub fn is_done(&self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TestStatus::Passed => "Passed",
            TestStatus::Failed => "Failed",
            TestStatus::InQueue => "InQueue",
            TestStatus::Other(s) => s,
        }
    }
}

impl From<String> for TestStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Passed" => TestStatus::Passed,
            "Failed" => TestStatus::Failed,
            "InQueue" => TestStatus::InQueue,
            _ => TestStatus::Other(s),
        }
    }
}

impl From<TestStatus> for String {
    fn from(status: TestStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Transient runtime state of a test, distinct from its result status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionState {
    Running,
    #[default]
    NotRunning,
    Other(String),
}

impl ExecutionState {
    pub fn as_str(&self) -> &str {
        match self {
            ExecutionState::Running => "Running",
            ExecutionState::NotRunning => "NotRunning",
            ExecutionState::Other(s) => s,
        }
    }
}

impl From<String> for ExecutionState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Running" => ExecutionState::Running,
            "NotRunning" => ExecutionState::NotRunning,
            _ => ExecutionState::Other(s),
        }
    }
}

impl From<ExecutionState> for String {
    fn from(state: ExecutionState) -> Self {
        state.as_str().to_string()
    }
}

/// One test instance as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub id: TestId,
    pub name: String,
    #[serde(default, rename = "estimatedruntime")]
    pub estimated_runtime: String,
    #[serde(default, rename = "scheduleoptions")]
    pub schedule_options: Vec<String>,
    #[serde(default, rename = "executionstate")]
    pub execution_state: ExecutionState,
    pub status: TestStatus,
}

impl Test {
    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    pub fn is_running(&self) -> bool {
        self.execution_state == ExecutionState::Running
    }
}

/// Aggregate progress of a run, mirrored to the status publisher.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Name of the test currently executing.
    pub current: Option<String>,
    pub passed: usize,
    pub failed: usize,
    pub in_queue: usize,
    /// 1-based ordinal of the running test among finished ones. `None` while idle.
    pub current_count: Option<usize>,
    pub total: usize,
    pub captured_at: DateTime<Utc>,
}

pub struct TestCatalog {
    controller: Arc<dyn TestController>,
    target_key: String,
    tests: Vec<Test>,
}

impl TestCatalog {
    /// An empty catalog for `target_key`. Call [`TestCatalog::refresh`] before querying.
    pub fn new(controller: Arc<dyn TestController>, target_key: impl Into<String>) -> Self {
        Self {
            controller,
            target_key: target_key.into(),
            tests: Vec::new(),
        }
    }

    /// Replace the snapshot with the controller's current test list.
    pub async fn refresh(&mut self, verbose: bool) -> Result<&[Test], RunError> {
        let tests = self
            .controller
            .list_tests(&self.target_key)
            .await
            .transport("list tests")?;

        if verbose {
            info!(target_key = %self.target_key, count = tests.len(), "Fetched test list");
            for test in &tests {
                info!(test = %test.id, status = %test.status, "{}", test.name);
            }
        } else {
            debug!(target_key = %self.target_key, count = tests.len(), "Fetched test list");
        }

        self.tests = tests;
        Ok(&self.tests)
    }

    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn find(&self, id: &TestId) -> Option<&Test> {
        self.tests.iter().find(|t| &t.id == id)
    }

    pub fn count_by_status(&self, status: &TestStatus) -> usize {
        self.tests.iter().filter(|t| &t.status == status).count()
    }

    /// Passed and Failed tests, in catalog order.
    pub fn done_tests(&self) -> Vec<&Test> {
        self.tests.iter().filter(|t| t.is_done()).collect()
    }

    /// First test the controller reports as running.
    pub fn current_running(&self) -> Option<&Test> {
        self.tests.iter().find(|t| t.is_running())
    }

    pub fn stats(&self) -> RunStats {
        let current = self.current_running();
        RunStats {
            current: current.map(|t| t.name.clone()),
            passed: self.count_by_status(&TestStatus::Passed),
            failed: self.count_by_status(&TestStatus::Failed),
            in_queue: self.count_by_status(&TestStatus::InQueue),
            current_count: current.map(|_| self.done_tests().len() + 1),
            total: self.tests.len(),
            captured_at: Utc::now(),
        }
    }

    /// One `"<status>: <name>"` line per test, in catalog order.
    pub fn digest(&self) -> String {
        self.tests
            .iter()
            .map(|t| format!("{}: {}\n", t.status, t.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{replayed, test, Replay};

    async fn catalog_of(tests: Vec<Test>) -> (Replay, TestCatalog) {
        let replay = replayed(vec![tests]);
        let mut catalog = TestCatalog::new(replay.controller.clone(), "target-1");
        catalog.refresh(false).await.unwrap();
        (replay, catalog)
    }

    #[test]
    fn test_status_round_trips_unknown_values() {
        let status: TestStatus = serde_json::from_str("\"Canceled\"").unwrap();
        assert_eq!(status, TestStatus::Other("Canceled".to_string()));
        assert!(!status.is_done());
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"Canceled\"");
    }

    #[test]
    fn test_deserializes_controller_field_names() {
        let json = r#"{
            "id": "42",
            "name": "Disk Stress",
            "estimatedruntime": "00:30:00",
            "scheduleoptions": ["6"],
            "executionstate": "Running",
            "status": "InQueue"
        }"#;
        let t: Test = serde_json::from_str(json).unwrap();
        assert_eq!(t.id, TestId::from("42"));
        assert_eq!(t.schedule_options, vec!["6".to_string()]);
        assert!(t.is_running());
        assert_eq!(t.status, TestStatus::InQueue);
    }

    #[test]
    fn test_missing_execution_state_defaults_to_not_running() {
        let t: Test = serde_json::from_str(r#"{"id": "1", "name": "a", "status": "Passed"}"#).unwrap();
        assert_eq!(t.execution_state, ExecutionState::NotRunning);
        assert!(t.schedule_options.is_empty());
    }

    #[tokio::test]
    async fn test_done_tests_keeps_catalog_order() {
        let (_replay, catalog) = catalog_of(vec![
            test("3", TestStatus::Failed),
            test("1", TestStatus::InQueue),
            test("2", TestStatus::Passed),
            test("4", TestStatus::Other("Canceled".into())),
        ])
        .await;

        let ids: Vec<_> = catalog.done_tests().iter().map(|t| t.id.0.clone()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[tokio::test]
    async fn test_queries() {
        let mut running = test("2", TestStatus::InQueue);
        running.execution_state = ExecutionState::Running;
        let (_replay, catalog) = catalog_of(vec![
            test("1", TestStatus::Passed),
            running,
            test("3", TestStatus::InQueue),
        ])
        .await;

        assert_eq!(catalog.count_by_status(&TestStatus::InQueue), 2);
        assert_eq!(catalog.count_by_status(&TestStatus::Failed), 0);
        assert_eq!(catalog.current_running().map(|t| t.id.0.as_str()), Some("2"));
        assert!(catalog.find(&TestId::from("3")).is_some());
        assert!(catalog.find(&TestId::from("9")).is_none());

        let stats = catalog.stats();
        assert_eq!(stats.current.as_deref(), Some("test 2"));
        assert_eq!((stats.passed, stats.failed, stats.in_queue, stats.total), (1, 0, 2, 3));
        assert_eq!(stats.current_count, Some(2));
    }

    #[tokio::test]
    async fn test_current_count_absent_when_idle() {
        let (_replay, catalog) = catalog_of(vec![test("1", TestStatus::Passed)]).await;
        assert!(catalog.current_running().is_none());
        assert_eq!(catalog.stats().current_count, None);
    }

    #[tokio::test]
    async fn test_digest_lists_every_test() {
        let (_replay, catalog) = catalog_of(vec![
            test("1", TestStatus::Passed),
            test("2", TestStatus::InQueue),
        ])
        .await;
        assert_eq!(catalog.digest(), "Passed: test 1\nInQueue: test 2\n");
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let replay = replayed(vec![
            vec![test("1", TestStatus::InQueue), test("2", TestStatus::InQueue)],
            vec![test("2", TestStatus::Passed)],
        ]);
        let mut catalog = TestCatalog::new(replay.controller.clone(), "target-1");
        assert_eq!(catalog.refresh(true).await.unwrap().len(), 2);
        assert_eq!(catalog.refresh(false).await.unwrap().len(), 1);
        assert!(catalog.find(&TestId::from("1")).is_none());
    }
}
