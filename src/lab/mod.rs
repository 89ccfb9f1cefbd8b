//! Collaborators the run core talks to: the lab controller, machine
//! connections, durable result storage, and the status publisher.
//!
//! Transport details live behind these traits. Every call is awaited in
//! place by the monitor; timeouts are the implementor's business.

pub mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::catalog::{RunStats, Test, TestId};

/// Result bundle produced by the controller for a single test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZippedLogs {
    pub status: String,
    #[serde(rename = "testname")]
    pub test_name: String,
    #[serde(rename = "hostlogszippath")]
    pub host_logs_zip_path: PathBuf,
}

/// Whole-run results package produced by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsPackage {
    #[serde(rename = "hostprojectpackagepath")]
    pub host_project_package_path: PathBuf,
}

/// Remote test-lab controller.
#[async_trait::async_trait]
pub trait TestController: Send + Sync {
    /// Fetch every test scheduled for `target_key`, in controller order.
    async fn list_tests(&self, target_key: &str) -> Result<Vec<Test>>;

    async fn queue_test(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
        support: Option<&str>,
    ) -> Result<()>;

    async fn apply_filters(&self, tag: &str) -> Result<()>;

    async fn zip_result_logs(
        &self,
        test_id: &TestId,
        target_key: &str,
        machine: &str,
        tag: &str,
    ) -> Result<ZippedLogs>;

    async fn create_results_package(&self, tag: &str) -> Result<ResultsPackage>;
}

/// Session with a lab machine that expires unless pinged.
#[async_trait::async_trait]
pub trait MachineConnection: Send + Sync {
    async fn keep_alive(&self) -> Result<()>;

    fn machine_name(&self) -> &str;
}

/// Durable storage for result artifacts.
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<()>;

    async fn upload_text(&self, content: &str, remote_name: &str) -> Result<()>;
}

/// External mirror of run progress (dashboard, tracker comment, webhook).
#[async_trait::async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Whether the publisher can be reached right now. Unreachable publishers are skipped.
    async fn is_reachable(&self) -> bool;

    async fn publish(&self, stats: &RunStats) -> Result<()>;
}

/// Handles to every collaborator of one run.
#[derive(Clone)]
pub struct Lab {
    pub controller: Arc<dyn TestController>,
    pub client: Arc<dyn MachineConnection>,
    pub support: Option<Arc<dyn MachineConnection>>,
    pub store: Arc<dyn ResultStore>,
    pub publisher: Option<Arc<dyn StatusPublisher>>,
}

impl Lab {
    pub fn new(
        controller: Arc<dyn TestController>,
        client: Arc<dyn MachineConnection>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            controller,
            client,
            support: None,
            store,
            publisher: None,
        }
    }

    pub fn with_support(mut self, support: Arc<dyn MachineConnection>) -> Self {
        self.support = Some(support);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn StatusPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Name of the configured support machine, if any.
    pub fn support_machine(&self) -> Option<&str> {
        self.support.as_deref().map(|s| s.machine_name())
    }
}

/// Where a run's tests are scheduled and how they are grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTarget {
    pub target_key: String,
    pub tag: String,
}

impl RunTarget {
    pub fn new(target_key: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            target_key: target_key.into(),
            tag: tag.into(),
        }
    }
}
