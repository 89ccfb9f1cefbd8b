//! Result archival: per-test log bundles and the whole-run package.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::catalog::{Test, TestCatalog};
use crate::error::{RunError, Transport};
use crate::lab::{Lab, ResultStore, RunTarget, TestController};

/// Remote name of the plain-text digest of every test's status.
pub const DIGEST_NAME: &str = "logs.txt";

/// Remote name of a test's log bundle.
pub fn artifact_name(status: &str, test_name: &str) -> String {
    format!("{status}: {test_name}")
}

pub struct ResultsArchiver {
    controller: Arc<dyn TestController>,
    store: Arc<dyn ResultStore>,
    target: RunTarget,
    machine: String,
}

impl ResultsArchiver {
    pub fn new(lab: &Lab, target: &RunTarget) -> Self {
        Self {
            controller: lab.controller.clone(),
            store: lab.store.clone(),
            target: target.clone(),
            machine: lab.client.machine_name().to_string(),
        }
    }

    /// Package `test`'s logs on the controller, upload the bundle, then
    /// rewrite the digest from `catalog`.
    ///
    /// Not idempotent: archiving a test twice uploads its bundle twice.
    pub async fn archive(&self, test: &Test, catalog: &TestCatalog) -> Result<(), RunError> {
        let logs = self
            .controller
            .zip_result_logs(&test.id, &self.target.target_key, &self.machine, &self.target.tag)
            .await
            .transport("zip result logs")?;
        info!(test = %test.id, "Test archive created");

        let name = artifact_name(&logs.status, &logs.test_name);
        self.store
            .upload(&logs.host_logs_zip_path, &name)
            .await
            .transport("upload test archive")?;
        info!(test = %test.id, %name, "Test archive uploaded");

        self.store
            .upload_text(&catalog.digest(), DIGEST_NAME)
            .await
            .transport("upload results digest")?;
        info!("Results digest updated");

        Ok(())
    }

    /// Build the whole-run results package and upload it under the run's tag.
    pub async fn package_run(&self) -> Result<PathBuf, RunError> {
        let package = self
            .controller
            .create_results_package(&self.target.tag)
            .await
            .transport("create results package")?;
        info!(tag = %self.target.tag, "Results package created");

        self.store
            .upload(&package.host_project_package_path, &self.target.tag)
            .await
            .transport("upload results package")?;
        info!(tag = %self.target.tag, "Results package uploaded");

        Ok(package.host_project_package_path)
    }
}
