//! A single certification run: list, queue, monitor, package.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, Instrument};

use crate::archive::ResultsArchiver;
use crate::catalog::TestCatalog;
use crate::dispatch::{DispatchPlan, Dispatcher};
use crate::error::RunError;
use crate::lab::{Lab, MachineConnection, RunTarget};
use crate::monitor::{RunMonitor, RunReport, Timing};

pub struct TestRun {
    lab: Lab,
    target: RunTarget,
    timing: Timing,
    id: uuid::Uuid,
}

impl TestRun {
    pub fn new(lab: Lab, target: RunTarget, timing: Timing) -> Self {
        Self {
            lab,
            target,
            timing,
            id: uuid::Uuid::new_v4(),
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Attach the support machine once it has joined the lab.
    pub fn add_support(&mut self, support: Arc<dyn MachineConnection>) {
        info!(machine = %support.machine_name(), "Support machine attached");
        self.lab.support = Some(support);
    }

    /// List the target's tests, queue the groups selected by `plan`, and
    /// monitor the run until every test has finished.
    pub async fn run(&self, plan: DispatchPlan) -> Result<RunReport, RunError> {
        let span = tracing::info_span!(
            "run",
            run_id = %self.id,
            target_key = %self.target.target_key,
            tag = %self.target.tag
        );

        async {
            let mut catalog = TestCatalog::new(self.lab.controller.clone(), &self.target.target_key);
            catalog.refresh(false).await?;
            if catalog.is_empty() {
                return Err(RunError::EmptyCatalog {
                    target: self.target.target_key.clone(),
                });
            }

            Dispatcher::new(&self.lab, &self.target)
                .dispatch(&catalog, plan)
                .await?;

            RunMonitor::new(catalog, &self.lab, &self.target, self.timing)
                .run()
                .await
        }
        .instrument(span)
        .await
    }

    /// Build the whole-run results package and upload it under the run's tag.
    pub async fn package(&self) -> Result<PathBuf, RunError> {
        ResultsArchiver::new(&self.lab, &self.target).package_run().await
    }
}
