//! Queueing tests onto the lab controller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::support::{self, requires_support};
use crate::catalog::{Test, TestCatalog};
use crate::error::{RunError, Transport};
use crate::lab::{Lab, RunTarget, TestController};

/// Which support-requirement groups to queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub single_machine: bool,
    pub multi_machine: bool,
}

impl Default for DispatchPlan {
    fn default() -> Self {
        Self {
            single_machine: true,
            multi_machine: true,
        }
    }
}

pub struct Dispatcher {
    controller: Arc<dyn TestController>,
    target: RunTarget,
    machine: String,
    support_machine: Option<String>,
}

impl Dispatcher {
    pub fn new(lab: &Lab, target: &RunTarget) -> Self {
        Self {
            controller: lab.controller.clone(),
            target: target.clone(),
            machine: lab.client.machine_name().to_string(),
            support_machine: lab.support_machine().map(str::to_string),
        }
    }

    /// Queue a single test, attaching the support machine when the test needs one.
    pub async fn enqueue(&self, test: &Test) -> Result<(), RunError> {
        let support = support::support_identity(test, self.support_machine.as_deref());
        if support.is_none() && requires_support(test) {
            warn!(test = %test.id, name = %test.name, "Test needs a support machine but none is configured");
        }

        debug!(test = %test.id, machine = %self.machine, ?support, "Queueing test");
        self.controller
            .queue_test(&test.id, &self.target.target_key, &self.machine, &self.target.tag, support)
            .await
            .transport("queue test")
    }

    /// Queue the groups selected by `plan`: single-machine tests first, then
    /// multi-machine tests. Each test is queued at most once.
    pub async fn dispatch(&self, catalog: &TestCatalog, plan: DispatchPlan) -> Result<usize, RunError> {
        info!(tag = %self.target.tag, "Adding tests to queue");
        let (single, multi) = support::partition(catalog.tests());

        let mut queued = 0;
        for (enabled, group) in [(plan.single_machine, single), (plan.multi_machine, multi)] {
            if !enabled {
                continue;
            }
            for test in group {
                self.enqueue(test).await?;
                queued += 1;
            }
        }

        info!(queued, total = catalog.len(), "Tests queued");
        Ok(queued)
    }
}
