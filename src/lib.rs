//! certrun -- drives hardware-certification test runs against a remote
//! test-lab controller.
//!
//! This crate provides the run core (catalog, dispatch, monitoring,
//! archival) and the collaborator traits it consumes, plus a local result
//! store, a webhook status publisher, and an offline replay controller.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lab;
pub mod monitor;
pub mod notify;
pub mod run;
pub mod storage;

#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::RunConfig;
use crate::lab::replay::{ReplayConnection, ReplayController, Scenario};
use crate::lab::Lab;
use crate::monitor::RunReport;

/// Run a full certification cycle against a replayed lab scenario.
///
/// Results land in the configured storage directory; the replayed
/// controller writes its bundles into a `work` directory beneath it.
pub async fn replay(config: &RunConfig, scenario_path: &Path) -> Result<RunReport> {
    config.validate()?;
    let scenario = Scenario::load(scenario_path)?;

    // 1. Collaborators
    let store = storage::LocalStore::open(&config.storage.dir).await?;
    let controller = ReplayController::new(scenario, config.storage.dir.join("work"));
    let client = ReplayConnection::new(&config.run.machine);
    let mut lab = Lab::new(Arc::new(controller), Arc::new(client), Arc::new(store));

    if let Some(url) = &config.notify.webhook_url {
        lab = lab.with_publisher(Arc::new(notify::WebhookPublisher::new(url)?));
    }

    // 2. Run
    let mut test_run = run::TestRun::new(lab, config.target(), config.timing());
    if let Some(support) = &config.run.support_machine {
        test_run.add_support(Arc::new(ReplayConnection::new(support)));
    }
    tracing::info!(run_id = %test_run.id(), scenario = %scenario_path.display(), "Starting replayed run");

    let report = test_run.run(config.plan()).await.context("test run failed")?;

    // 3. Teardown
    if config.run.package_on_finish {
        test_run.package().await.context("packaging run results failed")?;
    }

    Ok(report)
}
