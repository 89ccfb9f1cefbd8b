//! Completion tracking between polling cycles.

use std::collections::HashSet;

use crate::catalog::{Test, TestCatalog, TestId, TestStatus};

/// Done tests in `catalog` that were not done at the previous cycle, in
/// catalog order. Compared by id so churn in other fields never re-reports a test.
pub fn newly_done(catalog: &TestCatalog, last_done: &HashSet<TestId>) -> Vec<Test> {
    catalog
        .done_tests()
        .into_iter()
        .filter(|t| !last_done.contains(&t.id))
        .cloned()
        .collect()
}

/// Ids of every done test, used as the next cycle's baseline.
pub fn done_ids(catalog: &TestCatalog) -> HashSet<TestId> {
    catalog.done_tests().into_iter().map(|t| t.id.clone()).collect()
}

/// Nothing queued and nothing running. Vacuously true for an empty catalog.
pub fn all_finished(catalog: &TestCatalog) -> bool {
    catalog.count_by_status(&TestStatus::InQueue) == 0 && catalog.current_running().is_none()
}
