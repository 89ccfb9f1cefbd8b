//! Support-machine classification.
//!
//! Multi-machine tests declare the requirement through their scheduling
//! options. Controllers encode it either as the numeric flag `6` or by
//! name, depending on API version.

use super::Test;

/// Scheduling options the classifier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMarker {
    RequiresMultipleMachines,
}

impl SchedulingMarker {
    pub fn parse(option: &str) -> Option<Self> {
        match option {
            "6" | "RequiresMultipleMachines" => Some(SchedulingMarker::RequiresMultipleMachines),
            _ => None,
        }
    }
}

/// Whether `test` needs a secondary machine.
pub fn requires_support(test: &Test) -> bool {
    test.schedule_options
        .iter()
        .any(|opt| SchedulingMarker::parse(opt) == Some(SchedulingMarker::RequiresMultipleMachines))
}

/// The support machine to attach when queueing `test`, if it needs one.
pub fn support_identity<'a>(test: &Test, support_machine: Option<&'a str>) -> Option<&'a str> {
    support_machine.filter(|_| requires_support(test))
}

/// Split tests into single-machine and multi-machine groups, each in catalog order.
pub fn partition(tests: &[Test]) -> (Vec<&Test>, Vec<&Test>) {
    tests.iter().partition(|t| !requires_support(t))
}
