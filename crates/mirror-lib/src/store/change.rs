//! Change detection between consecutive versions of a record
//!
//! A replacement is observable when any inspected field differs. Usage
//! samples only take part when both versions carry one; a record gaining or
//! losing a sample is judged on its other fields alone.

use crate::models::{NodeRecord, UsageSample, WorkloadRecord};

/// Records whose replacement can be classified as observable or redundant
pub trait Observed {
    /// True when `self` differs from `prior` in a field viewers can see
    fn observably_differs(&self, prior: &Self) -> bool;

    fn usage(&self) -> Option<&UsageSample>;

    fn usage_mut(&mut self) -> &mut Option<UsageSample>;
}

fn usage_differs(a: Option<&UsageSample>, b: Option<&UsageSample>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    }
}

impl Observed for NodeRecord {
    fn observably_differs(&self, prior: &Self) -> bool {
        self.name != prior.name
            || self.status != prior.status
            || self.roles != prior.roles
            || self.labels != prior.labels
            || self.capacity != prior.capacity
            || self.allocatable != prior.allocatable
            || usage_differs(self.usage.as_ref(), prior.usage.as_ref())
            || self.kubelet_version != prior.kubelet_version
            || self.kernel_version != prior.kernel_version
            || self.os_image != prior.os_image
            || self.container_runtime_version != prior.container_runtime_version
    }

    fn usage(&self) -> Option<&UsageSample> {
        self.usage.as_ref()
    }

    fn usage_mut(&mut self) -> &mut Option<UsageSample> {
        &mut self.usage
    }
}

impl Observed for WorkloadRecord {
    fn observably_differs(&self, prior: &Self) -> bool {
        self.name != prior.name
            || self.namespace != prior.namespace
            || self.status != prior.status
            || self.node_name != prior.node_name
            || self.labels != prior.labels
            || usage_differs(self.usage.as_ref(), prior.usage.as_ref())
            || self.ip != prior.ip
            || self.start_time != prior.start_time
            || self.restarts != prior.restarts
            || self.containers != prior.containers
            || self.resources != prior.resources
            || self.controller_type != prior.controller_type
    }

    fn usage(&self) -> Option<&UsageSample> {
        self.usage.as_ref()
    }

    fn usage_mut(&mut self) -> &mut Option<UsageSample> {
        &mut self.usage
    }
}
