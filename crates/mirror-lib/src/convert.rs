//! Conversion of Kubernetes API objects into mirrored records
//!
//! These are pure, deterministic field mappings. Anything that cannot be
//! mapped is reported as a [`ConvertError`] so the caller can skip the
//! object without affecting others.

use crate::error::ConvertError;
use crate::models::{
    ContainerState, ContainerSummary, EntityKind, NodeRecord, NodeStatus, RecordKey,
    ResourceAggregate, WorkloadKey, WorkloadRecord,
};
use crate::quantity::{self, Quantity, QuantityFormat};
use chrono::SecondsFormat;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as ApiQuantity;
use std::collections::BTreeMap;

/// Labels marking a control-plane node
pub const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Annotation the kubelet sets on static (manifest-defined) pods
pub const STATIC_POD_ANNOTATION: &str = "kubernetes.io/config.source";

pub const ROLE_CONTROL_PLANE: &str = "control-plane";
pub const ROLE_WORKER: &str = "worker";

pub const CONTROLLER_STANDALONE: &str = "Standalone";
pub const CONTROLLER_STATIC: &str = "Static";

/// Identity of a node object, if it has one
pub fn node_key(node: &corev1::Node) -> Option<RecordKey> {
    node.metadata.name.clone().map(RecordKey::Node)
}

/// Identity of a pod object, if it has one
pub fn workload_key(pod: &corev1::Pod) -> Option<RecordKey> {
    let name = pod.metadata.name.clone()?;
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    Some(RecordKey::Workload(WorkloadKey::new(namespace, name)))
}

/// Convert a node into its mirrored record
pub fn node_record(node: &corev1::Node) -> Result<NodeRecord, ConvertError> {
    let name = node
        .metadata
        .name
        .clone()
        .ok_or(ConvertError::MissingName(EntityKind::Node))?;

    let labels = node.metadata.labels.clone().unwrap_or_default();
    let status = node.status.as_ref();
    let info = status.and_then(|s| s.node_info.as_ref());

    Ok(NodeRecord {
        status: node_status(node),
        roles: node_roles(&labels),
        capacity: canonical_quantities(status.and_then(|s| s.capacity.as_ref())),
        allocatable: canonical_quantities(status.and_then(|s| s.allocatable.as_ref())),
        usage: None,
        kubelet_version: info.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
        kernel_version: info.map(|i| i.kernel_version.clone()).unwrap_or_default(),
        os_image: info.map(|i| i.os_image.clone()).unwrap_or_default(),
        container_runtime_version: info
            .map(|i| i.container_runtime_version.clone())
            .unwrap_or_default(),
        labels,
        name,
    })
}

/// Readiness from the `Ready` condition; a cordon overrides `Ready` only.
pub fn node_status(node: &corev1::Node) -> NodeStatus {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status == "True")
        .unwrap_or(false);

    if !ready {
        return NodeStatus::NotReady;
    }

    let unschedulable = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);

    if unschedulable {
        NodeStatus::Cordoned
    } else {
        NodeStatus::Ready
    }
}

/// Role set derived from node labels
pub fn node_roles(labels: &BTreeMap<String, String>) -> Vec<String> {
    let control_plane = CONTROL_PLANE_LABELS
        .iter()
        .any(|label| labels.contains_key(*label));

    if control_plane {
        vec![ROLE_CONTROL_PLANE.to_string()]
    } else {
        vec![ROLE_WORKER.to_string()]
    }
}

fn canonical_quantities(
    quantities: Option<&BTreeMap<String, ApiQuantity>>,
) -> BTreeMap<String, String> {
    quantities
        .map(|q| {
            q.iter()
                .map(|(resource, value)| (resource.clone(), quantity::canonical(&value.0)))
                .collect()
        })
        .unwrap_or_default()
}

/// Convert a pod into its mirrored record
pub fn workload_record(pod: &corev1::Pod) -> Result<WorkloadRecord, ConvertError> {
    let name = pod
        .metadata
        .name
        .clone()
        .ok_or(ConvertError::MissingName(EntityKind::Workload))?;

    let resources = resource_aggregate(pod).map_err(|source| ConvertError::Quantity {
        kind: EntityKind::Workload,
        name: name.clone(),
        source,
    })?;

    let status = pod.status.as_ref();
    let container_statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    let containers: Vec<ContainerSummary> = container_statuses
        .iter()
        .map(|cs| ContainerSummary {
            name: cs.name.clone(),
            state: container_state(cs.state.as_ref()),
            ready: cs.ready,
            restarts: cs.restart_count.max(0) as u32,
        })
        .collect();

    Ok(WorkloadRecord {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        status: workload_status(pod),
        node_name: pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        usage: None,
        ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
        start_time: status
            .and_then(|s| s.start_time.as_ref())
            .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
        restarts: containers.iter().map(|c| c.restarts).sum(),
        containers,
        resources,
        controller_type: controller_type(pod),
        name,
    })
}

fn container_state(state: Option<&corev1::ContainerState>) -> ContainerState {
    match state {
        Some(s) if s.running.is_some() => ContainerState::Running,
        Some(s) if s.waiting.is_some() => ContainerState::Waiting,
        Some(s) if s.terminated.is_some() => ContainerState::Terminated,
        _ => ContainerState::Unknown,
    }
}

/// Display status of a pod.
///
/// Priority: deletion requested, then the first failing or waiting init
/// container, then the first waiting or terminated app container, then the
/// raw phase.
pub fn workload_status(pod: &corev1::Pod) -> String {
    if pod.metadata.deletion_timestamp.is_some() {
        return "Terminating".to_string();
    }

    let status = pod.status.as_ref();

    let init_statuses = status
        .and_then(|s| s.init_container_statuses.as_deref())
        .unwrap_or_default();
    for init in init_statuses {
        let Some(state) = init.state.as_ref() else {
            continue;
        };
        if state.terminated.as_ref().is_some_and(|t| t.exit_code != 0) {
            return "Init:Error".to_string();
        }
        if let Some(reason) = state.waiting.as_ref().and_then(|w| non_empty(&w.reason)) {
            return format!("Init:{}", reason);
        }
    }

    let container_statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();
    for cs in container_statuses {
        let Some(state) = cs.state.as_ref() else {
            continue;
        };
        if let Some(reason) = state.waiting.as_ref().and_then(|w| non_empty(&w.reason)) {
            return reason.to_string();
        }
        if let Some(terminated) = state.terminated.as_ref() {
            if let Some(reason) = non_empty(&terminated.reason) {
                return reason.to_string();
            }
            return match terminated.signal {
                Some(signal) if signal != 0 => format!("Signal:{}", signal),
                _ => format!("ExitCode:{}", terminated.exit_code),
            };
        }
    }

    status.and_then(|s| s.phase.clone()).unwrap_or_default()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Controller kind owning a pod
pub fn controller_type(pod: &corev1::Pod) -> String {
    let owner = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|owners| owners.first());

    match owner {
        // Nearly every ReplicaSet is managed by a Deployment
        Some(owner) if owner.kind == "ReplicaSet" => "Deployment".to_string(),
        Some(owner) => owner.kind.clone(),
        None => {
            let is_static = pod
                .metadata
                .annotations
                .as_ref()
                .is_some_and(|a| a.contains_key(STATIC_POD_ANNOTATION));
            if is_static {
                CONTROLLER_STATIC.to_string()
            } else {
                CONTROLLER_STANDALONE.to_string()
            }
        }
    }
}

fn resource_aggregate(pod: &corev1::Pod) -> Result<ResourceAggregate, crate::error::QuantityError> {
    let mut cpu_requested = Quantity::zero(QuantityFormat::DecimalSi);
    let mut cpu_limit = Quantity::zero(QuantityFormat::DecimalSi);
    let mut memory_requested = Quantity::zero(QuantityFormat::BinarySi);
    let mut memory_limit = Quantity::zero(QuantityFormat::BinarySi);

    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();

    for container in containers {
        let Some(resources) = container.resources.as_ref() else {
            continue;
        };
        let requests = resources.requests.as_ref();
        let limits = resources.limits.as_ref();

        add_resource(&mut cpu_requested, requests, "cpu")?;
        add_resource(&mut cpu_limit, limits, "cpu")?;
        add_resource(&mut memory_requested, requests, "memory")?;
        add_resource(&mut memory_limit, limits, "memory")?;
    }

    Ok(ResourceAggregate {
        cpu_requested: cpu_requested.to_string(),
        cpu_limit: cpu_limit.to_string(),
        memory_requested: memory_requested.to_string(),
        memory_limit: memory_limit.to_string(),
    })
}

fn add_resource(
    total: &mut Quantity,
    quantities: Option<&BTreeMap<String, ApiQuantity>>,
    resource: &str,
) -> Result<(), crate::error::QuantityError> {
    if let Some(value) = quantities.and_then(|q| q.get(resource)) {
        *total += Quantity::parse(&value.0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(value: serde_json::Value) -> corev1::Pod {
        serde_json::from_value(value).unwrap()
    }

    fn node(value: serde_json::Value) -> corev1::Node {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_node_record_fields() {
        let n = node(json!({
            "metadata": {
                "name": "cp-1",
                "labels": {"node-role.kubernetes.io/control-plane": "", "zone": "a"}
            },
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "capacity": {"cpu": "4", "memory": "16374584Ki", "pods": "110"},
                "allocatable": {"cpu": "3800m", "memory": "15Gi"},
                "nodeInfo": {
                    "kubeletVersion": "v1.28.3",
                    "kernelVersion": "6.1.0",
                    "osImage": "Ubuntu 22.04",
                    "containerRuntimeVersion": "containerd://1.7.2",
                    "architecture": "amd64",
                    "bootID": "",
                    "kubeProxyVersion": "",
                    "machineID": "",
                    "operatingSystem": "linux",
                    "systemUUID": ""
                }
            }
        }));

        let record = node_record(&n).unwrap();
        assert_eq!(record.name, "cp-1");
        assert_eq!(record.status, NodeStatus::Ready);
        assert_eq!(record.roles, vec!["control-plane"]);
        assert_eq!(record.capacity["memory"], "16374584Ki");
        assert_eq!(record.allocatable["cpu"], "3800m");
        assert_eq!(record.kubelet_version, "v1.28.3");
        assert_eq!(record.container_runtime_version, "containerd://1.7.2");
        assert!(record.usage.is_none());
    }

    #[test]
    fn test_node_status_cordon_overrides_ready_only() {
        let cordoned = node(json!({
            "metadata": {"name": "n1"},
            "spec": {"unschedulable": true},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }));
        assert_eq!(node_status(&cordoned), NodeStatus::Cordoned);

        let not_ready = node(json!({
            "metadata": {"name": "n2"},
            "spec": {"unschedulable": true},
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        }));
        assert_eq!(node_status(&not_ready), NodeStatus::NotReady);

        let no_conditions = node(json!({"metadata": {"name": "n3"}}));
        assert_eq!(node_status(&no_conditions), NodeStatus::NotReady);
    }

    #[test]
    fn test_node_roles() {
        let mut labels = BTreeMap::new();
        assert_eq!(node_roles(&labels), vec!["worker"]);

        labels.insert("node-role.kubernetes.io/master".to_string(), String::new());
        labels.insert(
            "node-role.kubernetes.io/control-plane".to_string(),
            String::new(),
        );
        assert_eq!(node_roles(&labels), vec!["control-plane"]);
    }

    #[test]
    fn test_node_without_name_is_rejected() {
        let n = node(json!({"metadata": {}}));
        assert_eq!(
            node_record(&n),
            Err(ConvertError::MissingName(EntityKind::Node))
        );
    }

    #[test]
    fn test_terminating_overrides_container_states() {
        let p = pod(json!({
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "deletionTimestamp": "2024-01-01T00:00:00Z"
            },
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app", "image": "", "imageID": "", "ready": false,
                    "restartCount": 3,
                    "state": {"waiting": {"reason": "CrashLoopBackOff"}}
                }]
            }
        }));
        assert_eq!(workload_status(&p), "Terminating");
    }

    #[test]
    fn test_init_container_status() {
        let failed = pod(json!({
            "metadata": {"name": "job"},
            "status": {
                "phase": "Pending",
                "initContainerStatuses": [{
                    "name": "init", "image": "", "imageID": "", "ready": false,
                    "restartCount": 0,
                    "state": {"terminated": {"exitCode": 1}}
                }]
            }
        }));
        assert_eq!(workload_status(&failed), "Init:Error");

        let waiting = pod(json!({
            "metadata": {"name": "job"},
            "status": {
                "phase": "Pending",
                "initContainerStatuses": [{
                    "name": "init", "image": "", "imageID": "", "ready": false,
                    "restartCount": 0,
                    "state": {"waiting": {"reason": "ImagePullBackOff"}}
                }]
            }
        }));
        assert_eq!(workload_status(&waiting), "Init:ImagePullBackOff");
    }

    #[test]
    fn test_container_terminated_status() {
        let with_reason = pod(json!({
            "metadata": {"name": "p"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app", "image": "", "imageID": "", "ready": false,
                    "restartCount": 0,
                    "state": {"terminated": {"exitCode": 137, "reason": "OOMKilled"}}
                }]
            }
        }));
        assert_eq!(workload_status(&with_reason), "OOMKilled");

        let signalled = pod(json!({
            "metadata": {"name": "p"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app", "image": "", "imageID": "", "ready": false,
                    "restartCount": 0,
                    "state": {"terminated": {"exitCode": 137, "signal": 9}}
                }]
            }
        }));
        assert_eq!(workload_status(&signalled), "Signal:9");

        let exited = pod(json!({
            "metadata": {"name": "p"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app", "image": "", "imageID": "", "ready": false,
                    "restartCount": 0,
                    "state": {"terminated": {"exitCode": 2}}
                }]
            }
        }));
        assert_eq!(workload_status(&exited), "ExitCode:2");
    }

    #[test]
    fn test_phase_is_default_status() {
        let p = pod(json!({
            "metadata": {"name": "p"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app", "image": "", "imageID": "", "ready": true,
                    "restartCount": 0,
                    "state": {"running": {}}
                }]
            }
        }));
        assert_eq!(workload_status(&p), "Running");
    }

    #[test]
    fn test_controller_mapping() {
        let replica_set = pod(json!({
            "metadata": {
                "name": "web-abc",
                "ownerReferences": [{
                    "apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web", "uid": "1"
                }]
            }
        }));
        assert_eq!(controller_type(&replica_set), "Deployment");

        let daemon_set = pod(json!({
            "metadata": {
                "name": "agent-x",
                "ownerReferences": [{
                    "apiVersion": "apps/v1", "kind": "DaemonSet", "name": "agent", "uid": "2"
                }]
            }
        }));
        assert_eq!(controller_type(&daemon_set), "DaemonSet");

        let static_pod = pod(json!({
            "metadata": {
                "name": "kube-apiserver-cp-1",
                "annotations": {"kubernetes.io/config.source": "file"}
            }
        }));
        assert_eq!(controller_type(&static_pod), "Static");

        let standalone = pod(json!({"metadata": {"name": "debug"}}));
        assert_eq!(controller_type(&standalone), "Standalone");
    }

    #[test]
    fn test_workload_record_aggregates() {
        let p = pod(json!({
            "metadata": {
                "name": "web-0",
                "namespace": "shop",
                "labels": {"app": "web"}
            },
            "spec": {
                "nodeName": "worker-1",
                "containers": [
                    {"name": "app", "resources": {
                        "requests": {"cpu": "250m", "memory": "128Mi"},
                        "limits": {"cpu": "500m", "memory": "256Mi"}
                    }},
                    {"name": "sidecar", "resources": {
                        "requests": {"cpu": "750m", "memory": "128Mi"}
                    }},
                    {"name": "bare"}
                ]
            },
            "status": {
                "phase": "Running",
                "podIP": "10.0.0.7",
                "startTime": "2024-03-01T12:30:45Z",
                "containerStatuses": [
                    {"name": "app", "image": "", "imageID": "", "ready": true,
                     "restartCount": 2, "state": {"running": {}}},
                    {"name": "sidecar", "image": "", "imageID": "", "ready": false,
                     "restartCount": 1, "state": {}}
                ]
            }
        }));

        let record = workload_record(&p).unwrap();
        assert_eq!(record.name, "web-0");
        assert_eq!(record.namespace, "shop");
        assert_eq!(record.node_name, "worker-1");
        assert_eq!(record.ip, "10.0.0.7");
        assert_eq!(record.start_time, "2024-03-01T12:30:45Z");
        assert_eq!(record.restarts, 3);
        assert_eq!(record.controller_type, "Standalone");
        assert_eq!(record.containers.len(), 2);
        assert_eq!(record.containers[0].state, ContainerState::Running);
        assert_eq!(record.containers[1].state, ContainerState::Unknown);
        assert_eq!(
            record.resources,
            ResourceAggregate {
                cpu_requested: "1".to_string(),
                cpu_limit: "500m".to_string(),
                memory_requested: "256Mi".to_string(),
                memory_limit: "256Mi".to_string(),
            }
        );
    }

    #[test]
    fn test_workload_without_resources_reports_zero() {
        let p = pod(json!({"metadata": {"name": "p", "namespace": "default"}}));
        let record = workload_record(&p).unwrap();
        assert_eq!(record.resources.cpu_requested, "0");
        assert_eq!(record.resources.memory_limit, "0");
        assert_eq!(record.start_time, "");
    }

    #[test]
    fn test_bad_quantity_is_reported() {
        let p = pod(json!({
            "metadata": {"name": "p"},
            "spec": {"containers": [
                {"name": "app", "resources": {"requests": {"cpu": "lots"}}}
            ]}
        }));
        assert!(matches!(
            workload_record(&p),
            Err(ConvertError::Quantity { .. })
        ));
    }

    #[test]
    fn test_record_keys() {
        let p = pod(json!({"metadata": {"name": "p", "namespace": "ns"}}));
        assert_eq!(
            workload_key(&p),
            Some(RecordKey::Workload(WorkloadKey::new("ns", "p")))
        );

        let n = node(json!({"metadata": {}}));
        assert_eq!(node_key(&n), None);
    }
}
