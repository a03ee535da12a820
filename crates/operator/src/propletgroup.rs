// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PropletGroup reconciler.
//!
//! Materializes the member set from Running pods matching the selector,
//! falling back to nodes when no pod matches. Per-member task counts come
//! from Jobs pinned to the member's node via `kubernetes.io/hostname`.

use crate::context::Ctx;
use crate::crd::{GroupProplet, PropletGroup, PropletGroupStatus};
use crate::error::{Error, Result};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const REQUEUE: Duration = Duration::from_secs(30);

/// Render `matchLabels` as a Kubernetes label selector string.
pub fn selector_string(match_labels: &BTreeMap<String, String>) -> String {
    match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether a node reports `Ready=True`.
pub fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Count Jobs per node, keyed by the `kubernetes.io/hostname` node selector.
pub fn jobs_per_node(jobs: &[Job]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for job in jobs {
        let hostname = job
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.node_selector.as_ref())
            .and_then(|sel| sel.get("kubernetes.io/hostname"));
        if let Some(hostname) = hostname {
            *counts.entry(hostname.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Members from Running pods matching the selector.
pub fn members_from_pods(pods: &[Pod], task_counts: &BTreeMap<String, u64>) -> Vec<GroupProplet> {
    pods.iter()
        .filter(|pod| {
            pod.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Running")
        })
        .map(|pod| {
            let node = pod.spec.as_ref().and_then(|s| s.node_name.clone());
            let task_count = node
                .as_ref()
                .and_then(|n| task_counts.get(n).copied())
                .unwrap_or(0);
            GroupProplet {
                id: pod.name_any(),
                node,
                alive: true,
                task_count,
            }
        })
        .collect()
}

/// Fallback members from nodes; alive means `NodeReady=True`.
pub fn members_from_nodes(nodes: &[Node], task_counts: &BTreeMap<String, u64>) -> Vec<GroupProplet> {
    nodes
        .iter()
        .map(|node| {
            let name = node.name_any();
            GroupProplet {
                task_count: task_counts.get(&name).copied().unwrap_or(0),
                alive: node_is_ready(node),
                node: Some(name.clone()),
                id: name,
            }
        })
        .collect()
}

pub async fn reconcile(group: Arc<PropletGroup>, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = group
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = group.name_any();
    let groups: Api<PropletGroup> = Api::namespaced(ctx.client.clone(), &namespace);

    let selector = selector_string(&group.spec.selector.match_labels);
    let list_params = if selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(&selector)
    };

    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &namespace);
    let job_list = jobs.list(&ListParams::default()).await?;
    let task_counts = jobs_per_node(&job_list.items);

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let pod_list = pods.list(&list_params).await?;
    let mut members = members_from_pods(&pod_list.items, &task_counts);

    if members.is_empty() {
        let nodes: Api<Node> = Api::all(ctx.client.clone());
        let node_list = nodes.list(&list_params).await?;
        members = members_from_nodes(&node_list.items, &task_counts);
    }

    let status = PropletGroupStatus {
        total_proplets: members.len() as u32,
        available_proplets: members.iter().filter(|m| m.alive).count() as u32,
        proplets: members,
    };
    groups
        .patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": &status })),
        )
        .await?;
    tracing::debug!(
        group = %name,
        total = status.total_proplets,
        available = status.available_proplets,
        "proplet group reconciled"
    );
    Ok(Action::requeue(REQUEUE))
}

pub fn error_policy(group: Arc<PropletGroup>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    tracing::warn!(group = %group.name_any(), %error, "proplet group reconcile failed; requeueing");
    Action::requeue(Duration::from_secs(10))
}

#[cfg(test)]
#[path = "propletgroup_tests.rs"]
mod tests;
