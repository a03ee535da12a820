// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result extraction from completed Kubernetes jobs.
//!
//! Ordered fallback chain, stopping at the first hit:
//! 1. Job annotation `propeller.absmach.io/result`
//! 2. The succeeded pod's terminated-container message
//! 3. ConfigMap `{job}-result`, key `result`
//! 4. Secret `{job}-result`, key `result`
//! 5. Pod annotation `propeller.absmach.io/result`
//!
//! Every source must parse as JSON to count.

use crate::crd::RESULT_ANNOTATION;
use crate::error::{Error, Result};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use propeller_core::UpdateEnvelope;
use std::collections::BTreeMap;

/// Key holding the result payload in `{job}-result` objects.
pub const RESULT_KEY: &str = "result";

/// Parse the result annotation out of an annotation map.
pub fn result_from_annotations(annotations: &BTreeMap<String, String>) -> Option<serde_json::Value> {
    annotations
        .get(RESULT_ANNOTATION)
        .and_then(|raw| serde_json::from_str(raw).ok())
}

/// Parse the terminated-container message of a finished pod.
pub fn result_from_pod_message(pod: &Pod) -> Option<serde_json::Value> {
    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;
    for status in statuses {
        let message = status
            .state
            .as_ref()
            .and_then(|s| s.terminated.as_ref())
            .and_then(|t| t.message.as_ref());
        if let Some(message) = message {
            if let Ok(value) = serde_json::from_str(message) {
                return Some(value);
            }
        }
    }
    None
}

/// Parse the `result` key of a `{job}-result` ConfigMap.
pub fn result_from_config_map(config_map: &ConfigMap) -> Option<serde_json::Value> {
    config_map
        .data
        .as_ref()?
        .get(RESULT_KEY)
        .and_then(|raw| serde_json::from_str(raw).ok())
}

/// Parse the `result` key of a `{job}-result` Secret.
pub fn result_from_secret(secret: &Secret) -> Option<serde_json::Value> {
    secret
        .data
        .as_ref()?
        .get(RESULT_KEY)
        .and_then(|bytes| serde_json::from_slice(&bytes.0).ok())
}

/// Walk the fallback chain for a completed job.
pub async fn extract_job_result(client: &Client, namespace: &str, job: &Job) -> Result<serde_json::Value> {
    let job_name = job.name_any();

    // 1. Job annotation
    if let Some(annotations) = &job.metadata.annotations {
        if let Some(value) = result_from_annotations(annotations) {
            return Ok(value);
        }
    }

    // 2 & 5 need the job's pods
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let selector = format!("job-name={job_name}");
    let pod_list = pods.list(&ListParams::default().labels(&selector)).await?;
    let succeeded: Vec<&Pod> = pod_list
        .items
        .iter()
        .filter(|p| {
            p.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Succeeded")
        })
        .collect();

    // 2. Terminated-container message
    for pod in &succeeded {
        if let Some(value) = result_from_pod_message(pod) {
            return Ok(value);
        }
    }

    // 3. ConfigMap {job}-result
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    if let Some(config_map) = config_maps.get_opt(&format!("{job_name}-result")).await? {
        if let Some(value) = result_from_config_map(&config_map) {
            return Ok(value);
        }
    }

    // 4. Secret {job}-result
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    if let Some(secret) = secrets.get_opt(&format!("{job_name}-result")).await? {
        if let Some(value) = result_from_secret(&secret) {
            return Ok(value);
        }
    }

    // 5. Pod annotation
    for pod in &succeeded {
        if let Some(annotations) = &pod.metadata.annotations {
            if let Some(value) = result_from_annotations(annotations) {
                return Ok(value);
            }
        }
    }

    Err(Error::NoResult(job_name))
}

/// Pull a validated update envelope out of an extracted result.
///
/// Probes the value itself, then `update_envelope`, then
/// `results.update_envelope`; `round_id` may arrive as a string or number.
pub fn extract_fl_update(value: &serde_json::Value) -> Result<UpdateEnvelope> {
    let candidates = [
        value,
        &value["update_envelope"],
        &value["results"]["update_envelope"],
    ];
    for candidate in candidates {
        if !candidate.is_object() {
            continue;
        }
        let Ok(envelope) = UpdateEnvelope::from_results_value(candidate) else {
            continue;
        };
        if envelope.job_id.is_empty() {
            return Err(Error::InvalidUpdate("job_id is empty".to_string()));
        }
        if envelope.round_id == 0 {
            return Err(Error::InvalidUpdate("round_id must be positive".to_string()));
        }
        if envelope.proplet_id.is_empty() {
            return Err(Error::InvalidUpdate("proplet_id is empty".to_string()));
        }
        return Ok(envelope);
    }
    Err(Error::InvalidUpdate(
        "no update envelope in result".to_string(),
    ))
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
