// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-shot aggregation of per-client model updates.
//!
//! `json-f64` payloads get a sample-weighted mean (FedAvg); anything else is
//! concatenated opaquely. Output is deterministic for a given input sequence:
//! plain IEEE-754 accumulation, weighted sum then one divide.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indexmap::IndexMap;
use propeller_core::{UpdateEnvelope, UpdateFormat};
use thiserror::Error;

/// Delimiter between payloads on the opaque concat path.
pub const CONCAT_DELIMITER: &[u8] = b"\n---PROP-UPDATE---\n";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no samples to aggregate")]
    ZeroSamples,
    #[error("update vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("first update vector is empty")]
    EmptyVector,
    #[error("invalid base64 in update payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("invalid update payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Combine one round's updates into a single envelope.
///
/// `origin` becomes the output's `proplet_id` (`"manager"` in the manager,
/// `"aggregator"` in the operator); `global_version` must be a fresh id that
/// seeds the next round.
pub fn aggregate(
    updates: &[UpdateEnvelope],
    algorithm: &str,
    format: &UpdateFormat,
    global_version: String,
    origin: &str,
    now_ms: u64,
) -> Result<UpdateEnvelope, AggregateError> {
    if updates.is_empty() {
        return Err(AggregateError::ZeroSamples);
    }
    tracing::debug!(algorithm, format = %format, clients = updates.len(), "aggregating updates");
    let total_samples: u64 = updates.iter().map(|u| u.num_samples).sum();

    let (update_b64, out_format) = if format.is_json_f64() {
        (weighted_mean(updates, total_samples)?, UpdateFormat::JsonF64)
    } else {
        (concat(updates)?, format.clone())
    };

    let mut metrics = IndexMap::new();
    metrics.insert("num_clients".to_string(), updates.len().into());
    metrics.insert("total_samples".to_string(), total_samples.into());
    metrics.insert("aggregated_at".to_string(), now_ms.into());

    Ok(UpdateEnvelope {
        task_id: String::new(),
        job_id: updates[0].job_id.clone(),
        round_id: updates[0].round_id,
        global_version,
        proplet_id: origin.to_string(),
        num_samples: total_samples,
        update_b64,
        format: out_format,
        metrics: Some(metrics),
    })
}

/// FedAvg: `avg[i] = (Σ v_k[i] · n_k) / Σ n_k` in doubles, no compensation.
fn weighted_mean(
    updates: &[UpdateEnvelope],
    total_samples: u64,
) -> Result<String, AggregateError> {
    let mut vectors = Vec::with_capacity(updates.len());
    for update in updates {
        let bytes = update.decode_payload()?;
        let vector: Vec<f64> = serde_json::from_slice(&bytes)?;
        vectors.push(vector);
    }

    let dimension = vectors[0].len();
    if dimension == 0 {
        return Err(AggregateError::EmptyVector);
    }
    for vector in &vectors {
        if vector.len() != dimension {
            return Err(AggregateError::DimensionMismatch {
                expected: dimension,
                got: vector.len(),
            });
        }
    }
    if total_samples == 0 {
        return Err(AggregateError::ZeroSamples);
    }

    let mut sum = vec![0.0f64; dimension];
    for (vector, update) in vectors.iter().zip(updates) {
        let weight = update.num_samples as f64;
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value * weight;
        }
    }
    let total = total_samples as f64;
    let avg: Vec<f64> = sum.into_iter().map(|s| s / total).collect();

    Ok(BASE64.encode(serde_json::to_vec(&avg)?))
}

/// Opaque fallback: decoded payloads joined in insertion order.
fn concat(updates: &[UpdateEnvelope]) -> Result<String, AggregateError> {
    let mut joined = Vec::new();
    for (i, update) in updates.iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(CONCAT_DELIMITER);
        }
        joined.extend_from_slice(&update.decode_payload()?);
    }
    Ok(BASE64.encode(joined))
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
