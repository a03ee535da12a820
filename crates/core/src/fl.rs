// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Federated-learning spec and update envelope types.
//!
//! An `FlSpec` rides on a federated task and pins it to a `(job_id, round_id)`
//! pair. Proplets answer with an `UpdateEnvelope` carrying provenance and an
//! opaque base64 payload; the manager aggregates envelopes into a new one
//! stored under [`aggregate_key`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variables injected into federated tasks at start.
pub mod env_keys {
    pub const JOB_ID: &str = "FL_JOB_ID";
    pub const ROUND_ID: &str = "FL_ROUND_ID";
    pub const GLOBAL_VERSION: &str = "FL_GLOBAL_VERSION";
    pub const FORMAT: &str = "FL_FORMAT";
    pub const MODEL_REF: &str = "FL_MODEL_REF";
    pub const NUM_SAMPLES: &str = "FL_NUM_SAMPLES";
    pub const GLOBAL_UPDATE_B64: &str = "FL_GLOBAL_UPDATE_B64";
    pub const GLOBAL_UPDATE_FORMAT: &str = "FL_GLOBAL_UPDATE_FORMAT";
}

/// Storage key for a round's aggregated record.
pub fn aggregate_key(job_id: &str, round_id: u64) -> String {
    format!("fl/{job_id}/{round_id}/aggregate")
}

/// Wire format of an update payload.
///
/// `json-f64` payloads decode to a JSON array of doubles and are eligible for
/// weighted-mean aggregation; anything else is treated as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpdateFormat {
    JsonF64,
    Other(String),
}

impl UpdateFormat {
    pub const JSON_F64: &'static str = "json-f64";

    pub fn as_str(&self) -> &str {
        match self {
            UpdateFormat::JsonF64 => Self::JSON_F64,
            UpdateFormat::Other(s) => s,
        }
    }

    pub fn is_json_f64(&self) -> bool {
        matches!(self, UpdateFormat::JsonF64)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, UpdateFormat::Other(s) if s.is_empty())
    }
}

impl Default for UpdateFormat {
    fn default() -> Self {
        UpdateFormat::JsonF64
    }
}

impl From<String> for UpdateFormat {
    fn from(s: String) -> Self {
        if s == Self::JSON_F64 {
            UpdateFormat::JsonF64
        } else {
            UpdateFormat::Other(s)
        }
    }
}

impl From<&str> for UpdateFormat {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<UpdateFormat> for String {
    fn from(f: UpdateFormat) -> Self {
        f.as_str().to_string()
    }
}

impl fmt::Display for UpdateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local training hyperparameters.
///
/// Users supply these; anything beyond the well-known trio is preserved
/// verbatim and passed through to the proplet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

fn default_algorithm() -> String {
    "fedavg".to_string()
}

/// Federated-learning spec embedded in a task.
///
/// `job_id` is stable across rounds; `round_id` starts at 1 and increases
/// monotonically. For any `(job_id, round_id)` the set of tasks is fixed at
/// round start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlSpec {
    pub job_id: String,
    pub round_id: u64,
    #[serde(default)]
    pub global_version: String,
    #[serde(default)]
    pub min_participants: u64,
    #[serde(default)]
    pub round_timeout_s: u64,
    #[serde(default)]
    pub clients_per_round: u64,
    #[serde(default)]
    pub total_rounds: u64,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub update_format: UpdateFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

impl FlSpec {
    /// True when the given envelope belongs to this spec's round.
    pub fn matches(&self, job_id: &str, round_id: u64) -> bool {
        self.job_id == job_id && self.round_id == round_id
    }
}

/// Deserialize a u64 that may arrive as a JSON number or a decimal string.
pub fn de_u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct LenientU64;

    impl serde::de::Visitor<'_> for LenientU64 {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned integer or a decimal string")
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("negative value"))
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<u64, E> {
            if v >= 0.0 && v.fract() == 0.0 {
                Ok(v as u64)
            } else {
                Err(E::custom("not a non-negative integer"))
            }
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(LenientU64)
}

/// Per-client result carrier for a federated training round.
///
/// `(job_id, round_id, proplet_id)` is the natural key; a later envelope for
/// the same proplet supersedes an earlier one within the round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    #[serde(default)]
    pub task_id: String,
    pub job_id: String,
    #[serde(deserialize_with = "de_u64_lenient")]
    pub round_id: u64,
    #[serde(default)]
    pub global_version: String,
    #[serde(default)]
    pub proplet_id: String,
    #[serde(default, deserialize_with = "de_u64_lenient")]
    pub num_samples: u64,
    pub update_b64: String,
    #[serde(default)]
    pub format: UpdateFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<IndexMap<String, serde_json::Value>>,
}

impl UpdateEnvelope {
    /// Decode from a proplet-reported `results` value, tolerating both typed
    /// and loosely JSON-shaped inputs.
    pub fn from_results_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Decode the opaque base64 payload into raw bytes.
    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.update_b64)
    }
}

#[cfg(test)]
#[path = "fl_tests.rs"]
mod tests;
