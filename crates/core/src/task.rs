// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier and state machine.

use crate::fl::{FlSpec, UpdateEnvelope};
use crate::proplet::PropletId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a task instance.
    ///
    /// Assigned by the manager at creation time and used to correlate
    /// start/stop commands, bindings, and proplet-reported results.
    #[derive(Default)]
    pub struct TaskId;
}

/// Lifecycle state of a task.
///
/// Transitions follow `Pending -> Scheduled -> Running -> {Completed, Failed}`;
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Check whether a single-step transition to `next` is legal.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Scheduled)
                | (TaskState::Scheduled, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Scheduled => write!(f, "scheduled"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Transition that does not follow the task state DAG.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid task state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// Kind of workload the task carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Standard,
    Federated,
}

/// Execution mode for federated tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    #[default]
    Infer,
    Train,
}

/// Result payload bound to a task.
///
/// Either a federated update envelope or an opaque passthrough value from a
/// standard task. Modeled as an explicit union so the FL pipeline never has
/// to probe an unchecked map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResults {
    Update(UpdateEnvelope),
    Value(serde_json::Value),
}

impl TaskResults {
    pub fn as_update(&self) -> Option<&UpdateEnvelope> {
        match self {
            TaskResults::Update(env) => Some(env),
            TaskResults::Value(_) => None,
        }
    }
}

/// Base64 text on the wire, raw bytes in memory.
pub(crate) mod b64_file {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Caller-supplied fields for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, with = "b64_file")]
    pub file: Option<Vec<u8>>,
    #[serde(default)]
    pub cli_args: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<u64>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default)]
    pub restart_policy: Option<String>,
    #[serde(default)]
    pub monitoring_profile: Option<serde_json::Value>,
    #[serde(default)]
    pub kind: Option<TaskKind>,
    #[serde(default)]
    pub mode: Option<TaskMode>,
    #[serde(default)]
    pub fl: Option<FlSpec>,
    /// Pin the task to a specific proplet instead of consulting the scheduler.
    #[serde(default)]
    pub proplet_id: Option<PropletId>,
}

/// A task instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub image_url: String,
    /// Inline wasm binary, base64 on the wire.
    #[serde(default, with = "b64_file", skip_serializing_if = "Option::is_none")]
    pub file: Option<Vec<u8>>,
    #[serde(default)]
    pub cli_args: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<u64>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_profile: Option<serde_json::Value>,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub mode: TaskMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl: Option<FlSpec>,
    /// Proplet the task is bound to; empty until start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proplet_id: Option<PropletId>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<TaskResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Build a new pending task from caller-supplied fields.
    ///
    /// `kind` defaults to `Federated` when an FL spec is present; `mode`
    /// defaults to `Infer`.
    pub fn new(new: NewTask, id: TaskId, now_ms: u64) -> Self {
        let kind = new.kind.unwrap_or(if new.fl.is_some() {
            TaskKind::Federated
        } else {
            TaskKind::Standard
        });
        Self {
            id,
            name: new.name,
            state: TaskState::Pending,
            image_url: new.image_url,
            file: new.file,
            cli_args: new.cli_args,
            inputs: new.inputs,
            env: new.env,
            daemon: new.daemon,
            restart_policy: new.restart_policy,
            monitoring_profile: new.monitoring_profile,
            kind,
            mode: new.mode.unwrap_or_default(),
            fl: new.fl,
            proplet_id: new.proplet_id,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
            results: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// True for tasks participating in federated training rounds.
    pub fn is_fl_train(&self) -> bool {
        self.kind == TaskKind::Federated && self.mode == TaskMode::Train && self.fl.is_some()
    }

    /// Apply a single legal transition, stamping timestamps.
    pub fn transition(&mut self, next: TaskState, now_ms: u64) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at_ms = now_ms;
        match next {
            TaskState::Running => {
                if self.started_at_ms.is_none() {
                    self.started_at_ms = Some(now_ms);
                }
            }
            TaskState::Completed | TaskState::Failed => {
                if self.finished_at_ms.is_none() {
                    self.finished_at_ms = Some(now_ms);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Walk the DAG one step at a time until `target` is reached.
    ///
    /// Lets racing handlers (a result arriving while dispatch is still in
    /// flight) settle on a legal path instead of rejecting the message.
    pub fn advance_to(&mut self, target: TaskState, now_ms: u64) -> Result<(), InvalidTransition> {
        while self.state != target {
            let next = match self.state {
                TaskState::Pending => TaskState::Scheduled,
                TaskState::Scheduled => TaskState::Running,
                TaskState::Running => target,
                TaskState::Completed | TaskState::Failed => {
                    return Err(InvalidTransition {
                        from: self.state,
                        to: target,
                    });
                }
            };
            self.transition(next, now_ms)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
