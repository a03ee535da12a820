// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proplet registry: discovery, liveness, and task-count bookkeeping.

use crate::error::ServiceError;
use propeller_core::{names, Clock, Proplet, PropletId};
use propeller_storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::Duration;

/// Handles the proplet side of the control plane.
///
/// Liveness and task-count are the only mutable fields; everything else is
/// fixed at discovery time.
pub struct PropletRegistry<C: Clock> {
    proplets: Arc<dyn Storage<Proplet>>,
    clock: C,
    alive_timeout: Duration,
}

impl<C: Clock> PropletRegistry<C> {
    pub fn new(proplets: Arc<dyn Storage<Proplet>>, clock: C, alive_timeout: Duration) -> Self {
        Self {
            proplets,
            clock,
            alive_timeout,
        }
    }

    /// `create` control message: upsert the proplet with a generated name.
    pub async fn handle_create(&self, id: &PropletId) -> Result<(), ServiceError> {
        match self.proplets.get(id.as_str()).await {
            Ok(_) => Ok(()),
            Err(StorageError::NotFound(_)) => {
                let proplet = Proplet::new(id.clone(), names::generate());
                tracing::info!(proplet_id = %id, name = %proplet.name, "registering proplet");
                match self.proplets.create(id.as_str(), proplet).await {
                    // Concurrent create; first writer wins
                    Ok(()) | Err(StorageError::AlreadyExists(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `alive` control message: refresh liveness, auto-creating if unknown.
    pub async fn handle_alive(&self, id: &PropletId) -> Result<(), ServiceError> {
        let now_ms = self.clock.epoch_ms();
        match self.proplets.get(id.as_str()).await {
            Ok(mut proplet) => {
                proplet.record_alive(now_ms);
                self.proplets.update(id.as_str(), proplet).await?;
                Ok(())
            }
            Err(StorageError::NotFound(_)) => {
                let mut proplet = Proplet::new(id.clone(), names::generate());
                proplet.record_alive(now_ms);
                tracing::info!(proplet_id = %id, "auto-registering proplet from alive message");
                match self.proplets.create(id.as_str(), proplet).await {
                    Ok(()) | Err(StorageError::AlreadyExists(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Last-will `offline` message: mark the proplet dead immediately.
    pub async fn handle_offline(&self, id: &PropletId) -> Result<(), ServiceError> {
        match self.proplets.get(id.as_str()).await {
            Ok(mut proplet) => {
                proplet.mark_offline();
                self.proplets.update(id.as_str(), proplet).await?;
                Ok(())
            }
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(proplet_id = %id, "offline message for unknown proplet");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a proplet, recomputing `alive` from the history tail.
    pub async fn get_proplet(&self, id: &PropletId) -> Result<Proplet, ServiceError> {
        let mut proplet = self
            .proplets
            .get(id.as_str())
            .await
            .map_err(|_| ServiceError::PropletNotFound(id.to_string()))?;
        proplet.refresh_alive(self.clock.epoch_ms(), self.alive_timeout);
        Ok(proplet)
    }

    /// Page through proplets with liveness recomputed on read.
    pub async fn list_proplets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Proplet>, usize), ServiceError> {
        let now_ms = self.clock.epoch_ms();
        let (mut proplets, total) = self.proplets.list(offset, limit).await?;
        for proplet in &mut proplets {
            proplet.refresh_alive(now_ms, self.alive_timeout);
        }
        Ok((proplets, total))
    }

    /// Bump the bound-task count after a successful START.
    pub async fn increment_task_count(&self, id: &PropletId) -> Result<(), ServiceError> {
        let mut proplet = self
            .proplets
            .get(id.as_str())
            .await
            .map_err(|_| ServiceError::PropletNotFound(id.to_string()))?;
        proplet.increment_tasks();
        self.proplets.update(id.as_str(), proplet).await?;
        Ok(())
    }

    /// Drop the bound-task count, clamped at zero. A vanished proplet is not
    /// an error on the stop path.
    pub async fn decrement_task_count(&self, id: &PropletId) {
        match self.proplets.get(id.as_str()).await {
            Ok(mut proplet) => {
                proplet.decrement_tasks();
                if let Err(e) = self.proplets.update(id.as_str(), proplet).await {
                    tracing::warn!(proplet_id = %id, error = %e, "failed to persist task count");
                }
            }
            Err(_) => {
                tracing::debug!(proplet_id = %id, "decrement for unknown proplet");
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
