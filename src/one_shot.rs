// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Single-shot generation without session history.
//!
//! Results live only in this process, in a bounded [`OneShotStore`]; they are gone after a
//! restart and are not visible to other replicas.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::generate::{DiagramGenerator, GeneratedDiagram};
use crate::model::OneShotId;
use crate::session::SessionError;

pub const DEFAULT_ONE_SHOT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_ONE_SHOT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotRecord {
    pub prompt: String,
    pub source: String,
    pub filename: String,
    pub artifact: Vec<u8>,
}

#[derive(Debug)]
struct StoredRecord {
    record: OneShotRecord,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct OneShotState {
    records: HashMap<OneShotId, StoredRecord>,
    order: VecDeque<OneShotId>,
}

/// Bounded in-memory record map.
///
/// Records expire `ttl` after insertion; once `capacity` is reached the oldest record is evicted.
#[derive(Debug)]
pub struct OneShotStore {
    state: Mutex<OneShotState>,
    ttl: Duration,
    capacity: usize,
}

impl Default for OneShotStore {
    fn default() -> Self {
        Self::new(DEFAULT_ONE_SHOT_TTL, DEFAULT_ONE_SHOT_CAPACITY)
    }
}

impl OneShotStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(OneShotState::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&self, id: OneShotId, record: OneShotRecord) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut state, now);

        while state.records.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.records.remove(&oldest);
        }

        state.order.push_back(id.clone());
        state.records.insert(
            id,
            StoredRecord {
                record,
                inserted_at: now,
            },
        );
    }

    pub fn get(&self, id: &OneShotId) -> Option<OneShotRecord> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut state, Instant::now());
        state.records.get(id).map(|stored| stored.record.clone())
    }

    pub fn len(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut state, Instant::now());
        state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(&self, state: &mut OneShotState, now: Instant) {
        // `order` is insertion-ordered, so expired records are always at the front.
        while let Some(front) = state.order.front() {
            let expired = match state.records.get(front) {
                Some(stored) => now.saturating_duration_since(stored.inserted_at) >= self.ttl,
                None => true,
            };
            if !expired {
                break;
            }
            if let Some(id) = state.order.pop_front() {
                state.records.remove(&id);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotOutcome {
    pub identifier: OneShotId,
    pub filename: String,
}

#[derive(Clone)]
pub struct OneShotHandler {
    generator: Arc<dyn DiagramGenerator>,
    store: Arc<OneShotStore>,
    artifact_extension: String,
}

impl std::fmt::Debug for OneShotHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotHandler")
            .field("store", &self.store)
            .field("artifact_extension", &self.artifact_extension)
            .finish_non_exhaustive()
    }
}

impl OneShotHandler {
    pub fn new(generator: Arc<dyn DiagramGenerator>, store: Arc<OneShotStore>) -> Self {
        Self {
            generator,
            store,
            artifact_extension: "png".to_owned(),
        }
    }

    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.artifact_extension = extension.trim_start_matches('.').to_owned();
        self
    }

    pub fn store(&self) -> &OneShotStore {
        &self.store
    }

    pub async fn handle(
        &self,
        prompt: &str,
        output_name: &str,
    ) -> Result<OneShotOutcome, SessionError> {
        if prompt.trim().is_empty() {
            return Err(SessionError::InvalidInput("Prompt is required".to_owned()));
        }
        validate_output_name(output_name)?;

        let diagram = self
            .generator
            .generate(prompt)
            .await
            .and_then(GeneratedDiagram::into_usable)
            .map_err(|err| {
                tracing::warn!(error = %err, "one-shot generation failed");
                SessionError::GenerationFailed(err)
            })?;

        let identifier = OneShotId::generate();
        let filename = format!(
            "{}_{}.{}",
            output_name.trim(),
            Local::now().format("%Y%m%d_%H%M%S"),
            self.artifact_extension
        );
        self.store.insert(
            identifier.clone(),
            OneShotRecord {
                prompt: prompt.to_owned(),
                source: diagram.source,
                filename: filename.clone(),
                artifact: diagram.artifact,
            },
        );

        tracing::info!(identifier = %identifier, filename = %filename, "one-shot diagram generated");
        Ok(OneShotOutcome {
            identifier,
            filename,
        })
    }

    pub fn get(&self, identifier: &OneShotId) -> Option<OneShotRecord> {
        self.store.get(identifier)
    }
}

fn validate_output_name(output_name: &str) -> Result<(), SessionError> {
    let name = output_name.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidInput("output_filename is required".to_owned()));
    }
    if name.starts_with('.') || name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(SessionError::InvalidInput(format!(
            "output_filename must be a plain file name, got {output_name:?}"
        )));
    }
    Ok(())
}
