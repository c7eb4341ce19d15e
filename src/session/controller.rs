// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::Local;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::error::SessionError;
use super::sequencer::IterationSequencer;
use crate::generate::{DiagramGenerator, GeneratedDiagram, GenerationError};
use crate::model::{ArtifactRef, Session, SessionId, SessionLogEntry};
use crate::store::SessionStore;

pub const ITERATION_COMPLETED_MESSAGE: &str = "Mermaid chart iteration completed";

/// What a request asks the controller to do, decided from the request fields once at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start a new session from `prompt`.
    Create { prompt: String },
    /// Work on an existing session; refine it when `change_prompt` is present.
    Continue {
        session_id: SessionId,
        prompt: String,
        change_prompt: Option<String>,
    },
}

impl SessionCommand {
    /// Validates raw request fields.
    ///
    /// Blank `session_id` / `change_prompt` values count as absent. `prompt` is required in both
    /// shapes; it seeds new sessions and stands in for the base prompt of sessions that never
    /// recorded one. Without a `session_id` the request is an initial generation, so a
    /// `change_prompt` has nothing to refine and is dropped.
    pub fn from_fields(
        prompt: Option<&str>,
        session_id: Option<&str>,
        change_prompt: Option<&str>,
    ) -> Result<Self, SessionError> {
        let prompt = match prompt {
            Some(prompt) if !prompt.trim().is_empty() => prompt.to_owned(),
            _ => return Err(SessionError::InvalidInput("Prompt is required".to_owned())),
        };
        let change_prompt = change_prompt
            .filter(|change| !change.trim().is_empty())
            .map(str::to_owned);

        match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            None => Ok(Self::Create { prompt }),
            Some(raw) => {
                let session_id = SessionId::new(raw).map_err(|err| {
                    SessionError::InvalidInput(format!("invalid session_id {raw:?}: {err}"))
                })?;
                Ok(Self::Continue {
                    session_id,
                    prompt,
                    change_prompt,
                })
            }
        }
    }
}

/// Result of a successful session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationOutcome {
    pub message: &'static str,
    /// Index of the iteration this request produced; 0 for plain generation requests.
    pub iterations: u64,
    pub session_id: SessionId,
    pub created: bool,
}

/// Process-local exclusive locks keyed by session id.
///
/// Entries are weak so idle sessions do not accumulate; a lock lives as long as someone holds or
/// waits on it.
#[derive(Debug, Clone, Default)]
struct SessionLocks {
    inner: Arc<Mutex<HashMap<SessionId, Weak<AsyncMutex<()>>>>>,
}

impl SessionLocks {
    async fn lock(&self, session_id: &SessionId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(session_id).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    locks.insert(session_id.clone(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);
        locks.len()
    }
}

/// Drives one request through resolve → sequence → generate/refine → persist → log.
///
/// "Compute next index, refine, persist, log" runs under a per-session lock, so concurrent
/// refinements of one session in this process get consecutive indices. Separate processes
/// sharing a sessions root are not coordinated.
#[derive(Clone)]
pub struct SessionController {
    store: SessionStore,
    sequencer: IterationSequencer,
    generator: Arc<dyn DiagramGenerator>,
    locks: SessionLocks,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub fn new(store: SessionStore, generator: Arc<dyn DiagramGenerator>) -> Self {
        Self {
            sequencer: IterationSequencer::new(store.clone()),
            store,
            generator,
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn handle(&self, command: SessionCommand) -> Result<IterationOutcome, SessionError> {
        let result = match command {
            SessionCommand::Create { prompt } => self.create(&prompt).await,
            SessionCommand::Continue {
                session_id,
                prompt,
                change_prompt,
            } => {
                self.continue_session(&session_id, &prompt, change_prompt.as_deref())
                    .await
            }
        };

        match &result {
            Ok(outcome) => tracing::info!(
                session_id = %outcome.session_id,
                iterations = outcome.iterations,
                created = outcome.created,
                "session request completed"
            ),
            Err(err) => tracing::warn!(kind = err.kind(), error = %err, "session request failed"),
        }
        result
    }

    /// Loads a session with its full iteration history.
    pub fn read_session(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        Ok(self.store.open_session(session_id)?)
    }

    pub fn read_artifact(
        &self,
        session_id: &SessionId,
        index: u64,
    ) -> Result<(ArtifactRef, Vec<u8>), SessionError> {
        Ok(self.store.read_artifact(session_id, index)?)
    }

    async fn create(&self, prompt: &str) -> Result<IterationOutcome, SessionError> {
        // Generate first: a failed call must not leave an empty session directory behind.
        let diagram = self.generate(prompt).await?;

        let mut session = self.store.create_session(prompt, Local::now())?;
        let session_id = session.session_id().clone();

        let persisted =
            self.store
                .persist_iteration(&mut session, 0, "", &diagram.artifact, &diagram.source);
        if let Err(err) = persisted {
            // Nobody has seen this id yet; drop the directory so the store forgets it too.
            if let Err(cleanup) = std::fs::remove_dir_all(session.directory()) {
                tracing::warn!(
                    session_id = %session_id,
                    error = %cleanup,
                    "failed to remove session directory after persist failure"
                );
            }
            return Err(err.into());
        }
        self.write_log(&session, prompt, 0);

        Ok(IterationOutcome {
            message: ITERATION_COMPLETED_MESSAGE,
            iterations: 0,
            session_id,
            created: true,
        })
    }

    async fn continue_session(
        &self,
        session_id: &SessionId,
        prompt: &str,
        change_prompt: Option<&str>,
    ) -> Result<IterationOutcome, SessionError> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.store.open_session(session_id)?;

        let iterations = match change_prompt {
            Some(change_prompt) => self.refine_locked(&mut session, prompt, change_prompt).await?,
            None => self.regenerate_locked(&mut session, prompt).await?,
        };

        Ok(IterationOutcome {
            message: ITERATION_COMPLETED_MESSAGE,
            iterations,
            session_id: session_id.clone(),
            created: false,
        })
    }

    /// Generation against an existing session without a change instruction.
    ///
    /// Only a session that has no iterations yet records the result (as iteration 0); otherwise
    /// the history is left untouched. Either way the request reports iteration 0.
    async fn regenerate_locked(
        &self,
        session: &mut Session,
        prompt: &str,
    ) -> Result<u64, SessionError> {
        let diagram = self.generate(prompt).await?;

        if session.iterations().is_empty() {
            let base_prompt = session.base_prompt().unwrap_or(prompt).to_owned();
            let index = self.sequencer.next_index(session)?;
            self.store
                .persist_iteration(session, index, "", &diagram.artifact, &diagram.source)?;
            self.write_log(session, &base_prompt, index);
        }

        Ok(0)
    }

    /// Applies `change_prompt` on top of the newest iteration. Caller holds the session lock.
    async fn refine_locked(
        &self,
        session: &mut Session,
        request_prompt: &str,
        change_prompt: &str,
    ) -> Result<u64, SessionError> {
        let base_prompt = session.base_prompt().unwrap_or(request_prompt).to_owned();

        if session.iterations().is_empty() {
            let diagram = self.generate(&base_prompt).await?;
            let index = self.sequencer.next_index(session)?;
            self.store
                .persist_iteration(session, index, "", &diagram.artifact, &diagram.source)?;
        }

        let index = self.sequencer.next_index(session)?;
        let prior_source = match session.latest_iteration().and_then(|it| it.source()) {
            Some(source) => source.to_owned(),
            None => {
                // Artifacts without a recorded source: rebuild one from the base prompt.
                tracing::debug!(
                    session_id = %session.session_id(),
                    "no recorded source for newest iteration; regenerating from base prompt"
                );
                self.refinement_call(session, self.generator.generate(&base_prompt).await)?
                    .source
            }
        };

        let result = self
            .generator
            .refine(&base_prompt, change_prompt, &prior_source)
            .await;
        let diagram = self.refinement_call(session, result)?;

        self.store.persist_iteration(
            session,
            index,
            change_prompt,
            &diagram.artifact,
            &diagram.source,
        )?;
        self.write_log(session, &base_prompt, index);
        Ok(index)
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedDiagram, SessionError> {
        self.generator
            .generate(prompt)
            .await
            .and_then(GeneratedDiagram::into_usable)
            .map_err(SessionError::GenerationFailed)
    }

    fn refinement_call(
        &self,
        session: &Session,
        result: Result<GeneratedDiagram, GenerationError>,
    ) -> Result<GeneratedDiagram, SessionError> {
        result
            .and_then(GeneratedDiagram::into_usable)
            .map_err(|source| SessionError::RefinementFailed {
                session_id: session.session_id().clone(),
                source,
            })
    }

    /// Best-effort: numbering never reads the log back.
    fn write_log(&self, session: &Session, base_prompt: &str, iterations: u64) {
        let entry = SessionLogEntry {
            prompt: base_prompt.to_owned(),
            iterations,
        };
        if let Err(err) = self.store.write_log(session, &entry) {
            tracing::warn!(
                session_id = %session.session_id(),
                error = %err,
                "failed to write session log"
            );
        }
    }
}

#[cfg(test)]
mod tests;
