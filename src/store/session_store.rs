// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ArtifactRef, Iteration, Session, SessionId, SessionLogEntry};

const SESSION_META_FILENAME: &str = "session.meta.json";
const SESSION_LOG_FILENAME: &str = "prompt.json";
const ITERATION_ARTIFACT_PREFIX: &str = "iteration_";
const ITERATION_SOURCE_PREFIX: &str = "source_";
const TEMP_FILE_PREFIX: &str = ".session.tmp.";
const DEFAULT_ARTIFACT_EXTENSION: &str = "png";
const MAX_CREATE_ATTEMPTS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("json error at {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: SessionId },
    #[error("iteration {index} of session {session_id} not found")]
    IterationNotFound { session_id: SessionId, index: u64 },
    #[error("could not allocate a unique session directory under {root:?}")]
    SessionIdExhausted { root: PathBuf },
    #[error("refusing to write through symlink at {path:?}")]
    SymlinkRefused { path: PathBuf },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WriteDurability {
    /// Fast, best-effort persistence.
    ///
    /// - Writes a temp file and renames atomically into place.
    /// - Does not perform per-file fsync/sync.
    #[default]
    BestEffort,

    /// Slower, best-effort durability.
    ///
    /// Attempts to flush written file contents and rename operations to stable storage where
    /// possible. Exact guarantees are platform/filesystem-dependent.
    Durable,
}

/// Persisted per-session metadata; written once when the session directory is provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub base_prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Sidecar next to each artifact holding what the generator returned besides the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IterationSourceJson {
    index: u64,
    #[serde(default)]
    change_prompt: String,
    source: String,
    created_at: DateTime<Utc>,
}

/// One entry of an iteration listing.
///
/// `index` is `None` for files that follow the artifact prefix but carry no parseable index
/// (left behind by hand edits or older tooling). They still count towards the next index but
/// are left out of a session's iteration history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationArtifact {
    pub index: Option<u64>,
    pub artifact_ref: ArtifactRef,
}

/// Root directory holding one sub-directory per session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    durability: WriteDurability,
    artifact_extension: String,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            durability: WriteDurability::default(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_owned(),
        }
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.artifact_extension = extension.trim_start_matches('.').to_owned();
        self
    }

    pub fn durability(&self) -> WriteDurability {
        self.durability
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(session_id.as_str())
    }

    pub fn meta_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join(SESSION_META_FILENAME)
    }

    pub fn log_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join(SESSION_LOG_FILENAME)
    }

    /// Artifact file name for an iteration.
    ///
    /// Keeps the `iteration_<n>_output_<session>` shape so the `/iframe` helper can recover the
    /// session id from a served image path.
    pub fn artifact_file_name(&self, session_id: &SessionId, index: u64) -> String {
        format!(
            "{ITERATION_ARTIFACT_PREFIX}{index}_output_{}.{}",
            session_id.as_str(),
            self.artifact_extension
        )
    }

    fn source_file_name(index: u64) -> String {
        format!("{ITERATION_SOURCE_PREFIX}{index}.json")
    }

    /// Looks up an existing session or provisions a new one.
    ///
    /// Returns the session and whether it was created by this call.
    pub fn resolve(
        &self,
        session_id: Option<&SessionId>,
        base_prompt: &str,
    ) -> Result<(Session, bool), StoreError> {
        match session_id {
            Some(session_id) => Ok((self.open_session(session_id)?, false)),
            None => Ok((self.create_session(base_prompt, Local::now())?, true)),
        }
    }

    /// Provisions a fresh session directory.
    ///
    /// The directory is claimed with a non-recursive `create_dir`, so two callers racing on the
    /// same derived id cannot both own it; the loser retries with a new random suffix.
    pub fn create_session(
        &self,
        base_prompt: &str,
        now: DateTime<Local>,
    ) -> Result<Session, StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let session_id = SessionId::generate(now);
            let session_dir = self.session_dir(&session_id);

            match fs::create_dir(&session_dir) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(StoreError::Io {
                        path: session_dir,
                        source,
                    })
                }
            }

            let meta = SessionMeta {
                session_id: session_id.as_str().to_owned(),
                base_prompt: base_prompt.to_owned(),
                created_at: now.with_timezone(&Utc),
            };
            if let Err(err) = self.write_json(&session_dir, SESSION_META_FILENAME, &meta) {
                if let Err(cleanup) = fs::remove_dir_all(&session_dir) {
                    tracing::warn!(
                        session_dir = %session_dir.display(),
                        error = %cleanup,
                        "failed to remove partially provisioned session directory"
                    );
                }
                return Err(err);
            }

            tracing::debug!(session_id = %session_id, "provisioned session directory");
            return Ok(Session::new(
                session_id,
                session_dir,
                Some(base_prompt.to_owned()),
                Vec::new(),
            ));
        }

        Err(StoreError::SessionIdExhausted {
            root: self.root.clone(),
        })
    }

    /// Loads an existing session and its iteration history from disk.
    pub fn open_session(&self, session_id: &SessionId) -> Result<Session, StoreError> {
        let session_dir = self.session_dir(session_id);
        match fs::symlink_metadata(&session_dir) {
            Ok(md) if md.is_dir() => {}
            Ok(_) => {
                return Err(StoreError::SessionNotFound {
                    session_id: session_id.clone(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::SessionNotFound {
                    session_id: session_id.clone(),
                })
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: session_dir,
                    source,
                })
            }
        }

        let base_prompt = match self.load_meta(session_id)? {
            Some(meta) => Some(meta.base_prompt),
            None => self.legacy_base_prompt(session_id)?,
        };

        let artifacts = list_iteration_artifacts_in(&session_dir)?;
        let mut iterations = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            // Unnumbered artifacts count towards the next index but have no place in the history.
            let Some(index) = artifact.index else {
                continue;
            };
            let sidecar = read_json_if_exists::<IterationSourceJson>(
                &session_dir.join(Self::source_file_name(index)),
            )?;
            let (change_prompt, source) = match sidecar {
                Some(sidecar) => (sidecar.change_prompt, Some(sidecar.source)),
                None => (String::new(), None),
            };
            iterations.push(Iteration::new(
                index,
                change_prompt,
                artifact.artifact_ref,
                source,
            ));
        }

        Ok(Session::new(
            session_id.clone(),
            session_dir,
            base_prompt,
            iterations,
        ))
    }

    pub fn load_meta(&self, session_id: &SessionId) -> Result<Option<SessionMeta>, StoreError> {
        read_json_if_exists(&self.meta_path(session_id))
    }

    /// Base prompt of a directory that predates `session.meta.json`, taken from the log.
    ///
    /// The log is only an inspection aid, so an unreadable entry yields `None` instead of
    /// locking the session out.
    fn legacy_base_prompt(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        match self.read_log(session_id) {
            Ok(entry) => Ok(entry.map(|entry| entry.prompt)),
            Err(StoreError::Json { path, source }) => {
                tracing::warn!(
                    session_id = %session_id,
                    path = %path.display(),
                    error = %source,
                    "ignoring unreadable session log"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Artifacts currently visible for the session, ordered by index.
    ///
    /// Only files following the iteration artifact naming are listed; the metadata, the log,
    /// source sidecars and in-flight temp files are skipped.
    pub fn list_iteration_artifacts(
        &self,
        session: &Session,
    ) -> Result<Vec<IterationArtifact>, StoreError> {
        list_iteration_artifacts_in(session.directory())
    }

    /// Writes an artifact under a name embedding `index`.
    ///
    /// Once this returns the artifact is visible to listings; before that nothing is.
    pub fn persist_artifact(
        &self,
        session: &Session,
        index: u64,
        artifact: &[u8],
    ) -> Result<ArtifactRef, StoreError> {
        let file_name = self.artifact_file_name(session.session_id(), index);
        write_atomic_in_dir(session.directory(), &file_name, artifact, self.durability)?;
        Ok(ArtifactRef::new(file_name))
    }

    /// Persists a complete iteration and appends it to `session`.
    ///
    /// The source sidecar is written before the artifact: the artifact rename is the commit
    /// point, so a crash in between leaves an orphaned sidecar that nothing counts.
    pub fn persist_iteration(
        &self,
        session: &mut Session,
        index: u64,
        change_prompt: &str,
        artifact: &[u8],
        source: &str,
    ) -> Result<Iteration, StoreError> {
        let sidecar = IterationSourceJson {
            index,
            change_prompt: change_prompt.to_owned(),
            source: source.to_owned(),
            created_at: Utc::now(),
        };
        self.write_json(session.directory(), &Self::source_file_name(index), &sidecar)?;

        let artifact_ref = self.persist_artifact(session, index, artifact)?;
        let iteration = Iteration::new(
            index,
            change_prompt,
            artifact_ref,
            Some(source.to_owned()),
        );
        session.push_iteration(iteration.clone());

        tracing::debug!(
            session_id = %session.session_id(),
            index,
            artifact = %iteration.artifact_ref(),
            "persisted iteration"
        );
        Ok(iteration)
    }

    /// Overwrites the session log entry.
    pub fn write_log(&self, session: &Session, entry: &SessionLogEntry) -> Result<(), StoreError> {
        self.write_json(session.directory(), SESSION_LOG_FILENAME, entry)
    }

    pub fn read_log(&self, session_id: &SessionId) -> Result<Option<SessionLogEntry>, StoreError> {
        read_json_if_exists(&self.log_path(session_id))
    }

    /// Reads back the artifact persisted for `index`.
    pub fn read_artifact(
        &self,
        session_id: &SessionId,
        index: u64,
    ) -> Result<(ArtifactRef, Vec<u8>), StoreError> {
        let session = self.open_session(session_id)?;
        let Some(iteration) = session.iterations().iter().find(|it| it.index() == index) else {
            return Err(StoreError::IterationNotFound {
                session_id: session_id.clone(),
                index,
            });
        };

        let path = session.directory().join(iteration.artifact_ref().file_name());
        let bytes = fs::read(&path).map_err(|source| StoreError::Io { path, source })?;
        Ok((iteration.artifact_ref().clone(), bytes))
    }

    fn write_json<T: Serialize>(
        &self,
        dir: &Path,
        file_name: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: dir.join(file_name),
            source,
        })?;
        json.push(b'\n');
        write_atomic_in_dir(dir, file_name, &json, self.durability)
    }
}

// Extracted naming and atomic-write helpers for `SessionStore`.
include!("session_store/helpers.rs");
