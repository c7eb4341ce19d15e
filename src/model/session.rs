// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ids::SessionId;

/// A persisted diagram-editing session: one directory plus its append-only iteration history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    session_id: SessionId,
    directory: PathBuf,
    base_prompt: Option<String>,
    iterations: Vec<Iteration>,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        directory: PathBuf,
        base_prompt: Option<String>,
        iterations: Vec<Iteration>,
    ) -> Self {
        Self {
            session_id,
            directory,
            base_prompt,
            iterations,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The prompt that started the session, if it was recorded.
    ///
    /// Directories written by older deployments carry no metadata file and may lack it.
    pub fn base_prompt(&self) -> Option<&str> {
        self.base_prompt.as_deref()
    }

    pub fn iterations(&self) -> &[Iteration] {
        &self.iterations
    }

    pub fn latest_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    pub(crate) fn push_iteration(&mut self, iteration: Iteration) {
        self.iterations.push(iteration);
    }
}

/// One generation or refinement step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iteration {
    index: u64,
    change_prompt: String,
    artifact_ref: ArtifactRef,
    source: Option<String>,
}

impl Iteration {
    pub fn new(
        index: u64,
        change_prompt: impl Into<String>,
        artifact_ref: ArtifactRef,
        source: Option<String>,
    ) -> Self {
        Self {
            index,
            change_prompt: change_prompt.into(),
            artifact_ref,
            source,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Empty for iteration 0.
    pub fn change_prompt(&self) -> &str {
        &self.change_prompt
    }

    pub fn artifact_ref(&self) -> &ArtifactRef {
        &self.artifact_ref
    }

    /// The Mermaid source returned by the generator for this step.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// File name of a persisted artifact, relative to its session directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self(file_name.into())
    }

    pub fn file_name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot written to `prompt.json` after each successful iteration.
///
/// Inspection aid only: iteration numbering never reads it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub prompt: String,
    pub iterations: u64,
}
