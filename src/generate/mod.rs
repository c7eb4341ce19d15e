// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Diagram generation capability.
//!
//! The service never produces diagrams itself: it hands prompts to a [`DiagramGenerator`] and
//! persists whatever comes back. [`CommandGenerator`] drives an external program; tests plug in
//! scripted implementations.

mod command;

use std::io;

use async_trait::async_trait;

pub use command::CommandGenerator;

/// Output of one generation or refinement call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDiagram {
    /// Rendered artifact bytes (usually an image).
    pub artifact: Vec<u8>,
    /// Mermaid source the artifact was rendered from.
    pub source: String,
}

impl GeneratedDiagram {
    pub fn new(artifact: impl Into<Vec<u8>>, source: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            source: source.into(),
        }
    }

    /// Rejects outputs that carry no artifact; callers must not persist those.
    pub fn into_usable(self) -> Result<Self, GenerationError> {
        if self.artifact.is_empty() {
            return Err(GenerationError::EmptyArtifact);
        }
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generator returned no artifact")]
    EmptyArtifact,
    #[error("failed to spawn generator {program:?}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("generator io error: {0}")]
    Io(#[from] io::Error),
    #[error("generator exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("invalid generator response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait DiagramGenerator: Send + Sync {
    /// Produces the first diagram of a session (or a one-shot diagram) from `prompt`.
    async fn generate(&self, prompt: &str) -> Result<GeneratedDiagram, GenerationError>;

    /// Produces the next diagram by applying `change_prompt` to `prior_source`.
    async fn refine(
        &self,
        base_prompt: &str,
        change_prompt: &str,
        prior_source: &str,
    ) -> Result<GeneratedDiagram, GenerationError>;
}
