// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use crate::generate::GenerationError;
use crate::model::SessionId;
use crate::store::StoreError;

/// Caller-visible failures of session and one-shot requests.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Session ID not found: {0}")]
    SessionNotFound(SessionId),
    #[error("Iteration {index} not found in session {session_id}")]
    IterationNotFound { session_id: SessionId, index: u64 },
    #[error("Failed to generate Mermaid chart: {0}")]
    GenerationFailed(#[source] GenerationError),
    #[error("Failed to refine Mermaid chart in session {session_id}: {source}")]
    RefinementFailed {
        session_id: SessionId,
        #[source]
        source: GenerationError,
    },
    #[error("Session storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
}

impl SessionError {
    /// Stable machine-readable name, used in logs and error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::SessionNotFound(_) => "session_not_found",
            Self::IterationNotFound { .. } => "iteration_not_found",
            Self::GenerationFailed(_) => "generation_failed",
            Self::RefinementFailed { .. } => "refinement_failed",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Session the failure relates to, when the caller may not know it yet.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::SessionNotFound(session_id)
            | Self::IterationNotFound { session_id, .. }
            | Self::RefinementFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound { session_id } => Self::SessionNotFound(session_id),
            StoreError::IterationNotFound { session_id, index } => {
                Self::IterationNotFound { session_id, index }
            }
            other => Self::StorageUnavailable(other),
        }
    }
}
