// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model.
//!
//! A session owns a directory and an append-only list of iterations; each iteration points at
//! one persisted artifact and carries the Mermaid source the next refinement starts from.

pub mod ids;
pub mod session;

pub use ids::{Id, IdError, OneShotId, SessionId, SESSION_ID_PREFIX};
pub use session::{ArtifactRef, Iteration, Session, SessionLogEntry};
