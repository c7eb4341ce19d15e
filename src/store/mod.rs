// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence for sessions on disk.
//!
//! One directory per session under a common root, holding the session metadata, the prompt log,
//! and one artifact plus one source sidecar per iteration.

pub mod session_store;

pub use session_store::{
    IterationArtifact, SessionMeta, SessionStore, StoreError, WriteDurability,
};
