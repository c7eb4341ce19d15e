// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use crate::model::Session;
use crate::store::{SessionStore, StoreError};

/// Derives the next iteration index from what is on disk.
///
/// The index is the number of artifact files that follow the iteration naming, so it survives
/// restarts and needs no counter of its own. Gaps or files removed by hand are not repaired: the
/// count is returned as-is.
#[derive(Debug, Clone)]
pub struct IterationSequencer {
    store: SessionStore,
}

impl IterationSequencer {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn next_index(&self, session: &Session) -> Result<u64, StoreError> {
        let count = self.store.list_iteration_artifacts(session)?.len();
        Ok(count as u64)
    }
}
