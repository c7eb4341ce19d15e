// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Local};
use uuid::Uuid;

/// A typed identifier that is safe to use as a single directory or file name segment.
///
/// Session ids arrive from clients and are joined onto the sessions root, so anything that could
/// escape that root (`/`, `\`, `..`) or hide from listings (a leading `.`) is rejected up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_id_segment(&value)?;
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("id must not be empty")]
    Empty,
    #[error("id must not contain path separators")]
    ContainsSeparator,
    #[error("id must not start with '.'")]
    LeadingDot,
    #[error("id must not contain control characters")]
    ControlCharacter,
}

fn validate_id_segment(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.contains(['/', '\\']) {
        return Err(IdError::ContainsSeparator);
    }
    if value.starts_with('.') {
        return Err(IdError::LeadingDot);
    }
    if value.chars().any(char::is_control) {
        return Err(IdError::ControlCharacter);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionIdTag {}
pub type SessionId = Id<SessionIdTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OneShotIdTag {}
pub type OneShotId = Id<OneShotIdTag>;

pub const SESSION_ID_PREFIX: &str = "iter_session_";

impl SessionId {
    /// Derives a fresh id of the form `iter_session_<YYYYmmdd_HHMMSS>_<8 hex>`.
    ///
    /// The timestamp keeps ids sortable by creation time; the random suffix keeps two sessions
    /// created within the same second apart.
    pub fn generate(now: DateTime<Local>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            value: format!("{SESSION_ID_PREFIX}{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8]),
            _marker: PhantomData,
        }
    }
}

impl OneShotId {
    pub fn generate() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            _marker: PhantomData,
        }
    }
}
