// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IterationReadParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IterationArtifactResponse {
    pub session_id: String,
    pub index: u64,
    pub file_name: String,
    pub content_type: String,
    /// Stored diagram source; absent for iterations written before sources were kept.
    pub source: Option<String>,
    pub artifact_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OneShotReadParams {
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OneShotArtifactResponse {
    pub identifier: String,
    pub filename: String,
    pub content_type: String,
    pub source: String,
    pub artifact_base64: String,
}
