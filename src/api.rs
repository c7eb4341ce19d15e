// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Request/response shapes shared by the HTTP routes and the MCP tools.
//!
//! Field names are snake_case on the wire; camelCase aliases are accepted on input.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::Session;
use crate::one_shot::OneShotOutcome;
use crate::session::IterationOutcome;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct IterateParams {
    /// Diagram description; required, also for follow-up requests.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Existing session to continue; omit to start a new one.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    /// Change to apply on top of the newest iteration.
    #[serde(default, alias = "changePrompt")]
    pub change_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IterateResponse {
    pub message: String,
    pub iterations: u64,
    pub session_id: String,
}

impl From<IterationOutcome> for IterateResponse {
    fn from(outcome: IterationOutcome) -> Self {
        Self {
            message: outcome.message.to_owned(),
            iterations: outcome.iterations,
            session_id: outcome.session_id.into_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OneShotParams {
    #[serde(default)]
    pub prompt: String,
    /// Stem of the returned file name; a timestamp and extension are appended.
    #[serde(default, alias = "outputName", alias = "output_name")]
    pub output_filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OneShotResponse {
    pub status: String,
    pub identifier: String,
    pub filename: String,
}

impl From<OneShotOutcome> for OneShotResponse {
    fn from(outcome: OneShotOutcome) -> Self {
        Self {
            status: "success".to_owned(),
            identifier: outcome.identifier.into_string(),
            filename: outcome.filename,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SessionReadParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IterationSummary {
    pub index: u64,
    pub change_prompt: String,
    pub artifact: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionResponse {
    pub session_id: String,
    pub base_prompt: Option<String>,
    pub iterations: Vec<IterationSummary>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id().as_str().to_owned(),
            base_prompt: session.base_prompt().map(str::to_owned),
            iterations: session
                .iterations()
                .iter()
                .map(|iteration| IterationSummary {
                    index: iteration.index(),
                    change_prompt: iteration.change_prompt().to_owned(),
                    artifact: iteration.artifact_ref().file_name().to_owned(),
                    source: iteration.source().map(str::to_owned),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
