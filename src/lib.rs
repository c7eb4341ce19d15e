// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! mermaid-sessions: generate Mermaid diagrams and refine them step by step in persisted
//! sessions, over HTTP (axum) and MCP.

pub mod api;
pub mod config;
pub mod generate;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod model;
pub mod one_shot;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_utils;
