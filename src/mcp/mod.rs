// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Model Context Protocol (MCP) server surface.
//!
//! Exposes the same session and one-shot operations as the HTTP routes as MCP tools, either
//! over streamable HTTP (mounted at `/mcp`) or over stdio.

mod server;
mod types;

pub use server::SessionsMcp;
pub use types::{
    IterationArtifactResponse, IterationReadParams, OneShotArtifactResponse, OneShotReadParams,
};
