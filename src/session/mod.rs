// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Session lifecycle: request validation, iteration sequencing and the per-request flow.

mod controller;
mod error;
mod sequencer;

pub use controller::{
    IterationOutcome, SessionCommand, SessionController, ITERATION_COMPLETED_MESSAGE,
};
pub use error::SessionError;
pub use sequencer::IterationSequencer;
