// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::{SessionCommand, SessionController};
use crate::model::SessionId;
use crate::session::SessionError;
use crate::store::SessionStore;
use crate::test_utils::{RefineCall, ScriptedGenerator, TempDir};

struct ControllerTestCtx {
    _tmp: TempDir,
    store: SessionStore,
    generator: Arc<ScriptedGenerator>,
    controller: SessionController,
}

impl ControllerTestCtx {
    fn with_generator(prefix: &str, generator: ScriptedGenerator) -> Self {
        Self::with_store(prefix, generator, |store| store)
    }

    fn with_store(
        prefix: &str,
        generator: ScriptedGenerator,
        configure: impl FnOnce(SessionStore) -> SessionStore,
    ) -> Self {
        let tmp = TempDir::new(prefix);
        let store = configure(SessionStore::new(tmp.path().join("sessions")));
        let generator = Arc::new(generator);
        let controller = SessionController::new(store.clone(), generator.clone());
        Self {
            _tmp: tmp,
            store,
            generator,
            controller,
        }
    }

    fn artifact_count(&self, session_id: &SessionId) -> usize {
        let session = self.store.open_session(session_id).unwrap();
        self.store.list_iteration_artifacts(&session).unwrap().len()
    }

    fn session_dirs(&self) -> usize {
        match std::fs::read_dir(self.store.root()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

#[fixture]
fn ctx() -> ControllerTestCtx {
    ControllerTestCtx::with_generator("controller", ScriptedGenerator::new())
}

fn create(prompt: &str) -> SessionCommand {
    SessionCommand::from_fields(Some(prompt), None, None).unwrap()
}

fn refine(session_id: &SessionId, prompt: &str, change: &str) -> SessionCommand {
    SessionCommand::from_fields(Some(prompt), Some(session_id.as_str()), Some(change)).unwrap()
}

#[test]
fn command_from_fields_picks_variant_by_session_id() {
    assert_eq!(
        SessionCommand::from_fields(Some("p"), None, Some("c")).unwrap(),
        SessionCommand::Create {
            prompt: "p".to_owned(),
        }
    );
    assert_eq!(
        SessionCommand::from_fields(Some("p"), Some("  "), Some("   ")).unwrap(),
        SessionCommand::Create {
            prompt: "p".to_owned(),
        }
    );
    assert_eq!(
        SessionCommand::from_fields(Some("p"), Some("s1"), None).unwrap(),
        SessionCommand::Continue {
            session_id: SessionId::new("s1").unwrap(),
            prompt: "p".to_owned(),
            change_prompt: None,
        }
    );
}

#[rstest]
#[case(None)]
#[case(Some(""))]
#[case(Some("   \n\t"))]
fn blank_prompt_is_invalid_input(#[case] prompt: Option<&str>) {
    let err = SessionCommand::from_fields(prompt, None, None).unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));
    assert_eq!(err.to_string(), "Prompt is required");
}

#[test]
fn traversal_session_id_is_invalid_input() {
    let err = SessionCommand::from_fields(Some("p"), Some("../etc"), Some("c")).unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));
}

#[rstest]
#[tokio::test]
async fn blank_prompt_never_reaches_the_generator(ctx: ControllerTestCtx) {
    let result = SessionCommand::from_fields(Some("  "), None, None);
    assert!(result.is_err());
    assert_eq!(ctx.generator.total_calls(), 0);
    assert_eq!(ctx.session_dirs(), 0);
}

#[rstest]
#[tokio::test]
async fn new_session_persists_iteration_zero(ctx: ControllerTestCtx) {
    let outcome = ctx.controller.handle(create("show primary colors")).await.unwrap();

    assert_eq!(outcome.iterations, 0);
    assert!(outcome.created);
    assert_eq!(outcome.message, "Mermaid chart iteration completed");
    assert!(outcome.session_id.as_str().starts_with("iter_session_"));
    assert_eq!(ctx.artifact_count(&outcome.session_id), 1);
    assert_eq!(ctx.generator.generate_calls(), 1);
    assert_eq!(ctx.generator.refine_calls(), 0);

    let log = ctx.store.read_log(&outcome.session_id).unwrap().unwrap();
    assert_eq!(log.prompt, "show primary colors");
    assert_eq!(log.iterations, 0);
}

#[rstest]
#[tokio::test]
async fn refinement_feeds_previous_source_and_appends(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("show primary colors")).await.unwrap();
    let second = ctx
        .controller
        .handle(refine(
            &first.session_id,
            "show primary colors",
            "also show combination results",
        ))
        .await
        .unwrap();

    assert_eq!(second.iterations, 1);
    assert!(!second.created);
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(ctx.artifact_count(&first.session_id), 2);

    let session = ctx.store.open_session(&first.session_id).unwrap();
    let indices = session.iterations().iter().map(|it| it.index()).collect::<Vec<_>>();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(session.iterations()[1].change_prompt(), "also show combination results");

    assert_eq!(
        ctx.generator.refine_inputs(),
        vec![RefineCall {
            base_prompt: "show primary colors".to_owned(),
            change_prompt: "also show combination results".to_owned(),
            prior_source: session.iterations()[0].source().unwrap().to_owned(),
        }]
    );

    let log = ctx.store.read_log(&first.session_id).unwrap().unwrap();
    assert_eq!(log.iterations, 1);
}

#[rstest]
#[tokio::test]
async fn each_refinement_sees_the_exact_previous_source(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("base")).await.unwrap();
    for (step, change) in ["one", "two", "three"].into_iter().enumerate() {
        let outcome =
            ctx.controller.handle(refine(&first.session_id, "base", change)).await.unwrap();
        assert_eq!(outcome.iterations, step as u64 + 1);
        assert_eq!(outcome.iterations as usize + 1, ctx.artifact_count(&first.session_id));
    }

    let session = ctx.store.open_session(&first.session_id).unwrap();
    let inputs = ctx.generator.refine_inputs();
    for (n, call) in inputs.iter().enumerate() {
        assert_eq!(Some(call.prior_source.as_str()), session.iterations()[n].source());
    }
}

#[rstest]
#[tokio::test]
async fn base_prompt_comes_from_the_session_not_the_request(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("original prompt")).await.unwrap();
    ctx.controller
        .handle(refine(&first.session_id, "different prompt", "change"))
        .await
        .unwrap();

    assert_eq!(ctx.generator.refine_inputs()[0].base_prompt, "original prompt");
}

#[rstest]
#[tokio::test]
async fn refining_unknown_session_is_not_found_without_side_effects(ctx: ControllerTestCtx) {
    let missing = SessionId::new("iter_session_20250103_201120").unwrap();
    let err = ctx.controller.handle(refine(&missing, "p", "c")).await.unwrap_err();

    assert!(matches!(err, SessionError::SessionNotFound(ref id) if *id == missing));
    assert_eq!(ctx.generator.total_calls(), 0);
    assert!(!ctx.store.session_dir(&missing).exists());
    assert_eq!(ctx.session_dirs(), 0);
}

#[rstest]
#[tokio::test]
async fn failed_generation_persists_nothing(ctx: ControllerTestCtx) {
    ctx.generator.set_fail_generate(true);
    let err = ctx.controller.handle(create("p")).await.unwrap_err();

    assert!(matches!(err, SessionError::GenerationFailed(_)));
    assert_eq!(ctx.session_dirs(), 0);
}

#[rstest]
#[tokio::test]
async fn empty_artifact_counts_as_generation_failure(ctx: ControllerTestCtx) {
    ctx.generator.set_empty_artifact(true);
    let err = ctx.controller.handle(create("p")).await.unwrap_err();

    assert!(matches!(err, SessionError::GenerationFailed(_)));
    assert_eq!(ctx.session_dirs(), 0);
}

#[rstest]
#[tokio::test]
async fn failed_refinement_consumes_no_index(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("p")).await.unwrap();

    ctx.generator.set_fail_refine(true);
    let err = ctx.controller.handle(refine(&first.session_id, "p", "c")).await.unwrap_err();
    assert!(
        matches!(err, SessionError::RefinementFailed { ref session_id, .. } if *session_id == first.session_id)
    );
    assert_eq!(ctx.artifact_count(&first.session_id), 1);
    assert_eq!(ctx.store.read_log(&first.session_id).unwrap().unwrap().iterations, 0);

    ctx.generator.set_fail_refine(false);
    let retried = ctx.controller.handle(refine(&first.session_id, "p", "c")).await.unwrap();
    assert_eq!(retried.iterations, 1);
    assert_eq!(ctx.artifact_count(&first.session_id), 2);
}

#[rstest]
#[tokio::test]
async fn change_prompt_without_session_is_an_initial_generation(ctx: ControllerTestCtx) {
    let command = SessionCommand::from_fields(
        Some("show primary colors"),
        None,
        Some("also show combination results"),
    )
    .unwrap();
    let outcome = ctx.controller.handle(command).await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(ctx.artifact_count(&outcome.session_id), 1);
    assert_eq!(ctx.generator.generate_calls(), 1);
    assert_eq!(ctx.generator.refine_calls(), 0);

    let session = ctx.store.open_session(&outcome.session_id).unwrap();
    assert_eq!(session.iterations()[0].change_prompt(), "");
}

#[rstest]
#[tokio::test]
async fn continue_without_change_prompt_leaves_history_alone(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("base")).await.unwrap();
    ctx.controller.handle(refine(&first.session_id, "base", "c")).await.unwrap();

    let command =
        SessionCommand::from_fields(Some("base"), Some(first.session_id.as_str()), None).unwrap();
    let outcome = ctx.controller.handle(command).await.unwrap();

    assert_eq!(outcome.iterations, 0);
    assert!(!outcome.created);
    assert_eq!(ctx.artifact_count(&first.session_id), 2);
    assert_eq!(ctx.generator.generate_calls(), 2);
}

#[rstest]
#[tokio::test]
async fn continue_without_change_prompt_reports_generation_failure(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("base")).await.unwrap();
    ctx.generator.set_fail_generate(true);

    let command =
        SessionCommand::from_fields(Some("base"), Some(first.session_id.as_str()), None).unwrap();
    let err = ctx.controller.handle(command).await.unwrap_err();
    assert!(matches!(err, SessionError::GenerationFailed(_)));
    assert_eq!(ctx.artifact_count(&first.session_id), 1);
}

#[rstest]
#[tokio::test]
async fn legacy_session_without_sources_regenerates_prior_source(ctx: ControllerTestCtx) {
    let session_id = SessionId::new("iter_session_20250103_201120").unwrap();
    let dir = ctx.store.session_dir(&session_id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("prompt.json"), r#"{"prompt": "legacy base", "iterations": 0}"#)
        .unwrap();
    std::fs::write(dir.join("iteration_0_output_iter_session_20250103_201120.png"), b"png")
        .unwrap();

    let outcome = ctx.controller.handle(refine(&session_id, "request", "c")).await.unwrap();

    assert_eq!(outcome.iterations, 1);
    assert_eq!(ctx.generator.generate_calls(), 1);
    let call = &ctx.generator.refine_inputs()[0];
    assert_eq!(call.base_prompt, "legacy base");
    assert_eq!(call.prior_source, "flowchart TD\n%% legacy base");
}

#[rstest]
#[tokio::test]
async fn corrupt_legacy_log_falls_back_to_the_request_prompt(ctx: ControllerTestCtx) {
    let session_id = SessionId::new("iter_session_20250103_201120").unwrap();
    let dir = ctx.store.session_dir(&session_id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("prompt.json"), r#"{"prompt": "legacy"#).unwrap();
    std::fs::write(dir.join("iteration_0_output_iter_session_20250103_201120.png"), b"png")
        .unwrap();

    let outcome = ctx.controller.handle(refine(&session_id, "request", "c")).await.unwrap();

    assert_eq!(outcome.iterations, 1);
    assert_eq!(ctx.generator.refine_inputs()[0].base_prompt, "request");
    assert_eq!(ctx.artifact_count(&session_id), 2);
    let log = ctx.store.read_log(&session_id).unwrap().unwrap();
    assert_eq!(log.prompt, "request");
    assert_eq!(log.iterations, 1);
}

#[rstest]
#[tokio::test]
async fn storage_failure_during_refinement_surfaces_and_counts_nothing(ctx: ControllerTestCtx) {
    let first = ctx.controller.handle(create("base")).await.unwrap();
    let blocked = ctx.store.artifact_file_name(&first.session_id, 1);
    std::fs::create_dir(ctx.store.session_dir(&first.session_id).join(blocked)).unwrap();

    let err = ctx.controller.handle(refine(&first.session_id, "base", "c")).await.unwrap_err();

    assert!(matches!(err, SessionError::StorageUnavailable(_)));
    assert_eq!(err.kind(), "storage_unavailable");
    assert_eq!(ctx.artifact_count(&first.session_id), 1);
    assert_eq!(ctx.store.read_log(&first.session_id).unwrap().unwrap().iterations, 0);
}

#[tokio::test]
async fn storage_failure_on_create_leaves_no_session_behind() {
    // An extension with a separator points the artifact into a directory that never exists.
    let ctx = ControllerTestCtx::with_store(
        "controller-create-storage",
        ScriptedGenerator::new(),
        |store| store.with_artifact_extension("png/missing"),
    );

    let err = ctx.controller.handle(create("base")).await.unwrap_err();

    assert!(matches!(err, SessionError::StorageUnavailable(_)));
    assert_eq!(ctx.generator.generate_calls(), 1);
    assert_eq!(ctx.session_dirs(), 0);
}

#[rstest]
#[tokio::test]
async fn empty_existing_session_records_iteration_zero_first(ctx: ControllerTestCtx) {
    let session_id = SessionId::new("hand_made").unwrap();
    std::fs::create_dir_all(ctx.store.session_dir(&session_id)).unwrap();

    let outcome = ctx.controller.handle(refine(&session_id, "base", "c")).await.unwrap();

    assert_eq!(outcome.iterations, 1);
    let session = ctx.store.open_session(&session_id).unwrap();
    assert_eq!(session.iterations()[0].change_prompt(), "");
    assert_eq!(session.iterations()[1].change_prompt(), "c");
    assert_eq!(
        Some(ctx.generator.refine_inputs()[0].prior_source.as_str()),
        session.iterations()[0].source()
    );
}

#[tokio::test]
async fn concurrent_refinements_of_one_session_get_consecutive_indices() {
    let ctx = ControllerTestCtx::with_generator(
        "controller-concurrent",
        ScriptedGenerator::with_refine_delay(Duration::from_millis(20)),
    );
    let first = ctx.controller.handle(create("base")).await.unwrap();

    let (a, b, c) = tokio::join!(
        ctx.controller.handle(refine(&first.session_id, "base", "a")),
        ctx.controller.handle(refine(&first.session_id, "base", "b")),
        ctx.controller.handle(refine(&first.session_id, "base", "c")),
    );

    let mut indices = vec![a.unwrap().iterations, b.unwrap().iterations, c.unwrap().iterations];
    indices.sort_unstable();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(ctx.artifact_count(&first.session_id), 4);

    // Every refinement observed its predecessor's output.
    let session = ctx.store.open_session(&first.session_id).unwrap();
    let inputs = ctx.generator.refine_inputs();
    for (n, call) in inputs.iter().enumerate() {
        assert_eq!(Some(call.prior_source.as_str()), session.iterations()[n].source());
    }
    assert_eq!(ctx.controller.locks.tracked(), 0);
}

#[tokio::test]
async fn different_sessions_do_not_share_a_lock() {
    let ctx = ControllerTestCtx::with_generator(
        "controller-parallel",
        ScriptedGenerator::with_refine_delay(Duration::from_millis(20)),
    );
    let a = ctx.controller.handle(create("a")).await.unwrap();
    let b = ctx.controller.handle(create("b")).await.unwrap();

    let (ra, rb) = tokio::join!(
        ctx.controller.handle(refine(&a.session_id, "a", "x")),
        ctx.controller.handle(refine(&b.session_id, "b", "y")),
    );
    assert_eq!(ra.unwrap().iterations, 1);
    assert_eq!(rb.unwrap().iterations, 1);
}
