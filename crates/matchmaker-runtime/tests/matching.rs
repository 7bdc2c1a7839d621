//! End-to-end matching through a scripted provider.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{aligned_pair, Route, ScriptedProvider};
use matchmaker_core::{AgentKind, VerdictCategory};
use matchmaker_runtime::{
    AttemptError, InMemoryProfileStore, MatchError, MatchMode, MatchOrchestrator, MatchOutcome,
    MatchService, ModelClient, ProviderError, RuntimeConfig, StructuredCallError,
    StructuredCaller,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn orchestrator(provider: &Arc<ScriptedProvider>, config: RuntimeConfig) -> MatchOrchestrator {
    let client = ModelClient::new(provider.clone());
    MatchOrchestrator::new(StructuredCaller::new(client), config)
}

#[tokio::test]
async fn aligned_profiles_reach_a_match() {
    let provider = Arc::new(ScriptedProvider::new());
    let (a, b) = aligned_pair();

    let result = orchestrator(&provider, RuntimeConfig::default())
        .match_two_users(&a, &b)
        .await
        .unwrap();

    assert_eq!(result.verdict.verdict, VerdictCategory::Match);
    assert_eq!(result.verdict.score_global, 84.0);
    assert!(result.meta.policy.consistent);
    assert_eq!(result.meta.mode, "MULTI_AGENT_V2");
    assert_eq!(result.meta.llm_usage.llm_calls, 5);
    assert_eq!(provider.total_calls(), 5);
    assert_eq!(provider.calls(Route::Synthesis), 1);
    assert!(result.meta.agents_duration_seconds <= result.meta.duration_seconds);
}

#[tokio::test]
async fn high_risk_reply_is_still_valid() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(
                Route::Risques,
                r#"{"score_risques": 20, "red_flags": ["violence"], "points_a_surveiller": []}"#,
            )
            .reply(
                Route::Synthesis,
                r#"{"verdict": "NO_MATCH", "score_global": 45, "resume_executif": "A serious red flag.",
                    "forces_majeures": [], "defis_principaux": ["violence"], "recommandation": "Do not pursue."}"#,
            ),
    );
    let (a, b) = aligned_pair();

    let result = orchestrator(&provider, RuntimeConfig::default())
        .match_two_users(&a, &b)
        .await
        .unwrap();

    assert_eq!(result.agents.score(AgentKind::Risques), Some(20.0));
    assert_eq!(result.agents.risques.string_list("red_flags"), vec!["violence"]);
    assert!(result.agents.risques.string_list("points_a_surveiller").is_empty());
    assert_eq!(result.verdict.verdict, VerdictCategory::NoMatch);
    assert_eq!(provider.calls(Route::Risques), 1);
}

#[tokio::test]
async fn fenced_synthesis_reply_is_accepted() {
    let fenced = format!("```json\n{}\n```", common::MATCH_VERDICT);
    let provider = Arc::new(ScriptedProvider::new().reply(Route::Synthesis, &fenced));
    let (a, b) = aligned_pair();

    let result = orchestrator(&provider, RuntimeConfig::default())
        .match_two_users(&a, &b)
        .await
        .unwrap();

    assert_eq!(result.verdict.forces_majeures.len(), 2);
    assert_eq!(provider.calls(Route::Synthesis), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_agent_fails_the_whole_match() {
    let provider = Arc::new(ScriptedProvider::new().reply(Route::Valeurs, "I'd rather not answer in JSON."));
    let (a, b) = aligned_pair();

    let err = orchestrator(&provider, RuntimeConfig::default())
        .match_two_users(&a, &b)
        .await
        .unwrap_err();

    match &err {
        MatchError::Specialist { agent, source } => {
            assert_eq!(*agent, AgentKind::Valeurs);
            assert_eq!(source.attempts(), 2);
            assert!(matches!(source.last_error(), Some(AttemptError::Validation(_))));
        }
        other => panic!("expected a specialist failure, got {other:?}"),
    }
    assert!(!err.is_client_error());
    assert_eq!(provider.calls(Route::Valeurs), 2);
    assert_eq!(provider.calls(Route::Synthesis), 0);
}

#[tokio::test(start_paused = true)]
async fn first_failure_ends_the_match_without_waiting_for_siblings() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_delay(Duration::from_secs(30))
            .with_route_delay(Route::Valeurs, Duration::ZERO)
            .script(Route::Valeurs, vec![Err(ProviderError::Auth { status: 401 })]),
    );
    let config = RuntimeConfig::from_yaml("agents:\n  valeurs:\n    max_attempts: 1\n").unwrap();
    let orchestrator = orchestrator(&provider, config);
    let (a, b) = aligned_pair();
    let started = Instant::now();

    let err = orchestrator.match_two_users(&a, &b).await.unwrap_err();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(matches!(
        &err,
        MatchError::Specialist { agent: AgentKind::Valeurs, source } if source.attempts() == 1
    ));
    // profil was already in flight and is dropped without replying
    assert_eq!(provider.calls(Route::Profil), 1);
    assert_eq!(provider.calls(Route::Synthesis), 0);
    assert_eq!(orchestrator.caller().client().total_usage().llm_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_agent_reply_is_retried_after_backoff() {
    let provider = Arc::new(ScriptedProvider::new().script(
        Route::Projection,
        vec![
            Ok("```json\n{\"score_projection\": 78, \"vision_commune\": [".to_string()),
            Ok(r#"{"score_projection": 78, "vision_commune": [], "risques_long_terme": []}"#.to_string()),
        ],
    ));
    let (a, b) = aligned_pair();
    let started = Instant::now();

    let result = orchestrator(&provider, RuntimeConfig::default())
        .match_two_users(&a, &b)
        .await
        .unwrap();

    assert_eq!(provider.calls(Route::Projection), 2);
    assert_eq!(result.meta.llm_usage.llm_calls, 6);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_reports_attempt_count() {
    let provider = Arc::new(ScriptedProvider::new().script(
        Route::Risques,
        vec![Err(ProviderError::Quota { retry_after: None })],
    ));
    let config = RuntimeConfig::from_yaml("retry:\n  max_attempts: 3\n  base_delay: 1s\n").unwrap();
    let (a, b) = aligned_pair();
    let started = Instant::now();

    let err = orchestrator(&provider, config)
        .match_two_users(&a, &b)
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    assert!(err.to_string().contains("after 3 attempt(s)"), "{err}");
    assert_eq!(provider.calls(Route::Risques), 3);
    // linear backoff: 1s then 2s
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn per_agent_attempt_override() {
    let provider = Arc::new(ScriptedProvider::new().reply(Route::Profil, "{}"));
    let config = RuntimeConfig::from_yaml("agents:\n  profil:\n    max_attempts: 1\n").unwrap();
    let (a, b) = aligned_pair();

    let err = orchestrator(&provider, config)
        .match_two_users(&a, &b)
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(1));
    assert_eq!(provider.calls(Route::Profil), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_in_flight_agents() {
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_secs(30)));
    let orchestrator = orchestrator(&provider, RuntimeConfig::default());
    let (a, b) = aligned_pair();
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let trigger = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(orchestrator.match_two_users_with_cancel(&a, &b, &cancel), trigger);

    assert_eq!(result.unwrap_err(), MatchError::Cancelled);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    assert_eq!(provider.calls(Route::Synthesis), 0);
    assert_eq!(orchestrator.caller().client().total_usage().llm_calls, 0);
}

#[tokio::test]
async fn service_matches_stored_profiles() {
    let provider = Arc::new(ScriptedProvider::new());
    let (a, b) = aligned_pair();
    let store = Arc::new(InMemoryProfileStore::new([a, b]));
    let service = MatchService::new(ModelClient::new(provider.clone()), store, RuntimeConfig::default());

    let outcome = service
        .match_by_ids("u-amelie", "u-ravi", MatchMode::MultiAgentV2)
        .await
        .unwrap();
    assert_eq!(outcome.mode(), MatchMode::MultiAgentV2);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["userA"]["name"], "Amelie");
    assert_eq!(json["meta"]["mode"], "MULTI_AGENT_V2");
    assert_eq!(json["verdict"]["verdict"], "MATCH");

    let outcome = service
        .match_by_ids("u-amelie", "u-ravi", MatchMode::AgentV2)
        .await
        .unwrap();
    match outcome {
        MatchOutcome::Conversation(result) => assert_eq!(result.extracted.score, Some(80.0)),
        other => panic!("expected a conversation result, got {other:?}"),
    }
    assert_eq!(provider.calls(Route::Summary), 2);
}

#[tokio::test]
async fn service_rejects_bad_requests_before_calling_the_model() {
    let provider = Arc::new(ScriptedProvider::new());
    let (a, b) = aligned_pair();
    let service = MatchService::new(
        ModelClient::new(provider.clone()),
        Arc::new(InMemoryProfileStore::new([a, b])),
        RuntimeConfig::default(),
    );

    let err = service
        .match_by_ids("u-ravi", "u-ravi", MatchMode::MultiAgentV2)
        .await
        .unwrap_err();
    assert_eq!(err, MatchError::DuplicateIdentity("u-ravi".to_string()));

    let err = service
        .run_agent_by_ids("risks", "u-ravi", "nobody")
        .await
        .unwrap_err();
    assert_eq!(err, MatchError::ProfileNotFound("nobody".to_string()));

    let err = service
        .run_agent_by_ids("astrology", "u-ravi", "u-amelie")
        .await
        .unwrap_err();
    assert_eq!(err, MatchError::UnknownAgent("astrology".to_string()));

    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn structured_call_error_displays_last_error() {
    let err = StructuredCallError::Exhausted {
        attempts: 2,
        last: AttemptError::Provider(ProviderError::EmptyResponse),
    };
    assert!(err.to_string().starts_with("no conformant response after 2 attempt(s): "));
}

#[test]
fn demo_files_load() {
    let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");

    let store = InMemoryProfileStore::from_file(demos.join("profiles.yaml")).unwrap();
    assert_eq!(store.ids(), vec!["u-marie", "u-ravi", "u-sophie"]);

    let config = RuntimeConfig::from_file(demos.join("config.yaml")).unwrap();
    assert_eq!(config.agents.risques.max_attempts, Some(3));
    assert_eq!(config.agent_options(AgentKind::Risques).max_attempts, 3);
    assert_eq!(config.agent_options(AgentKind::Profil).max_attempts, 2);
}
