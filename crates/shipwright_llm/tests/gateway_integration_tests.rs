//! Integration tests for the generation gateway.

use std::sync::Arc;

use shipwright_core::{FileSet, GenerationConfig, JobKind, ModelTier};
use shipwright_llm::{
    build_generation_prompt, generation_system_prompt, GenerationGateway, LlmError,
    MockCompletionService, MockReply, Patch,
};

fn zero_backoff() -> GenerationConfig {
    GenerationConfig {
        base_backoff_ms: 0,
        max_backoff_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_generation_round_trip_onto_template() {
    let template = FileSet::new()
        .with_file("package.json", "{\"name\":\"starter\"}\n")
        .with_file("src/app/page.tsx", "export default function Page() { return null; }\n");

    let mock = MockCompletionService::new().add_text(
        "### FILE: src/app/page.tsx\n```tsx\nexport default function Page() {\n  return <h1>Todos</h1>;\n}\n```\n\
         ### FILE: src/components/TodoList.tsx\n```tsx\nexport function TodoList() { return <ul />; }\n```\n",
    );
    let gateway = GenerationGateway::new(Arc::new(mock.clone()), zero_backoff());

    let prompt = build_generation_prompt(JobKind::Initial, "a todo app", &template, &[]);
    let response = gateway
        .complete(&generation_system_prompt(), &prompt, ModelTier::Primary)
        .await
        .unwrap();
    let report = Patch::parse(&response).unwrap().apply(&template);

    assert_eq!(report.files.len(), 3);
    assert!(report.files.get("src/app/page.tsx").unwrap().contains("Todos"));
    assert_eq!(report.files.get("package.json"), Some("{\"name\":\"starter\"}\n"));

    let totals = gateway.ledger().totals();
    assert_eq!(totals.calls, 1);
    assert!(totals.input_tokens > 0);

    let sent = mock.requests();
    assert_eq!(sent[0].model, "gpt-4o");
    assert!(sent[0].user.contains("### package.json"));
}

#[tokio::test]
async fn test_overload_falls_back_to_fast_tier() {
    let mock = MockCompletionService::new().with_replies(vec![
        MockReply::status(429),
        MockReply::status(529),
        MockReply::status(503),
        MockReply::text("ok"),
    ]);
    let gateway = GenerationGateway::new(Arc::new(mock.clone()), zero_backoff());
    gateway.complete("s", "u", ModelTier::Primary).await.unwrap();
    assert_eq!(
        mock.models(),
        vec!["gpt-4o", "gpt-4o", "gpt-4o-mini", "gpt-4o-mini"]
    );
    assert_eq!(gateway.ledger().records()[0].tier, ModelTier::Fast);
}

#[tokio::test]
async fn test_no_fallback_configured_keeps_tier() {
    let mut config = zero_backoff();
    config.fallback.clear();
    let mock = MockCompletionService::new()
        .with_replies(vec![MockReply::network(), MockReply::network(), MockReply::text("ok")]);
    let gateway = GenerationGateway::new(Arc::new(mock.clone()), config);
    gateway.complete("s", "u", ModelTier::Primary).await.unwrap();
    assert!(mock.models().iter().all(|m| m == "gpt-4o"));
}

#[tokio::test]
async fn test_invalid_response_not_retried() {
    let mock = MockCompletionService::new().add_reply(MockReply::Fail(
        LlmError::InvalidResponse("garbled".into()),
    ));
    let gateway = GenerationGateway::new(Arc::new(mock.clone()), zero_backoff());
    assert!(gateway.complete("s", "u", ModelTier::Fast).await.is_err());
    assert_eq!(mock.call_count(), 1);
}
