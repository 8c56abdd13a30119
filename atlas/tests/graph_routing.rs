//! Full-graph runs with scripted models: routing, budgets, and message
//! balance.

mod common;

use serde_json::json;

use atlas::memory::RunnableConfig;
use atlas::message::{unanswered_tool_calls, Message};
use atlas::state::AtlasAgentState;
use atlas::AgentMode;
use atlas::Checkpointer;

use common::{build_fixture, script_sql_pipeline, FixtureOptions};

fn user_turn(question: &str) -> AtlasAgentState {
    let mut state = AtlasAgentState::default();
    state.begin_turn(question);
    state
}

/// **Scenario**: SQL happy path — the agent calls query_tool, the pipeline
/// extracts, generates, validates, executes, and posts a balanced tool
/// message; the agent then answers.
#[tokio::test]
async fn sql_happy_path() {
    let fixture = build_fixture(FixtureOptions::default());
    fixture.llm.push_tool_call(
        "call_1",
        "query_tool",
        json!({"question": "Top 5 exports of Brazil in 2020"}),
    );
    script_sql_pipeline(&fixture);
    fixture.llm.push_text(
        "SELECT p.name_short_en AS product, SUM(cpy.export_value) AS export_value\n\
         FROM hs92.country_product_year_4 cpy\n\
         JOIN classification.location_country lc ON cpy.country_id = lc.country_id\n\
         JOIN classification.product_hs92 p ON cpy.product_id = p.product_id\n\
         WHERE lc.iso3_code = 'BRA' AND cpy.year = 2020\n\
         GROUP BY p.name_short_en ORDER BY export_value DESC LIMIT 5",
    );
    fixture
        .llm
        .push_text("Brazil's top exports in 2020 were led by soybeans and iron ore.");

    let state = fixture
        .graph
        .invoke(
            user_turn("Top 5 exports of Brazil in 2020"),
            &RunnableConfig::for_thread("t-sql-1"),
        )
        .await
        .unwrap();

    assert_eq!(state.queries_executed, 1);
    assert_eq!(state.turn_queries.len(), 1);
    assert!(state.turn_queries[0].sql.starts_with("SELECT"));
    assert_eq!(state.turn_queries[0].row_count, 2);
    assert!(state
        .turn_queries[0]
        .tables
        .contains(&"hs92.country_product_year_4".to_string()));
    assert!(unanswered_tool_calls(&state.messages).is_empty());
    assert!(state
        .last_message()
        .unwrap()
        .content()
        .contains("soybeans"));

    // Checkpoint persisted at step boundaries: latest snapshot equals the
    // final state.
    let saved = fixture.checkpointer.get_latest("t-sql-1").await.unwrap();
    assert_eq!(saved.unwrap().messages.len(), state.messages.len());
}

/// **Scenario**: GraphQL reject path — classification rejects, the pipeline
/// short-circuits to the formatter, no remote call happens, and the agent
/// gets the rejection as a tool message.
#[tokio::test]
async fn graphql_reject_short_circuits() {
    let fixture = build_fixture(FixtureOptions::default());
    fixture.llm.push_tool_call(
        "call_g1",
        "atlas_graphql",
        json!({"question": "average export value by continent"}),
    );
    fixture.lightweight.push_structured(json!({
        "reasoning": "needs aggregation",
        "query_type": "reject",
        "rejection_reason": "requires a custom SQL aggregation",
    }));
    fixture.llm.push_text("I could not answer that via the API.");

    let state = fixture
        .graph
        .invoke(
            user_turn("average export value by continent"),
            &RunnableConfig::for_thread("t-reject"),
        )
        .await
        .unwrap();

    assert!(fixture.graphql.calls.lock().unwrap().is_empty());
    assert_eq!(state.queries_executed, 1);
    let rejection = state
        .messages
        .iter()
        .find(|m| matches!(m, Message::Tool { .. }))
        .unwrap();
    assert!(rejection.content().contains("Rejection reason"));
    assert!(state.graphql_atlas_links.is_empty());
}

/// **Scenario**: GraphQL happy path — classify, extract, resolve against the
/// catalogs, execute, post-process, and preserve links.
#[tokio::test]
async fn graphql_happy_path() {
    let items: Vec<serde_json::Value> = (0..30)
        .map(|i| json!({"productId": 650, "year": 2024, "exportValue": (30 - i) as f64}))
        .collect();
    let fixture = build_fixture(FixtureOptions {
        graphql_responses: vec![Ok(json!({ "countryProductYear": items }))],
        ..Default::default()
    });
    fixture.llm.push_tool_call(
        "call_g1",
        "atlas_graphql",
        json!({"question": "What does Kenya export?"}),
    );
    fixture.lightweight.push_structured(json!({
        "reasoning": "snapshot of exports",
        "query_type": "treemap_products",
        "api_target": "explore",
    }));
    fixture.lightweight.push_structured(json!({
        "reasoning": "Kenya",
        "country_name": "Kenya",
        "country_code_guess": "KEN",
        "year": 2024,
    }));
    fixture.llm.push_text("Kenya's export basket is led by tea and cut flowers.");

    let state = fixture
        .graph
        .invoke(
            user_turn("What does Kenya export?"),
            &RunnableConfig::for_thread("t-gql"),
        )
        .await
        .unwrap();

    assert_eq!(fixture.graphql.calls.lock().unwrap().len(), 1);
    assert_eq!(state.queries_executed, 1);
    assert!(!state.graphql_atlas_links.is_empty());
    let tool_message = state
        .messages
        .iter()
        .find(|m| matches!(m, Message::Tool { .. }))
        .unwrap();
    assert!(tool_message.content().contains("_postProcessed"));
    assert!(tool_message.content().contains("productName"));
}

/// **Scenario**: max_uses = 0 blocks the very first data tool call; the
/// agent gets the budget-exceeded message and must answer.
#[tokio::test]
async fn max_uses_zero_blocks_first_call() {
    let fixture = build_fixture(FixtureOptions {
        max_uses: 0,
        ..Default::default()
    });
    fixture.llm.push_tool_call(
        "call_1",
        "query_tool",
        json!({"question": "anything"}),
    );
    fixture.llm.push_text("I cannot run more queries for this question.");

    let state = fixture
        .graph
        .invoke(user_turn("anything"), &RunnableConfig::for_thread("t-zero"))
        .await
        .unwrap();

    assert_eq!(state.queries_executed, 0);
    assert!(state
        .messages
        .iter()
        .any(|m| m.content().contains("Maximum number of queries exceeded")));
    assert!(unanswered_tool_calls(&state.messages).is_empty());
}

/// **Scenario**: docs_tool bypasses the budget even at max_uses = 0 and does
/// not increment the counter.
#[tokio::test]
async fn docs_tool_bypasses_budget() {
    let fixture = build_fixture(FixtureOptions {
        max_uses: 0,
        ..Default::default()
    });
    fixture.llm.push_tool_call(
        "call_d1",
        "docs_tool",
        json!({"question": "what is RCA?"}),
    );
    fixture
        .lightweight
        .push_structured(json!({"slug": "complexity_metrics"}));
    fixture
        .lightweight
        .push_text("RCA is revealed comparative advantage.");
    fixture.llm.push_text("RCA compares export shares.");

    let state = fixture
        .graph
        .invoke(user_turn("what is RCA?"), &RunnableConfig::for_thread("t-docs"))
        .await
        .unwrap();

    assert_eq!(state.queries_executed, 0);
    assert!(state
        .messages
        .iter()
        .any(|m| matches!(m, Message::Tool { name, .. } if name == "docs_tool")));
}

/// **Scenario**: AUTO mode with an exhausted budget binds only SQL + docs;
/// with budget available it binds all three tools.
#[tokio::test]
async fn auto_mode_tool_binding_follows_budget() {
    let fixture = build_fixture(FixtureOptions {
        agent_mode: AgentMode::Auto,
        ..Default::default()
    });
    fixture.llm.push_text("hello");
    fixture
        .graph
        .invoke(user_turn("hi"), &RunnableConfig::default())
        .await
        .unwrap();
    {
        let bindings = fixture.llm.tool_bindings.lock().unwrap();
        assert!(bindings[0].contains(&"atlas_graphql".to_string()));
    }

    // Exhaust the budget, then run again: the GraphQL tool disappears.
    while fixture.budget.consume(None) {}
    fixture.llm.push_text("hello again");
    fixture
        .graph
        .invoke(user_turn("hi again"), &RunnableConfig::default())
        .await
        .unwrap();
    let bindings = fixture.llm.tool_bindings.lock().unwrap();
    let last = bindings.last().unwrap();
    assert!(last.contains(&"query_tool".to_string()));
    assert!(!last.contains(&"atlas_graphql".to_string()));
}

/// **Scenario**: conversation history survives across turns through the
/// checkpointer; overrides persist for the conversation lifetime.
#[tokio::test]
async fn cross_turn_checkpointing() {
    let fixture = build_fixture(FixtureOptions::default());
    fixture.llm.push_text("Hello! Ask me about trade data.");

    let mut first = AtlasAgentState::default();
    first.override_schema = Some(atlas::TradeSchema::Hs12);
    first.begin_turn("hello");
    let first = fixture
        .graph
        .invoke(first, &RunnableConfig::for_thread("t-conv"))
        .await
        .unwrap();

    // Second turn: load the checkpoint the way the service does.
    let mut second = fixture
        .checkpointer
        .get_latest("t-conv")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.messages.len(), first.messages.len());
    assert_eq!(second.override_schema, Some(atlas::TradeSchema::Hs12));

    fixture.llm.push_text("Still here.");
    second.begin_turn("are you there?");
    let second = fixture
        .graph
        .invoke(second, &RunnableConfig::for_thread("t-conv"))
        .await
        .unwrap();
    assert_eq!(second.messages.len(), first.messages.len() + 2);
}
