//! Conversation loop tests
//!
//! Drive the agent with a scripted oracle over the fake browser.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use browsing_agent::agent::{AgentEvent, AgentRole, AssistantIdentity, IdentityStore, Termination};
use browsing_agent::core::AgentError;
use browsing_agent::llm::LLMResponse;
use common::{call, harness, harness_with, tool_reply, PAGE_TEXT};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn paris_script() -> Vec<LLMResponse> {
    vec![
        tool_reply(
            "call_1",
            "jump_to_search_engine",
            json!({"query": "weather in Paris"}),
        ),
        tool_reply("call_2", "read_url", json!({})),
        LLMResponse::text("It's 15°C. TERMINATE."),
    ]
}

#[tokio::test]
async fn test_paris_weather() {
    let h = harness(paris_script());

    let outcome = h
        .agent
        .run("What is the weather in Paris?", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    assert_eq!(outcome.final_message, "It's 15°C. TERMINATE.");
    assert_eq!(outcome.tool_dispatches, 2);
    assert_eq!(outcome.turns, 3);
    assert_eq!(outcome.termination, Termination::Sentinel);

    // The last request carries both observations, answered by call id
    let requests = h.oracle.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last[0].role, "system");
    assert_eq!(last[1].content, "What is the weather in Paris?");
    let tool_messages: Vec<_> = last.iter().filter(|m| m.role == "tool").collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call_2"));
    assert!(tool_messages[1].content.contains(PAGE_TEXT));
}

#[tokio::test]
async fn test_turns_go_through_resolved_assistant() {
    let h = harness(paris_script());

    h.agent
        .run("What is the weather in Paris?", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    let stored = h.store.get(AgentRole::BrowsingAgent).await.unwrap().unwrap();
    let answered_by = h.oracle.answered_by.lock().unwrap();
    assert_eq!(answered_by.len(), 3);
    assert!(answered_by.iter().all(|id| *id == stored.remote_id));

    // The thread only receives what it has not seen
    let delivered = h.oracle.delivered_roles.lock().unwrap();
    assert_eq!(delivered[0], vec!["system", "user"]);
    assert_eq!(delivered[1], vec!["assistant", "tool"]);
    assert_eq!(delivered[2], vec!["assistant", "tool"]);
}

#[tokio::test]
async fn test_no_tool_calls_ends_after_one_turn() {
    let h = harness(vec![LLMResponse::text("I cannot browse for that.")]);

    let outcome = h
        .agent
        .run("Book me a flight", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.tool_dispatches, 0);
    assert_eq!(outcome.termination, Termination::NoToolCalls);
    assert_eq!(outcome.final_message, "I cannot browse for that.");
    assert_eq!(h.oracle.chat_calls(), 1);
}

#[tokio::test]
async fn test_turn_limit() {
    let script = (0..5)
        .map(|i| tool_reply(&format!("call_{}", i), "wait", json!({"seconds": 0})))
        .collect();
    let h = harness_with(script, |config| config.agent.max_turns = 3);

    let outcome = h
        .agent
        .run("Keep waiting", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    assert_eq!(outcome.turns, 3);
    assert_eq!(outcome.tool_dispatches, 3);
    assert_eq!(outcome.termination, Termination::MaxTurns);
    assert_eq!(h.oracle.chat_calls(), 3);
}

#[tokio::test]
async fn test_dead_page_is_reset_and_retried_once() {
    let h = harness(vec![
        tool_reply("call_1", "click_element", json!({"text": "Next"})),
        LLMResponse::text("Clicked it. TERMINATE"),
    ]);

    let session = h.agent.browser().acquire().await.unwrap();
    h.browser.crash_current_page();

    let outcome = h
        .agent
        .run("Go to the next page", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    assert_eq!(outcome.tool_dispatches, 1);
    assert_eq!(session.replacements(), 1);
    assert_eq!(h.browser.pages_opened.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.browser.actions(),
        vec!["click text \"Next\" on page 2".to_string()]
    );

    let requests = h.oracle.requests.lock().unwrap();
    let observation = requests[1].last().unwrap();
    assert_eq!(observation.role, "tool");
    assert!(observation.content.starts_with("Clicked element"));
}

#[tokio::test]
async fn test_second_dead_page_is_reported() {
    let h = harness(vec![
        tool_reply("call_1", "click_element", json!({"selector": "#next"})),
        LLMResponse::text("The page keeps crashing. TERMINATE"),
    ]);

    let session = h.agent.browser().acquire().await.unwrap();
    h.browser.crash_current_page();
    h.browser.pages_born_dead.store(true, Ordering::SeqCst);

    let outcome = h
        .agent
        .run("Click next", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Sentinel);
    assert_eq!(session.replacements(), 1);
    assert!(h.browser.actions().is_empty());

    let requests = h.oracle.requests.lock().unwrap();
    let observation: serde_json::Value =
        serde_json::from_str(&requests[1].last().unwrap().content).unwrap();
    assert_eq!(observation["ok"], false);
    assert_eq!(observation["kind"], "page_unavailable");
}

#[tokio::test]
async fn test_page_error_is_not_retried() {
    let h = harness(vec![
        tool_reply("call_1", "click_element", json!({"selector": "#missing"})),
        LLMResponse::text("No such button. TERMINATE"),
    ]);

    h.agent
        .run("Click the missing button", AgentRole::BrowsingAgent)
        .await
        .unwrap();

    assert_eq!(h.browser.pages_opened.load(Ordering::SeqCst), 1);
    let requests = h.oracle.requests.lock().unwrap();
    assert!(requests[1].last().unwrap().content.contains("\"kind\":\"page\""));
}

#[tokio::test]
async fn test_identity_created_once_and_reused() {
    let h = harness(vec![
        LLMResponse::text("First. TERMINATE"),
        LLMResponse::text("Second. TERMINATE"),
    ]);

    h.agent.run("one", AgentRole::BrowsingAgent).await.unwrap();
    let stored = h.store.get(AgentRole::BrowsingAgent).await.unwrap().unwrap();
    assert_eq!(stored.remote_id, "asst_1");
    assert!(stored.instructions.contains("TERMINATE"));

    h.agent.run("two", AgentRole::BrowsingAgent).await.unwrap();

    assert_eq!(h.oracle.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.oracle.retrievals.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.store.get(AgentRole::BrowsingAgent).await.unwrap(),
        Some(stored)
    );
}

#[tokio::test]
async fn test_stale_identity_is_replaced() {
    let h = harness(vec![LLMResponse::text("Done. TERMINATE")]);
    h.store
        .compare_and_set(
            AgentRole::BrowsingAgent,
            None,
            AssistantIdentity {
                name: "BrowsingAgent".into(),
                remote_id: "asst_deleted".into(),
                instructions: "old".into(),
            },
        )
        .await
        .unwrap();

    h.agent.run("task", AgentRole::BrowsingAgent).await.unwrap();

    let stored = h.store.get(AgentRole::BrowsingAgent).await.unwrap().unwrap();
    assert_eq!(stored.remote_id, "asst_1");
    assert_eq!(h.oracle.created.load(Ordering::SeqCst), 1);
    assert_eq!(*h.oracle.answered_by.lock().unwrap(), vec!["asst_1"]);
}

#[tokio::test]
async fn test_concurrent_conversations_share_one_identity() {
    let h = harness(vec![
        LLMResponse::text("A. TERMINATE"),
        LLMResponse::text("B. TERMINATE"),
    ]);
    let agent = Arc::new(h.agent);

    let (a, b) = tokio::join!(
        agent.run("first", AgentRole::BrowsingAgent),
        agent.run("second", AgentRole::BrowsingAgent)
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(h.oracle.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.browser.launches.load(Ordering::SeqCst), 1);
    // Each conversation started from its own system prompt and task
    for request in h.oracle.requests.lock().unwrap().iter() {
        assert_eq!(request.len(), 2);
    }
}

#[tokio::test]
async fn test_content_role_never_touches_browser() {
    let h = harness(vec![
        tool_reply("call_1", "read_url", json!({"url": "example.com"})),
        LLMResponse::with_tools(
            "",
            vec![call(
                "call_2",
                "analyze_content",
                json!({"content": "Paris is mild today. Expect 15°C."}),
            )],
        ),
        LLMResponse::text("Mild. TERMINATE"),
    ]);

    let outcome = h
        .agent
        .run("Summarise this", AgentRole::ContentAgent)
        .await
        .unwrap();

    assert_eq!(outcome.tool_dispatches, 2);
    assert_eq!(h.browser.launches.load(Ordering::SeqCst), 0);

    let offered = h.oracle.offered_tools.lock().unwrap();
    assert!(!offered[0].iter().any(|name| name == "read_url"));
    assert!(offered[0].iter().any(|name| name == "analyze_content"));

    let requests = h.oracle.requests.lock().unwrap();
    let rejected: serde_json::Value =
        serde_json::from_str(&requests[1].last().unwrap().content).unwrap();
    assert_eq!(rejected["kind"], "unknown_tool");
}

#[tokio::test]
async fn test_oracle_failure_propagates() {
    let h = harness(vec![tool_reply("call_1", "go_back", json!({}))]);

    let err = h
        .agent
        .run("Go back", AgentRole::BrowsingAgent)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Oracle(_)));
    // The browser outlives a failed conversation
    assert!(h.agent.browser().current().await.is_some());
}

#[tokio::test]
async fn test_browser_launch_failure_fails_conversation() {
    let h = harness(vec![LLMResponse::text("unused")]);
    h.browser.fail_launch.store(true, Ordering::SeqCst);

    let err = h
        .agent
        .run("anything", AgentRole::BrowsingAgent)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Browser(_)));
    assert_eq!(h.oracle.chat_calls(), 0);
}

#[tokio::test]
async fn test_streaming_event_order() {
    let h = harness(paris_script());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = h
        .agent
        .run_streaming(
            "What is the weather in Paris?",
            AgentRole::BrowsingAgent,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Token { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "It's 15°C. TERMINATE.");

    let steps: Vec<&AgentEvent> = events
        .iter()
        .filter(|e| !matches!(e, AgentEvent::Token { .. }))
        .collect();
    assert_eq!(steps.len(), 6);
    assert!(matches!(steps[0], AgentEvent::ToolCall { name, .. } if name == "jump_to_search_engine"));
    assert!(matches!(steps[1], AgentEvent::ToolResult { id, ok: true, .. } if id == "call_1"));
    assert!(matches!(steps[2], AgentEvent::ToolCall { name, .. } if name == "read_url"));
    assert!(matches!(steps[3], AgentEvent::ToolResult { id, ok: true, .. } if id == "call_2"));
    assert!(matches!(steps[4], AgentEvent::Assistant { turn: 3, .. }));
    assert_eq!(steps[5], &AgentEvent::Final(outcome));
}

#[tokio::test]
async fn test_cancel_skips_remaining_calls() {
    let h = harness(vec![
        LLMResponse::with_tools(
            "",
            vec![
                call("call_1", "jump_to_search_engine", json!({"query": "paris"})),
                call("call_2", "read_url", json!({})),
            ],
        ),
        LLMResponse::text("never reached"),
    ]);
    let cancel = CancellationToken::new();
    *h.browser.cancel_on_navigate.lock().unwrap() = Some(cancel.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = h
        .agent
        .run_streaming("weather", AgentRole::BrowsingAgent, tx, cancel)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Cancelled);
    assert_eq!(outcome.tool_dispatches, 1);
    assert_eq!(outcome.turns, 1);
    assert_eq!(h.oracle.chat_calls(), 1);

    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    assert!(matches!(last, Some(AgentEvent::Final(_))));

    // The browser stays up for the next conversation
    assert!(h.agent.browser().current().await.is_some());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = harness(vec![LLMResponse::text("never reached")]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = h
        .agent
        .run_streaming("weather", AgentRole::BrowsingAgent, tx, cancel)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Cancelled);
    assert_eq!(outcome.turns, 0);
    assert_eq!(h.oracle.chat_calls(), 0);
}
