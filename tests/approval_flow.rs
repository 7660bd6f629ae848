//! Approval coordinator integration tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agent_shell::{ApprovalCoordinator, ApprovalDecision, ApprovalTarget, ExecError};
use tokio::sync::mpsc;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn target(id: &str) -> ApprovalTarget {
    ApprovalTarget {
        id: id.to_string(),
        tool: "execute_command".to_string(),
        details: "rm -rf build/".to_string(),
    }
}

#[tokio::test]
async fn approve_round_trip() {
    init();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(ApprovalCoordinator::new(tx));

    // Frontend stand-in: approve whatever arrives.
    let responder = Arc::clone(&coordinator);
    tokio::spawn(async move {
        let request = rx.recv().await.unwrap();
        let results: HashMap<_, _> = request
            .targets
            .iter()
            .map(|t| (t.id.clone(), ApprovalDecision::approve()))
            .collect();
        responder.handle_response(&request.approval_id, results);
    });

    let results = coordinator
        .request_approval(vec![target("t1")])
        .await
        .unwrap();
    assert!(results["t1"].approved);
    assert!(!coordinator.is_pending());
}

#[tokio::test]
async fn denial_carries_the_reason() {
    init();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(ApprovalCoordinator::new(tx));

    let responder = Arc::clone(&coordinator);
    tokio::spawn(async move {
        let request = rx.recv().await.unwrap();
        let mut results = HashMap::new();
        results.insert(
            request.targets[0].id.clone(),
            ApprovalDecision::deny("too destructive"),
        );
        responder.handle_response(&request.approval_id, results);
    });

    let results = coordinator
        .request_approval(vec![target("t1")])
        .await
        .unwrap();
    assert!(!results["t1"].approved);
    assert_eq!(results["t1"].reason.as_deref(), Some("too destructive"));
}

#[tokio::test]
async fn second_request_while_pending_is_busy() {
    init();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(ApprovalCoordinator::new(tx));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.request_approval(vec![target("t1")]).await })
    };
    // Wait until the first request is actually on the wire.
    let request = rx.recv().await.unwrap();

    let err = coordinator
        .request_approval(vec![target("t2")])
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::ApprovalBusy), "got {err}");

    // The first request is untouched and still resolves.
    let mut results = HashMap::new();
    results.insert("t1".to_string(), ApprovalDecision::approve());
    coordinator.handle_response(&request.approval_id, results);
    let resolved = first.await.unwrap().unwrap();
    assert!(resolved["t1"].approved);
}

#[tokio::test]
async fn stale_response_is_ignored() {
    init();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(ApprovalCoordinator::new(tx));

    let pending = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.request_approval(vec![target("t1")]).await })
    };
    let request = rx.recv().await.unwrap();

    // A response with the wrong id must not consume the pending slot.
    let mut stale = HashMap::new();
    stale.insert("t1".to_string(), ApprovalDecision::deny("stale"));
    coordinator.handle_response("not-the-right-id", stale);
    assert!(coordinator.is_pending());

    let mut results = HashMap::new();
    results.insert("t1".to_string(), ApprovalDecision::approve());
    coordinator.handle_response(&request.approval_id, results);
    let resolved = pending.await.unwrap().unwrap();
    assert!(resolved["t1"].approved);
}

#[tokio::test]
async fn timeout_clears_the_slot_for_the_next_request() {
    init();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(ApprovalCoordinator::new(tx));
    coordinator.set_timeout(Duration::from_millis(50));

    let err = coordinator
        .request_approval(vec![target("t1")])
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::ApprovalTimeout(_)), "got {err}");
    assert!(!coordinator.is_pending());
    let _ = rx.recv().await; // drain the unanswered request

    // A fresh request goes through.
    let responder = Arc::clone(&coordinator);
    tokio::spawn(async move {
        let request = rx.recv().await.unwrap();
        let mut results = HashMap::new();
        results.insert("t2".to_string(), ApprovalDecision::approve());
        responder.handle_response(&request.approval_id, results);
    });
    coordinator.set_timeout(Duration::from_secs(5));
    let results = coordinator
        .request_approval(vec![target("t2")])
        .await
        .unwrap();
    assert!(results["t2"].approved);
}

#[tokio::test]
async fn closed_frontend_is_a_channel_error() {
    init();
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let coordinator = ApprovalCoordinator::new(tx);

    let err = coordinator
        .request_approval(vec![target("t1")])
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::ApprovalChannel(_)), "got {err}");
    assert!(!coordinator.is_pending());
}
