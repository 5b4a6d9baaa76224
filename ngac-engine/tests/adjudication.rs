// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use ngac_core::{
    AdminCommand, CommandOutcome, NodeId, PolicyError, PolicyQuery, StatementKind,
};
use ngac_engine::test_utils::{
    ConflictingLog, TestNode, author, compiler, setup_logging, test_config,
};
use ngac_engine::{
    AdjudicationError, Adjudicator, Code, CommandError, CommandHandler, CurrentRevision,
    ErrorKind, PluginRoutines, Replica, Status,
};
use ngac_log::{EventLogError, MemoryEventLog};
use ngac_store::MemoryPolicyStore;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(2);

async fn write(node: &TestNode<MemoryEventLog>, command: AdminCommand) -> Option<NodeId> {
    let adjudicated = node
        .adjudicator
        .adjudicate_command(&author(), &command)
        .await
        .unwrap();
    assert!(node.wait_for_replica(adjudicated.revision, TIMEOUT).await);
    adjudicated.value.node_id()
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_adjudications_leave_no_trace() {
    setup_logging();

    let log = MemoryEventLog::new();
    let node = TestNode::spawn(log.clone(), &test_config());

    let pc = write(&node, AdminCommand::CreatePolicyClass { name: "pc1".into() })
        .await
        .unwrap();
    write(
        &node,
        AdminCommand::CreateUserAttribute {
            name: "ua1".into(),
            descendants: vec![pc],
        },
    )
    .await;

    let before = node.replica.lock().await.store().graph().clone();

    // Second command of the batch violates a rule, the first one must not survive either.
    let result = node
        .adjudicator
        .adjudicate_commands(
            &author(),
            &[
                AdminCommand::CreateObjectAttribute {
                    name: "oa1".into(),
                    descendants: vec![pc],
                },
                AdminCommand::CreateUserAttribute {
                    name: "ua1".into(),
                    descendants: vec![pc],
                },
            ],
        )
        .await;
    assert_matches!(
        result,
        Err(AdjudicationError::Command(CommandError::Policy(
            PolicyError::NodeNameExists(_)
        )))
    );

    // Malformed declaration is rejected before anything is executed.
    let result = node
        .adjudicator
        .adjudicate_command(
            &author(),
            &AdminCommand::CreateObligation {
                source: r#"
                    create pc "pc2"
                    create obligation "audit" { when any user performs "read" { log() } }
                "#
                .into(),
            },
        )
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
    assert_eq!(
        err.to_string(),
        "only one create obligation statement allowed"
    );
    assert_matches!(
        err,
        AdjudicationError::Command(CommandError::NotSingleDeclaration(
            StatementKind::CreateObligation
        ))
    );

    let replica = node.replica.lock().await;
    assert_eq!(replica.store().graph(), &before);
    assert_eq!(replica.store().obligation("audit").unwrap(), None);
    assert!(!replica.store().node_exists("pc2").unwrap());
    assert_eq!(replica.store().transaction_depth(), 0);
    assert_eq!(log.tail("policy").await, 2);
}

#[tokio::test]
async fn conflicts_are_retried_three_times() {
    setup_logging();

    let log = ConflictingLog::new();
    let config = test_config();
    let replica = Replica::new(MemoryPolicyStore::new()).shared();
    let before = replica.lock().await.store().graph().clone();

    let adjudicator = Adjudicator::new(
        log.clone(),
        &config,
        replica.clone(),
        CommandHandler::new(compiler()),
        Arc::new(PluginRoutines::new()),
        Arc::new(CurrentRevision::new(0)),
    );

    let started = Instant::now();
    let err = adjudicator
        .adjudicate_command(
            &author(),
            &AdminCommand::CreatePolicyClass { name: "pc1".into() },
        )
        .await
        .unwrap_err();

    assert_matches!(
        err,
        AdjudicationError::ConflictRetriesExhausted {
            attempts: 3,
            source: EventLogError::Conflict { .. }
        }
    );
    assert_eq!(log.appends(), 3);

    // Two pauses between three attempts.
    assert!(started.elapsed() >= config.adjudicator.retry_interval * 2);

    assert!(err.kind().is_retryable());
    assert_eq!(Status::from(err).code, Code::Unavailable);
    assert_eq!(replica.lock().await.store().graph(), &before);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_writers() {
    setup_logging();

    let log = MemoryEventLog::new();
    let mut config = test_config();
    config.adjudicator = config
        .adjudicator
        .retry_interval(Duration::from_millis(100));

    config.consumer_group = "replica-a".into();
    let node_a = TestNode::spawn(log.clone(), &config);
    config.consumer_group = "replica-b".into();
    let node_b = TestNode::spawn(log.clone(), &config);

    write(&node_a, AdminCommand::CreatePolicyClass { name: "pc1".into() }).await;

    // The second writer might not know about the first event yet, then its append conflicts and
    // gets retried against the caught-up replica.
    let adjudicated = node_b
        .adjudicator
        .adjudicate_command(
            &author(),
            &AdminCommand::CreatePolicyClass { name: "pc2".into() },
        )
        .await
        .unwrap();
    assert_eq!(adjudicated.revision, 2);
    assert_matches!(adjudicated.value, CommandOutcome::NodeCreated(_));

    for node in [&node_a, &node_b] {
        assert!(node.wait_for_replica(2, TIMEOUT).await);
        let replica = node.replica.lock().await;
        assert!(replica.store().node_exists("pc1").unwrap());
        assert!(replica.store().node_exists("pc2").unwrap());
    }

    // Names stay unique across writers.
    let result = node_a
        .adjudicator
        .adjudicate_command(
            &author(),
            &AdminCommand::CreatePolicyClass { name: "pc2".into() },
        )
        .await;
    assert_matches!(
        result,
        Err(AdjudicationError::Command(CommandError::Policy(
            PolicyError::NodeNameExists(_)
        )))
    );
}

#[tokio::test]
async fn sequential_writes_do_not_wait_for_retries() {
    setup_logging();

    let log = MemoryEventLog::new();
    let mut config = test_config();
    config.adjudicator = config
        .adjudicator
        .retry_interval(Duration::from_secs(2));
    let node = TestNode::spawn(log.clone(), &config);

    // Every write is validated against the previous one, none of them conflicts.
    let started = Instant::now();
    for (index, name) in ["pc1", "pc2", "pc3", "pc4", "pc5"].into_iter().enumerate() {
        let adjudicated = node
            .adjudicator
            .adjudicate_command(
                &author(),
                &AdminCommand::CreatePolicyClass { name: name.into() },
            )
            .await
            .unwrap();
        assert_eq!(adjudicated.revision, index as u64 + 1);
    }

    assert!(started.elapsed() < config.adjudicator.retry_interval);
    assert_eq!(log.tail("policy").await, 5);
    assert_eq!(node.replica.lock().await.revision(), 5);
}
