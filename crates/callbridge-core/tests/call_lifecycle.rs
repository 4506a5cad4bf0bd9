// Two-party call lifecycle against the simulated gateway.

mod common;

use std::time::Duration;

use callbridge_core::{AnswerBehavior, BridgeMode, ControllerKind, SimulatedEndpoint};
use common::{auto_answer, eventually, exts, TestBed};

#[tokio::test]
async fn test_two_party_dial_lists_call() {
    let bed = TestBed::new(vec![
        auto_answer("1001").with_label("alice"),
        auto_answer("1002").with_label("bob"),
    ]);

    let bridge = bed.established(&["1001", "1002"], BridgeMode::Call).await;
    assert_eq!(bridge.as_str().len(), 4);
    assert!(bridge.as_str().chars().all(|c| c.is_ascii_uppercase()));
    assert!(bed
        .orchestrator
        .supervisor()
        .is_running(ControllerKind::Pair, bridge.as_str()));

    let calls = bed.orchestrator.list().await.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bridge_id, bridge);
    assert_eq!(calls[0].mode, BridgeMode::Call);
    let mut participants = calls[0].participants.clone();
    participants.sort();
    assert_eq!(participants, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn test_either_hangup_tears_down_call() {
    let bed = TestBed::answering(&["1001", "1002"]);
    let bridge = bed.established(&["1001", "1002"], BridgeMode::Call).await;

    bed.gateway.hangup_from_endpoint(&bed.leg_of("1002")).unwrap();

    let gateway = bed.gateway.clone();
    let registry = bed.orchestrator.registry().clone();
    let id = bridge.clone();
    eventually("call torn down", || {
        let gateway = gateway.clone();
        let registry = registry.clone();
        let id = id.clone();
        async move { registry.is_empty() && !gateway.bridge_exists(&id) && gateway.leg_count() == 0 }
    })
    .await;

    bed.quiesced().await;
    let stats = bed.gateway.stats();
    assert_eq!(stats.bridges_created, 1);
    assert_eq!(stats.bridges_deleted, 1);
    assert!(bed.orchestrator.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ringing_leg_hangup_cascades_to_other_leg() {
    let bed = TestBed::new(vec![
        auto_answer("1001"),
        SimulatedEndpoint::online("1002").with_answer(AnswerBehavior::Manual),
    ]);
    let bridge = bed.orchestrator.dial(&exts(&["1001", "1002"])).await.unwrap();
    bed.members_settle(&bridge, 1).await;
    assert!(!bed.orchestrator.registry().contains(&bridge));

    // Rejected while still ringing: the answered side must not be left alone.
    bed.gateway.hangup_from_endpoint(&bed.leg_of("1002")).unwrap();

    let gateway = bed.gateway.clone();
    let id = bridge.clone();
    eventually("cascade completed", || {
        let gateway = gateway.clone();
        let id = id.clone();
        async move { !gateway.bridge_exists(&id) && gateway.leg_count() == 0 }
    })
    .await;
    bed.quiesced().await;
    assert!(bed.orchestrator.registry().is_empty());
    assert_eq!(bed.gateway.stats().bridges_deleted, 1);
}

#[tokio::test]
async fn test_ring_timeout_ends_unanswered_call() {
    let bed = TestBed::with_ring_timeout(
        vec![
            auto_answer("1001"),
            SimulatedEndpoint::online("1002").with_answer(AnswerBehavior::Never),
        ],
        Duration::from_millis(150),
    );
    let bridge = bed.orchestrator.dial(&exts(&["1001", "1002"])).await.unwrap();

    let gateway = bed.gateway.clone();
    let id = bridge.clone();
    eventually("ring timeout cleanup", || {
        let gateway = gateway.clone();
        let id = id.clone();
        async move { !gateway.bridge_exists(&id) && gateway.leg_count() == 0 }
    })
    .await;
    bed.quiesced().await;
    assert!(bed.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_unanswered_conference_destroyed_by_last_leg() {
    let bed = TestBed::new(vec![
        SimulatedEndpoint::online("1001").with_answer(AnswerBehavior::Manual),
        SimulatedEndpoint::online("1002").with_answer(AnswerBehavior::Manual),
        SimulatedEndpoint::online("1003").with_answer(AnswerBehavior::Manual),
    ]);
    let bridge = bed
        .orchestrator
        .dial(&exts(&["1001", "1002", "1003"]))
        .await
        .unwrap();

    bed.gateway.hangup_from_endpoint(&bed.leg_of("1001")).unwrap();
    bed.gateway.hangup_from_endpoint(&bed.leg_of("1002")).unwrap();
    bed.gateway.hangup_from_endpoint(&bed.leg_of("1003")).unwrap();

    let gateway = bed.gateway.clone();
    let id = bridge.clone();
    eventually("bridge destroyed", || {
        let gateway = gateway.clone();
        let id = id.clone();
        async move { !gateway.bridge_exists(&id) && gateway.leg_count() == 0 }
    })
    .await;
    bed.quiesced().await;
    assert!(bed.orchestrator.registry().is_empty());
    assert_eq!(bed.gateway.stats().bridges_deleted, 1);
}

#[tokio::test]
async fn test_concurrent_calls_do_not_interfere() {
    let bed = TestBed::answering(&["1001", "1002", "1003", "1004"]);
    let first = bed.established(&["1001", "1002"], BridgeMode::Call).await;
    let second = bed.established(&["1003", "1004"], BridgeMode::Call).await;
    assert_ne!(first, second);
    assert_eq!(bed.orchestrator.list().await.unwrap().len(), 2);

    bed.gateway.hangup_from_endpoint(&bed.leg_of("1001")).unwrap();

    let registry = bed.orchestrator.registry().clone();
    let id = first.clone();
    eventually("first call gone", || {
        let registry = registry.clone();
        let id = id.clone();
        async move { !registry.contains(&id) }
    })
    .await;

    let calls = bed.orchestrator.list().await.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bridge_id, second);
    assert_eq!(calls[0].participants.len(), 2);
    assert_eq!(bed.gateway.legs_for("1003").len(), 1);
    assert_eq!(bed.gateway.legs_for("1004").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_departures_on_separate_calls() {
    let bed = TestBed::answering(&["1001", "1002", "1003", "1004", "1005", "1006"]);
    let first = bed.established(&["1001", "1002"], BridgeMode::Call).await;
    let second = bed.established(&["1003", "1004"], BridgeMode::Call).await;
    let bystander = bed.established(&["1005", "1006"], BridgeMode::Call).await;
    bed.members_settle(&first, 2).await;
    bed.members_settle(&second, 2).await;
    bed.members_settle(&bystander, 2).await;
    let before = bed.gateway.stats();

    let (leaving_first, leaving_second) = (bed.leg_of("1001"), bed.leg_of("1004"));
    let (gateway_a, gateway_b) = (bed.gateway.clone(), bed.gateway.clone());
    let (a, b) = tokio::join!(
        tokio::spawn(async move { gateway_a.hangup_from_endpoint(&leaving_first) }),
        tokio::spawn(async move { gateway_b.hangup_from_endpoint(&leaving_second) }),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    let gateway = bed.gateway.clone();
    let registry = bed.orchestrator.registry().clone();
    let ids = (first.clone(), second.clone());
    eventually("both calls torn down", || {
        let gateway = gateway.clone();
        let registry = registry.clone();
        let (first, second) = ids.clone();
        async move {
            !registry.contains(&first)
                && !registry.contains(&second)
                && !gateway.bridge_exists(&first)
                && !gateway.bridge_exists(&second)
        }
    })
    .await;

    // Only the two surviving partners were hung up by the controllers.
    let stats = bed.gateway.stats();
    assert_eq!(stats.bridges_deleted - before.bridges_deleted, 2);
    assert_eq!(stats.hangups - before.hangups, 2);
    for resource in ["1001", "1002", "1003", "1004"] {
        assert!(bed.gateway.legs_for(resource).is_empty(), "{} still up", resource);
    }

    let calls = bed.orchestrator.list().await.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bridge_id, bystander);
    assert_eq!(calls[0].participants.len(), 2);
}
