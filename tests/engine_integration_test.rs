/*!
 * End-to-end tests: declared rule -> engine -> injector hooks
 */

mod common;

use common::{
    regionless_topology, topology, FlakyAddresses, RecordingPool, DEFAULT, EAST, PRIMARY,
    SECONDARY_A, SECONDARY_B, WEST,
};
use faultline::logging::init_test_logging;
use faultline::rules::{
    ConnectionErrorKind, ConnectionErrorResult, ConnectionType, EffectiveRule,
    FaultInjectionCondition, FaultInjectionEndpoints, FaultInjectionRule, FeedRange, OperationType,
    RequestArgs, ResourceType, ServerErrorKind, ServerErrorResult,
};
use faultline::scheduler::InjectionScheduler;
use faultline::{
    CollaboratorError, EngineConfig, FaultError, FaultInjectionEngine, Resolvers, StaticTopology,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn engine_with(topology: StaticTopology, pool: Arc<RecordingPool>) -> FaultInjectionEngine {
    init_test_logging();
    let scheduler = Arc::new(InjectionScheduler::with_handle(Handle::current()));
    FaultInjectionEngine::with_scheduler(
        EngineConfig::default(),
        Resolvers::from_single(Arc::new(topology)),
        pool,
        scheduler,
    )
    .unwrap()
}

fn engine() -> FaultInjectionEngine {
    engine_with(topology(), RecordingPool::new(&[]))
}

fn direct() -> FaultInjectionCondition {
    FaultInjectionCondition::builder()
        .connection_type(ConnectionType::Direct)
        .build()
        .unwrap()
}

fn server_rule(id: &str, result: ServerErrorResult) -> FaultInjectionRule {
    FaultInjectionRule::builder(id)
        .condition(direct())
        .server_error(result)
        .build()
        .unwrap()
}

fn read_from(endpoint: &str) -> RequestArgs {
    RequestArgs::new(ConnectionType::Direct, "coll-1", OperationType::Read, ResourceType::Document)
        .with_routed_endpoint(endpoint)
}

fn connection_result(interval_ms: u64) -> ConnectionErrorResult {
    ConnectionErrorResult::new(
        ConnectionErrorKind::ConnectionReset,
        Duration::from_millis(interval_ms),
        2,
    )
    .unwrap()
}

#[tokio::test]
async fn test_gone_applies_twice_per_logical_request() {
    let engine = engine();
    let gone = ServerErrorResult::builder(ServerErrorKind::Gone)
        .times(2)
        .build()
        .unwrap();
    engine.configure(&server_rule("gone-twice", gone), "orders").await.unwrap();

    let injector = engine.direct_injector();
    let first = read_from(WEST);

    let error = injector.inject_response_error(&first).unwrap().unwrap();
    assert_eq!(error.status_code(), 410);
    assert_eq!(error.rule_id(), "gone-twice");

    // Retries share the context of the first attempt
    let second = read_from(WEST).with_context(first.context.clone());
    assert!(injector.inject_response_error(&second).unwrap().is_some());

    let third = read_from(WEST).with_context(first.context.clone());
    assert!(injector.inject_response_error(&third).unwrap().is_none());

    assert_eq!(first.context.applied_count("gone-twice"), 2);
    let trail = first.context.evaluation_trail();
    assert!(trail.iter().any(|entry| entry.contains("apply limit reached")));

    // A new logical request starts over
    assert!(injector.inject_response_error(&read_from(WEST)).unwrap().is_some());
}

#[tokio::test]
async fn test_hit_limit_caps_applications() {
    let engine = engine();
    let rule = FaultInjectionRule::builder("capped")
        .condition(direct())
        .hit_limit(3)
        .server_error(
            ServerErrorResult::builder(ServerErrorKind::InternalServerError)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let effective = engine.configure(&rule, "orders").await.unwrap();

    let injector = engine.direct_injector();
    let applied = (0..10)
        .filter(|_| injector.inject_response_error(&read_from(EAST)).unwrap().is_some())
        .count();

    assert_eq!(applied, 3);
    assert_eq!(effective.hit_count(), 3);
}

#[tokio::test]
async fn test_first_registered_rule_wins() {
    let engine = engine();
    let timeout = || ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap();
    let first = engine.configure(&server_rule("first", timeout()), "orders").await.unwrap();
    let second = engine.configure(&server_rule("second", timeout()), "orders").await.unwrap();

    let injector = engine.direct_injector();
    for _ in 0..5 {
        let error = injector.inject_response_error(&read_from(WEST)).unwrap().unwrap();
        assert_eq!(error.rule_id(), "first");
    }

    assert_eq!(first.hit_count(), 5);
    assert_eq!(second.hit_count(), 0);
}

#[tokio::test]
async fn test_zero_injection_rate_never_fires() {
    let engine = engine();
    let result = ServerErrorResult::builder(ServerErrorKind::TooManyRequests)
        .injection_rate(0.0)
        .build()
        .unwrap();
    let effective = engine.configure(&server_rule("never", result), "orders").await.unwrap();

    let injector = engine.direct_injector();
    for _ in 0..20 {
        assert!(injector.inject_response_error(&read_from(WEST)).unwrap().is_none());
    }
    assert_eq!(effective.hit_count(), 0);
}

#[tokio::test]
async fn test_stale_addresses_gone_stops_after_refresh() {
    let engine = engine();
    let result = ServerErrorResult::builder(ServerErrorKind::StaleAddressesServerGone)
        .build()
        .unwrap();
    engine.configure(&server_rule("stale", result), "orders").await.unwrap();

    let injector = engine.direct_injector();
    let first = read_from(WEST);
    assert!(injector.inject_response_error(&first).unwrap().is_some());

    first.context.mark_address_refreshed();
    let retry = read_from(WEST).with_context(first.context.clone());
    assert!(injector.inject_response_error(&retry).unwrap().is_none());
    assert!(first
        .context
        .evaluation_trail()
        .iter()
        .any(|entry| entry.contains("address refresh already forced")));
}

#[tokio::test]
async fn test_response_delay_fires_at_one_hook() {
    let engine = engine();
    let before = ServerErrorResult::builder(ServerErrorKind::ResponseDelay)
        .delay(Duration::from_millis(250))
        .suppress_service_requests(false)
        .build()
        .unwrap();
    engine.configure(&server_rule("delay-before", before), "orders").await.unwrap();

    let injector = engine.direct_injector();
    let args = read_from(WEST);
    assert_eq!(injector.inject_response_delay_after_send(&args), None);
    assert_eq!(
        injector.inject_response_delay_before_send(&args),
        Some(Duration::from_millis(250))
    );
    assert_eq!(args.context.applied_rule_ids(), vec!["delay-before".to_string()]);
}

#[tokio::test]
async fn test_gateway_injector_ignores_direct_requests() {
    let engine = engine();
    let result = ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap();
    engine.configure(&server_rule("direct-only", result), "orders").await.unwrap();

    assert!(engine
        .gateway_injector()
        .inject_response_error(&read_from(WEST))
        .unwrap()
        .is_none());
    assert!(engine
        .direct_injector()
        .inject_response_error(&read_from(WEST))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_write_rule_targets_primary_only() {
    let engine = engine();
    let endpoints = FaultInjectionEndpoints::new(FeedRange::full())
        .with_replica_count(3)
        .unwrap();
    let condition = FaultInjectionCondition::builder()
        .connection_type(ConnectionType::Direct)
        .operation_type(OperationType::Create)
        .region("West US")
        .primary_only(true)
        .endpoints(endpoints)
        .build()
        .unwrap();
    let rule = FaultInjectionRule::builder("west-writes")
        .condition(condition)
        .server_error(ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap())
        .build()
        .unwrap();

    let summary = engine.configure(&rule, "orders").await.unwrap().summary();
    assert_eq!(summary.container_id, "coll-1");
    assert_eq!(summary.operation_type, Some(OperationType::Create));
    assert_eq!(summary.region_endpoints, vec![WEST.to_string(), DEFAULT.to_string()]);
    assert_eq!(summary.addresses, vec![PRIMARY.to_string()]);
    assert!(summary.primary_only);

    let injector = engine.direct_injector();
    let write = |address: &str, is_primary: bool| {
        RequestArgs::new(
            ConnectionType::Direct,
            "coll-1",
            OperationType::Create,
            ResourceType::Document,
        )
        .with_routed_endpoint(WEST)
        .with_physical_address(address, is_primary)
    };
    assert!(injector.inject_response_error(&write(PRIMARY, true)).unwrap().is_some());
    assert!(injector.inject_response_error(&write(SECONDARY_A, false)).unwrap().is_none());
}

#[tokio::test]
async fn test_read_rule_targets_replicas_primary_first() {
    let engine = engine();
    let endpoints = FaultInjectionEndpoints::new(FeedRange::full())
        .with_replica_count(3)
        .unwrap()
        .with_include_primary(true);
    let condition = FaultInjectionCondition::builder()
        .connection_type(ConnectionType::Direct)
        .operation_type(OperationType::Read)
        .region("West US")
        .endpoints(endpoints)
        .build()
        .unwrap();
    let rule = FaultInjectionRule::builder("west-reads")
        .condition(condition)
        .server_error(ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap())
        .build()
        .unwrap();

    let summary = engine.configure(&rule, "orders").await.unwrap().summary();
    assert_eq!(
        summary.addresses,
        vec![PRIMARY.to_string(), SECONDARY_A.to_string(), SECONDARY_B.to_string()]
    );
    assert!(!summary.primary_only);
}

#[tokio::test]
async fn test_unknown_container_is_not_registered() {
    let engine = engine();
    let result = ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap();
    let err = engine
        .configure(&server_rule("lost", result), "no-such-container")
        .await
        .unwrap_err();

    assert!(matches!(
        err.collaborator_error(),
        Some(CollaboratorError::NotFound(_))
    ));
    assert!(err.is_fatal());
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn test_direct_rule_rejected_on_gateway_client() {
    let config = EngineConfig {
        connection_mode: ConnectionType::Gateway,
        ..EngineConfig::default()
    };
    let engine = FaultInjectionEngine::with_scheduler(
        config,
        Resolvers::from_single(Arc::new(topology())),
        RecordingPool::new(&[]),
        Arc::new(InjectionScheduler::with_handle(Handle::current())),
    )
    .unwrap();

    let result = ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap();
    let err = engine.configure(&server_rule("direct", result), "orders").await.unwrap_err();
    assert!(matches!(err, FaultError::UnsupportedConfiguration(_)));
    assert!(engine.rules().is_empty());
}

#[tokio::test]
async fn test_gateway_connection_rule_rejected() {
    let engine = engine();
    let condition = FaultInjectionCondition::builder()
        .connection_type(ConnectionType::Gateway)
        .build()
        .unwrap();
    let rule = FaultInjectionRule::builder("gateway-resets")
        .condition(condition)
        .connection_error(connection_result(100))
        .build()
        .unwrap();

    let err = engine.configure(&rule, "orders").await.unwrap_err();
    assert!(matches!(err, FaultError::UnsupportedConfiguration(_)));
    assert!(engine.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connection_rule_without_targets_hits_every_endpoint() {
    // No regions in the topology, no endpoint selector on the rule
    let pool = RecordingPool::new(&[
        "rntbd://n1.example.net:14000",
        "rntbd://n2.example.net:14000",
    ]);
    let engine = engine_with(regionless_topology(), pool.clone());

    let rule = FaultInjectionRule::builder("resets")
        .condition(direct())
        .connection_error(connection_result(100))
        .build()
        .unwrap();
    let effective = engine.configure(&rule, "orders").await.unwrap();
    assert!(effective.summary().region_endpoints.is_empty());

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(pool.event_count("rntbd://n1.example.net:14000"), 3);
    assert_eq!(pool.event_count("rntbd://n2.example.net:14000"), 3);

    let events = pool.endpoint("rntbd://n1.example.net:14000").events();
    assert_eq!(events[0], ("resets".to_string(), 2, ConnectionErrorKind::ConnectionReset));

    // Invalidated rules stop at the next tick and leave the store
    effective.disable();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.event_count("rntbd://n1.example.net:14000"), 3);
    assert!(engine.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_removed_connection_rule_stops_within_one_interval() {
    let pool = RecordingPool::new(&["rntbd://n1.example.net:14000"]);
    let engine = engine_with(regionless_topology(), pool.clone());

    let rule = FaultInjectionRule::builder("closes")
        .condition(direct())
        .connection_error(connection_result(100))
        .build()
        .unwrap();
    let effective = engine.configure(&rule, "orders").await.unwrap();
    let EffectiveRule::ConnectionError(connection_rule) = effective else {
        panic!("expected a connection error rule");
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.event_count("rntbd://n1.example.net:14000"), 1);

    assert!(engine.store().remove_connection_rule(&connection_rule));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pool.event_count("rntbd://n1.example.net:14000"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_region_connection_rule_hits_region_endpoints_only() {
    let pool = RecordingPool::new(&[
        "https://acct-westus.example.net:443",
        "https://acct-eastus.example.net:443",
        "https://acct.example.net:443",
    ]);
    let engine = engine_with(topology(), pool.clone());

    let condition = FaultInjectionCondition::builder()
        .connection_type(ConnectionType::Direct)
        .region("west us")
        .build()
        .unwrap();
    let rule = FaultInjectionRule::builder("west-resets")
        .condition(condition)
        .connection_error(connection_result(100))
        .build()
        .unwrap();
    engine.configure(&rule, "orders").await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(pool.event_count("https://acct-westus.example.net:443"), 2);
    assert_eq!(pool.event_count("https://acct.example.net:443"), 2);
    assert_eq!(pool.event_count("https://acct-eastus.example.net:443"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_endpoint_does_not_stop_injection() {
    let pool = RecordingPool::with_failures(
        &["rntbd://n1.example.net:14000", "rntbd://n2.example.net:14000"],
        &["rntbd://n1.example.net:14000"],
    );
    let engine = engine_with(regionless_topology(), pool.clone());

    let rule = FaultInjectionRule::builder("resets")
        .condition(direct())
        .connection_error(connection_result(100))
        .build()
        .unwrap();
    engine.configure(&rule, "orders").await.unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(pool.event_count("rntbd://n1.example.net:14000"), 0);
    assert_eq!(pool.event_count("rntbd://n2.example.net:14000"), 3);
    assert_eq!(engine.store().len(), 1);
}

fn resolvers_with_flaky_addresses(flaky: Arc<FlakyAddresses<StaticTopology>>) -> Resolvers {
    let topology = Arc::new(topology());
    Resolvers {
        collections: topology.clone(),
        partitions: topology.clone(),
        addresses: flaky,
        endpoints: topology,
    }
}

fn replica_rule() -> FaultInjectionRule {
    let condition = FaultInjectionCondition::builder()
        .connection_type(ConnectionType::Direct)
        .operation_type(OperationType::Read)
        .endpoints(FaultInjectionEndpoints::new(FeedRange::full()))
        .build()
        .unwrap();
    FaultInjectionRule::builder("replicas")
        .condition(condition)
        .server_error(ServerErrorResult::builder(ServerErrorKind::Timeout).build().unwrap())
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_transient_resolution_failures_are_retried() {
    let flaky = Arc::new(FlakyAddresses::new(
        Arc::new(topology()),
        2,
        CollaboratorError::Transient("connection refused".into()),
    ));
    let engine = FaultInjectionEngine::with_scheduler(
        EngineConfig::default(),
        resolvers_with_flaky_addresses(flaky.clone()),
        RecordingPool::new(&[]),
        Arc::new(InjectionScheduler::with_handle(Handle::current())),
    )
    .unwrap();

    let summary = engine.configure(&replica_rule(), "orders").await.unwrap().summary();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.addresses.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_resolution_is_retried() {
    let flaky = Arc::new(FlakyAddresses::throttled(Arc::new(topology()), 4));
    let engine = FaultInjectionEngine::with_scheduler(
        EngineConfig::default(),
        resolvers_with_flaky_addresses(flaky.clone()),
        RecordingPool::new(&[]),
        Arc::new(InjectionScheduler::with_handle(Handle::current())),
    )
    .unwrap();

    engine.configure(&replica_rule(), "orders").await.unwrap();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_resolution_retries_reject_the_rule() {
    let flaky = Arc::new(FlakyAddresses::new(
        Arc::new(topology()),
        100,
        CollaboratorError::Transient("connection refused".into()),
    ));
    let engine = FaultInjectionEngine::with_scheduler(
        EngineConfig::default(),
        resolvers_with_flaky_addresses(flaky.clone()),
        RecordingPool::new(&[]),
        Arc::new(InjectionScheduler::with_handle(Handle::current())),
    )
    .unwrap();

    let err = engine.configure(&replica_rule(), "orders").await.unwrap_err();
    assert!(matches!(err, FaultError::Resolution { .. }));
    assert!(matches!(
        err.collaborator_error(),
        Some(CollaboratorError::Transient(_))
    ));
    assert!(!err.is_fatal());
    // One attempt plus the configured network retries
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
    assert!(engine.store().is_empty());
}
