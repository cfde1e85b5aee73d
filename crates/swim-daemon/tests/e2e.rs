//! End-to-end tests for swim-daemon.
//!
//! Runs real nodes on loopback ports and checks joins, probes, indirect
//! probes and failure detection across them.

use std::time::Duration;

use swim_core::{Member, Update, UpdateKind};
use swim_daemon::{Node, NodeConfig, NodeError, NodeState};
use tokio::net::TcpListener;
use tokio::time::{Instant, sleep, timeout};

// ============================================================================
// Helpers
// ============================================================================

/// Config with gossip effectively disabled so tests drive every exchange.
fn quiet_config() -> NodeConfig {
    let mut config = NodeConfig::new("127.0.0.1:0");
    config.detector.ping_interval = Duration::from_secs(3600);
    config.detector.probe_timeout = Duration::from_millis(300);
    config
}

/// Config with fast gossip for convergence tests.
fn gossiping_config() -> NodeConfig {
    let mut config = NodeConfig::new("127.0.0.1:0");
    config.detector.ping_interval = Duration::from_millis(20);
    config.detector.probe_timeout = Duration::from_millis(200);
    config.detector.max_rounds = 10;
    config
}

/// Start a node and serve it in the background.
async fn spawn_node(config: NodeConfig) -> Node {
    let node = Node::start(config).await.expect("Failed to start node");

    let server = node.clone();
    tokio::spawn(async move { server.listen().await });
    node
}

/// A loopback address nobody listens on.
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);
    addr.to_string()
}

fn addresses(members: &[Member]) -> Vec<&str> {
    members.iter().map(|m| m.address.as_str()).collect()
}

fn addr(node: &Node) -> &str {
    &node.local_member().address
}

/// Poll `check` until it passes or `limit` elapses.
async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join() {
    let server = spawn_node(quiet_config()).await;
    let client = spawn_node(quiet_config()).await;

    client.join(addr(&server)).await.expect("Failed to join");

    let mut expected = vec![addr(&server), addr(&client)];
    expected.sort();

    let server_view = server.alive_members().await;
    assert_eq!(addresses(&server_view), expected);

    let client_view = client.alive_members().await;
    assert_eq!(addresses(&client_view), expected);

    // Snapshot adopted wholesale, pending updates included
    assert_eq!(client.membership().await, server.membership().await);
    assert_eq!(client.state(), NodeState::Running);

    server.shutdown();
    client.shutdown();
}

#[tokio::test]
async fn test_join_third() {
    let server = spawn_node(quiet_config()).await;
    let first = spawn_node(quiet_config()).await;
    let second = spawn_node(quiet_config()).await;

    first.join(addr(&server)).await.expect("Failed to join");
    second.join(addr(&server)).await.expect("Failed to join");

    assert_eq!(server.alive_members().await.len(), 3);
    assert_eq!(second.alive_members().await.len(), 3);

    // `first` joined before `second` and has not talked to anyone since
    let first_view = first.alive_members().await;
    assert_eq!(first_view.len(), 2);
    assert!(!addresses(&first_view).contains(&addr(&second)));

    for node in [server, first, second] {
        node.shutdown();
    }
}

#[tokio::test]
async fn test_join_unreachable_seed() {
    let node = spawn_node(quiet_config()).await;

    let err = node.join(&dead_address().await).await.unwrap_err();
    assert!(matches!(err, NodeError::Connect { .. }));
    assert_eq!(node.alive_members().await.len(), 1);

    node.shutdown();
}

#[tokio::test]
async fn test_join_missing_address() {
    let node = spawn_node(quiet_config()).await;
    assert!(matches!(
        node.join("").await.unwrap_err(),
        NodeError::MissingAddress
    ));
    node.shutdown();
}

// ============================================================================
// Direct probe
// ============================================================================

#[tokio::test]
async fn test_ping() {
    let server = spawn_node(quiet_config()).await;
    let client = spawn_node(quiet_config()).await;
    client.join(addr(&server)).await.expect("Failed to join");

    let extra = Member::new("test", dead_address().await);
    client.add_member(extra.clone()).await;

    client.ping(addr(&server)).await.expect("Ping failed");

    // Server learned about `extra` from the piggybacked updates
    let server_view = server.alive_members().await;
    assert_eq!(server_view.len(), 3);
    assert!(server_view.contains(&extra));
    assert_eq!(server.pending_updates().await.len(), 3);

    // Merging the server's reply added nothing new
    assert_eq!(client.alive_members().await.len(), 3);
    assert_eq!(client.pending_updates().await.len(), 3);

    server.shutdown();
    client.shutdown();
}

#[tokio::test]
async fn test_ping_unreachable() {
    let node = spawn_node(quiet_config()).await;
    assert!(node.ping(&dead_address().await).await.is_err());
    node.shutdown();
}

// ============================================================================
// Indirect probe
// ============================================================================

#[tokio::test]
async fn test_ping_req_ack() {
    let prober = spawn_node(quiet_config()).await;
    let helper = spawn_node(quiet_config()).await;
    let target = spawn_node(quiet_config()).await;

    prober
        .ping_req(helper.local_member(), target.local_member())
        .await
        .expect("Expected ack");

    // The helper merged the prober's piggybacked updates
    assert!(helper.alive_members().await.contains(prober.local_member()));
    // The target heard from the helper
    assert!(target.alive_members().await.contains(helper.local_member()));

    for node in [prober, helper, target] {
        node.shutdown();
    }
}

#[tokio::test]
async fn test_ping_req_without_ack() {
    let prober = spawn_node(quiet_config()).await;
    let helper = spawn_node(quiet_config()).await;
    let target = Member::from_address(dead_address().await);

    let err = prober
        .ping_req(helper.local_member(), &target)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::AckNotReceived { .. }));

    // Helper's updates are merged even without an ack
    assert!(prober.alive_members().await.contains(helper.local_member()));

    prober.shutdown();
    helper.shutdown();
}

#[tokio::test]
async fn test_indirect_probe_failure_marks_target_failed() {
    let prober = spawn_node(quiet_config()).await;
    let mut helpers = Vec::new();
    for _ in 0..3 {
        let helper = spawn_node(quiet_config()).await;
        prober.add_member(helper.local_member().clone()).await;
        helpers.push(helper);
    }

    let target = Member::from_address(dead_address().await);
    prober.add_member(target.clone()).await;

    assert!(prober.probe(&target).await);

    assert!(!prober.alive_members().await.contains(&target));
    assert!(prober.failed_members().await.contains(&target));

    let failed_updates: Vec<Update> = prober
        .pending_updates()
        .await
        .into_iter()
        .filter(|u| u.member == target && u.kind == UpdateKind::Failed)
        .collect();
    assert_eq!(failed_updates, vec![Update::failed(target.clone())]);

    // Helpers stay alive
    assert_eq!(prober.alive_members().await.len(), 4);

    prober.shutdown();
    for helper in helpers {
        helper.shutdown();
    }
}

#[tokio::test]
async fn test_probe_reachable_member_keeps_it_alive() {
    let prober = spawn_node(quiet_config()).await;
    let target = spawn_node(quiet_config()).await;
    prober.add_member(target.local_member().clone()).await;

    assert!(!prober.probe(target.local_member()).await);
    assert!(prober.alive_members().await.contains(target.local_member()));

    prober.shutdown();
    target.shutdown();
}

// ============================================================================
// Gossip loop
// ============================================================================

#[tokio::test]
async fn test_gossip_spreads_membership() {
    let server = spawn_node(gossiping_config()).await;
    let first = spawn_node(gossiping_config()).await;
    let second = spawn_node(gossiping_config()).await;

    first.join(addr(&server)).await.expect("Failed to join");
    second.join(addr(&server)).await.expect("Failed to join");

    let watcher = &first;
    let converged = eventually(Duration::from_secs(5), move || async move {
        watcher.alive_members().await.len() == 3
    })
    .await;
    assert!(converged, "first never learned about second");

    for node in [server, first, second] {
        node.shutdown();
    }
}

#[tokio::test]
async fn test_gossip_detects_stopped_member() {
    let a = spawn_node(gossiping_config()).await;
    let b = spawn_node(gossiping_config()).await;
    let c = spawn_node(gossiping_config()).await;

    b.join(addr(&a)).await.expect("Failed to join");
    c.join(addr(&a)).await.expect("Failed to join");

    let victim = c.local_member().clone();
    c.shutdown();

    let (watcher, victim) = (&a, &victim);
    let detected = eventually(Duration::from_secs(5), move || async move {
        watcher.failed_members().await.contains(victim)
    })
    .await;
    assert!(detected, "stopped member was never marked failed");

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn test_shutdown_stops_serving() {
    let node = Node::start(quiet_config()).await.expect("Failed to start");
    let server = node.clone();
    let handle = tokio::spawn(async move { server.listen().await });
    let address = addr(&node).to_string();

    node.shutdown();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("listen did not return")
        .expect("listen task panicked")
        .expect("listen failed");

    let probe = spawn_node(quiet_config()).await;
    assert!(probe.ping(&address).await.is_err());
    probe.shutdown();
}
