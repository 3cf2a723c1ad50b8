//! Reconciler merge tests

use std::time::Duration;

use chrono::Utc;

use clusterd::reconcile::{merge, normalize_scheduler_state};
use clusterd::registry::{Node, NodeSpec, NodeState};
use clusterd::salt::MinionStatus;
use clusterd::slurm::NodeStatus;

fn node(name: &str, state: NodeState) -> Node {
    let mut node = Node::from_spec(NodeSpec {
        node_name: name.to_string(),
        host: format!("{}.test", name),
        port: 22,
        username: "root".to_string(),
        password: "secret".to_string(),
        cpus: 4,
        memory: 8192,
        disk: None,
        os: None,
    });
    node.state = state;
    node
}

fn scheduler_node(name: &str, state: &str) -> NodeStatus {
    NodeStatus {
        name: name.to_string(),
        state: state.to_string(),
        cpus: 4,
        memory_mb: 8192,
        partitions: vec!["batch".to_string()],
    }
}

const GRACE: Duration = Duration::from_secs(300);

#[test]
fn test_normalize_scheduler_state() {
    assert_eq!(normalize_scheduler_state("idle"), NodeState::Idle);
    assert_eq!(normalize_scheduler_state("alloc"), NodeState::Allocated);
    assert_eq!(normalize_scheduler_state("mixed"), NodeState::Allocated);
    assert_eq!(normalize_scheduler_state("down*"), NodeState::Down);
    assert_eq!(normalize_scheduler_state("drng"), NodeState::Draining);
    assert_eq!(normalize_scheduler_state("idle~"), NodeState::Idle);
    assert_eq!(normalize_scheduler_state("perfctrs"), NodeState::Unknown);
}

#[test]
fn test_scheduler_state_wins_when_known() {
    let nodes = vec![node("n1", NodeState::Idle)];
    let scheduler = vec![scheduler_node("n1", "alloc")];

    let views = merge(&nodes, &scheduler, &[], GRACE, Utc::now());

    assert_eq!(views.len(), 1);
    assert_eq!(views[0].state, NodeState::Allocated);
    assert_eq!(views[0].scheduler_state.as_deref(), Some("alloc"));
    assert!(!views[0].needs_attention);
}

#[test]
fn test_falls_back_to_install_derived_state() {
    let nodes = vec![node("n1", NodeState::Idle), node("n2", NodeState::Unknown)];

    let views = merge(&nodes, &[], &[], GRACE, Utc::now());

    assert_eq!(views[0].state, NodeState::Idle);
    assert!(views[0].scheduler_state.is_none());
    assert_eq!(views[1].state, NodeState::Unknown);
}

#[test]
fn test_flags_nodes_unknown_past_grace_window() {
    let mut stale = node("n1", NodeState::Idle);
    stale.updated_at = Utc::now() - chrono::Duration::seconds(600);
    let fresh = node("n2", NodeState::Idle);
    let nodes = vec![stale, fresh];

    let views = merge(&nodes, &[], &[], GRACE, Utc::now());

    assert!(views[0].needs_attention);
    assert!(views[0].attention_reason.is_some());
    assert!(!views[1].needs_attention);
}

#[test]
fn test_known_node_is_not_flagged_even_when_old() {
    let mut stale = node("n1", NodeState::Idle);
    stale.updated_at = Utc::now() - chrono::Duration::seconds(600);
    let scheduler = vec![scheduler_node("n1", "idle")];

    let views = merge(&[stale], &scheduler, &[], GRACE, Utc::now());

    assert!(!views[0].needs_attention);
}

#[test]
fn test_deleted_nodes_are_omitted() {
    let nodes = vec![node("n1", NodeState::Deleted), node("n2", NodeState::Idle)];

    let views = merge(&nodes, &[], &[], GRACE, Utc::now());

    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "n2");
}

#[test]
fn test_minion_presence_is_attached() {
    let mut registered = node("n1", NodeState::Idle);
    registered.minion_id = Some("n1".to_string());
    let unregistered = node("n2", NodeState::Idle);
    let minions = vec![
        MinionStatus {
            id: "n1".to_string(),
            online: true,
        },
    ];

    let views = merge(&[registered, unregistered], &[], &minions, GRACE, Utc::now());

    assert_eq!(views[0].minion_online, Some(true));
    assert_eq!(views[1].minion_online, None);
}
