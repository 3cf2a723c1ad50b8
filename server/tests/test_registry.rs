//! Node registry tests

use clusterd::errors::ClusterError;
use clusterd::filesys::file::File;
use clusterd::registry::{NodeRegistry, NodeSpec, NodeState};

fn spec(name: &str) -> NodeSpec {
    NodeSpec {
        node_name: name.to_string(),
        host: format!("{}.test", name),
        port: 22,
        username: "root".to_string(),
        password: "secret".to_string(),
        cpus: 8,
        memory: 16384,
        disk: Some(100),
        os: Some("ubuntu-22.04".to_string()),
    }
}

async fn registry(dir: &tempfile::TempDir) -> NodeRegistry {
    NodeRegistry::open(File::new(dir.path().join("nodes.json")))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_insert_creates_unknown_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir).await;

    registry.insert_specs(vec![spec("n1"), spec("n2")]).await.unwrap();

    let node = registry.get("n1").await.unwrap();
    assert_eq!(node.state, NodeState::Unknown);
    assert_eq!(node.resources.cpus, 8);
    assert!(node.minion_id.is_none());
    assert_eq!(registry.list().await.len(), 2);
}

#[tokio::test]
async fn test_insert_rejects_live_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir).await;

    registry.insert_specs(vec![spec("n1")]).await.unwrap();
    let result = registry.insert_specs(vec![spec("n1")]).await;
    assert!(matches!(result, Err(ClusterError::Conflict(_))));

    // A deleted record of the same name can be replaced.
    registry.soft_delete("n1", None).await.unwrap();
    registry.insert_specs(vec![spec("n1")]).await.unwrap();
    assert_eq!(registry.get("n1").await.unwrap().state, NodeState::Unknown);
}

#[tokio::test]
async fn test_install_result_drives_state() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir).await;
    registry.insert_specs(vec![spec("n1"), spec("n2")]).await.unwrap();

    registry
        .mark_install_result("n1", true, Some("n1".to_string()))
        .await
        .unwrap();
    registry.mark_install_result("n2", false, None).await.unwrap();

    let n1 = registry.get("n1").await.unwrap();
    assert_eq!(n1.state, NodeState::Idle);
    assert_eq!(n1.minion_id.as_deref(), Some("n1"));

    let n2 = registry.get("n2").await.unwrap();
    assert_eq!(n2.state, NodeState::Down);
    assert!(n2.minion_id.is_none());
}

#[tokio::test]
async fn test_soft_delete_keeps_warning() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir).await;
    registry.insert_specs(vec![spec("n1")]).await.unwrap();

    registry
        .soft_delete("n1", Some("removal unconfirmed".to_string()))
        .await
        .unwrap();

    let node = registry.get("n1").await.unwrap();
    assert_eq!(node.state, NodeState::Deleted);
    assert_eq!(node.removal_warning.as_deref(), Some("removal unconfirmed"));
}

#[tokio::test]
async fn test_registry_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = registry(&dir).await;
        registry.insert_specs(vec![spec("n1")]).await.unwrap();
        registry
            .mark_install_result("n1", true, Some("n1".to_string()))
            .await
            .unwrap();
    }

    let reopened = registry(&dir).await;
    let node = reopened.get("n1").await.unwrap();
    assert_eq!(node.state, NodeState::Idle);
    // Credentials round-trip through the registry file.
    assert_eq!(node.credentials.username, "root");
}

#[tokio::test]
async fn test_unknown_node_errors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir).await;
    let result = registry.mark_install_result("ghost", true, None).await;
    assert!(matches!(result, Err(ClusterError::NotFound(_))));
}
