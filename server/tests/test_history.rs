//! Command history tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use clusterd::errors::ClusterError;
use clusterd::filesys::file::File;
use clusterd::history::{CommandExecution, CommandStatus, HistoryRecorder};
use clusterd::salt::{
    ExecuteService, IntegrationStatus, JobResult, MinionStatus, SaltApi, SaltJob,
};

/// Salt fake that either hands out jids or refuses to dispatch
struct FakeSalt {
    available: bool,
}

#[async_trait]
impl SaltApi for FakeSalt {
    async fn execute(
        &self,
        _target: &str,
        _function: &str,
        _args: &[String],
    ) -> Result<String, ClusterError> {
        if self.available {
            Ok("20260806093000123456".to_string())
        } else {
            Err(ClusterError::ServiceUnavailable(
                "salt-api: connection refused".to_string(),
            ))
        }
    }

    async fn get_job(&self, jid: &str) -> Result<JobResult, ClusterError> {
        Ok(JobResult {
            jid: jid.to_string(),
            returns: HashMap::new(),
        })
    }

    async fn list_jobs(&self) -> Result<Vec<SaltJob>, ClusterError> {
        Ok(Vec::new())
    }

    async fn list_minions(&self) -> Result<Vec<MinionStatus>, ClusterError> {
        Ok(Vec::new())
    }

    async fn delete_key(&self, _minion_id: &str) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn status(&self) -> Result<IntegrationStatus, ClusterError> {
        Ok(IntegrationStatus::disabled())
    }
}

async fn recorder(dir: &tempfile::TempDir) -> HistoryRecorder {
    HistoryRecorder::open(File::new(dir.path().join("history.json")))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_execute_records_one_row_before_completion() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(recorder(&dir).await);
    let service = ExecuteService::new(Arc::new(FakeSalt { available: true }), history.clone());

    let jid = service
        .execute("*", "test.ping", Vec::new())
        .await
        .unwrap();

    // Queryable immediately after dispatch, before any result arrives.
    let rows = history.query(1).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].target, "*");
    assert_eq!(rows[0].function, "test.ping");
    assert_eq!(rows[0].jid.as_deref(), Some(jid.as_str()));
    assert_eq!(rows[0].status, CommandStatus::Dispatched);
}

#[tokio::test]
async fn test_failed_dispatch_still_leaves_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(recorder(&dir).await);
    let service = ExecuteService::new(Arc::new(FakeSalt { available: false }), history.clone());

    let result = service
        .execute("*", "test.ping", Vec::new())
        .await;
    assert!(matches!(result, Err(ClusterError::ServiceUnavailable(_))));

    let rows = history.query(10).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CommandStatus::Failed);
    assert!(rows[0].jid.is_none());
    assert!(rows[0].detail.as_deref().unwrap().contains("salt-api"));
}

#[tokio::test]
async fn test_update_by_jid_marks_completion() {
    let dir = tempfile::tempdir().unwrap();
    let history = recorder(&dir).await;

    let mut row = CommandExecution::new("node-*", "state.apply", vec!["base".to_string()]);
    row.jid = Some("20260806093000000001".to_string());
    history.record(row).await.unwrap();

    let updated = history
        .update("20260806093000000001", CommandStatus::Completed, None)
        .await
        .unwrap();
    assert!(updated);
    assert_eq!(history.query(1).await[0].status, CommandStatus::Completed);

    let missing = history
        .update("19700101000000000000", CommandStatus::Completed, None)
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn test_query_is_most_recent_first() {
    let dir = tempfile::tempdir().unwrap();
    let history = recorder(&dir).await;

    for function in ["cmd.one", "cmd.two", "cmd.three"] {
        history
            .record(CommandExecution::new("*", function, Vec::new()))
            .await
            .unwrap();
    }

    let rows = history.query(2).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].function, "cmd.three");
    assert_eq!(rows[1].function, "cmd.two");
}

#[test]
fn test_history_survives_reopen() {
    tokio_test::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        {
            let history = recorder(&dir).await;
            history
                .record(CommandExecution::new("*", "test.ping", Vec::new()))
                .await
                .unwrap();
        }

        // A fresh recorder over the same file sees the row.
        let reopened = recorder(&dir).await;
        let rows = reopened.query(10).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].function, "test.ping");
    });
}
