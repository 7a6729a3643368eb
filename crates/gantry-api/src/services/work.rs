//! Work intake.

use chrono::Utc;
use gantry_core::{Error, Result, WorkItem, WorkSpec};
use gantry_store::{Op, Store};
use tracing::info;

use crate::AppState;

/// Insert a new Queued work item for a descriptor. This is the seam that
/// webhook ingestion hands descriptors to.
pub async fn queue_work(state: &AppState, spec: WorkSpec) -> Result<WorkItem> {
    if spec.import_path.is_empty() {
        return Err(Error::InvalidInput("empty import path".to_string()));
    }
    if spec.revision.is_empty() {
        return Err(Error::InvalidInput("empty revision".to_string()));
    }

    let item = WorkItem::from_spec(spec, Utc::now());
    state
        .store
        .run(vec![Op::InsertWork(item.clone())])
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;
    info!(work = %item.id, path = %item.import_path, "queued work item");
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{Vcs, WorkStatus};
    use gantry_store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_queue_work_starts_queued() {
        let state = crate::AppState::new(
            Arc::new(MemoryStore::new()),
            "http://127.0.0.1:0",
            Duration::from_secs(90),
        );
        let item = queue_work(
            &state,
            WorkSpec {
                import_path: "github.com/acme/widget".to_string(),
                revision: "deadbeef".to_string(),
                revision_date: Utc::now(),
                subpackages: true,
                vcs: Vcs::Git,
            },
        )
        .await
        .unwrap();

        let stored = state.store.work_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkStatus::Queued);
        assert_eq!(stored.rev, 0);
    }

    #[tokio::test]
    async fn test_queue_work_rejects_empty_fields() {
        let state = crate::AppState::new(
            Arc::new(MemoryStore::new()),
            "http://127.0.0.1:0",
            Duration::from_secs(90),
        );
        let spec = WorkSpec {
            import_path: String::new(),
            revision: "deadbeef".to_string(),
            revision_date: Utc::now(),
            subpackages: false,
            vcs: Vcs::Git,
        };
        assert!(queue_work(&state, spec).await.is_err());
    }
}
